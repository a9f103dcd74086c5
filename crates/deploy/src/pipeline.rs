//! Stage runner: deploys each declared artifact in order, verifies on public
//! networks, and flushes the stage's addresses to the registry file once.
//!
//! Per stage the runner moves through
//! `NotStarted -> Deploying -> [Verifying] -> Accumulated -> Written`, or ends
//! in `Aborted` when a deployment or the flush fails. An aborted stage writes
//! nothing; files written by earlier stages are left untouched.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
    error::DeployError,
    executor::{ContractDeployer, DeploymentExecutor, DeploymentRecord},
    network::{ConfirmationPolicy, NetworkClassifier, NetworkContext, NetworkKind},
    registry::{AddressRegistry, RegistryFile, WriteMode},
    stages::Stage,
    verify::{
        VerificationOutcome, VerificationPolicy, VerificationRequest, VerificationService,
        VerificationStatus, VerificationSubmitter,
    },
};

/// Lifecycle of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StageState {
    NotStarted,
    Deploying { index: usize },
    Verifying { index: usize },
    Accumulated,
    Written,
    Aborted,
}

impl StageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Written | StageState::Aborted)
    }
}

/// Tracks and logs the state transitions of a running stage.
#[derive(Debug)]
struct StageProgress<'s> {
    stage: &'s str,
    state: StageState,
}

impl<'s> StageProgress<'s> {
    fn new(stage: &'s str) -> Self {
        Self {
            stage,
            state: StageState::NotStarted,
        }
    }

    fn advance(&mut self, next: StageState) {
        tracing::debug!(stage = self.stage, from = %self.state, to = %next, "Stage transition");
        self.state = next;
    }

    fn abort(&mut self, error: &DeployError) {
        tracing::error!(stage = self.stage, state = %self.state, error = %error, "Stage aborted");
        self.state = StageState::Aborted;
    }
}

/// Result of a stage that reached `Written`.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub kind: NetworkKind,
    pub mode: WriteMode,
    pub state: StageState,
    pub records: Vec<DeploymentRecord>,
}

/// Result of a whole run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub network: NetworkContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// All records of the run, in deployment order.
    pub fn records(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.stages.iter().flat_map(|stage| stage.records.iter())
    }

    pub fn count_with_status(&self, status: VerificationStatus) -> usize {
        self.records()
            .filter(|record| record.verification() == status)
            .count()
    }
}

/// Placeholder service for pipelines built without a verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVerifier;

impl VerificationService for NoVerifier {
    async fn verify(&self, request: &VerificationRequest) -> anyhow::Result<VerificationOutcome> {
        anyhow::bail!(
            "No verification service available for {}",
            request.artifact
        )
    }
}

/// Check that `stages` form a valid run before anything is sent.
///
/// Artifact names must be unique across the run and usable as the prefix of
/// an exported constant.
pub fn validate_plan(stages: &[Stage]) -> Result<(), DeployError> {
    let mut seen = HashSet::new();
    for stage in stages {
        for spec in &stage.artifacts {
            let name = spec.name();
            if !is_identifier(name) {
                return Err(DeployError::InvalidPlan(format!(
                    "artifact name {:?} in stage {} is not a valid identifier",
                    name, stage.name
                )));
            }
            if !seen.insert(name) {
                return Err(DeployError::InvalidPlan(format!(
                    "artifact {} is declared more than once",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Runs declared stages against one network, strictly one artifact at a time.
#[derive(Debug)]
pub struct Pipeline<'a, D, V = NoVerifier> {
    network: NetworkContext,
    classifier: NetworkClassifier,
    confirmations: ConfirmationPolicy,
    deployer: &'a D,
    verifier: Option<&'a V>,
    registry: RegistryFile,
}

impl<'a, D: ContractDeployer> Pipeline<'a, D, NoVerifier> {
    pub fn new(network: NetworkContext, deployer: &'a D, registry: RegistryFile) -> Self {
        Self {
            network,
            classifier: NetworkClassifier::default(),
            confirmations: ConfirmationPolicy::default(),
            deployer,
            verifier: None,
            registry,
        }
    }
}

impl<'a, D: ContractDeployer, V: VerificationService> Pipeline<'a, D, V> {
    pub fn classifier(mut self, classifier: NetworkClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn confirmations(mut self, confirmations: ConfirmationPolicy) -> Self {
        self.confirmations = confirmations;
        self
    }

    /// Use `verifier` for stages running on public networks.
    pub fn verifier<V2: VerificationService>(self, verifier: &'a V2) -> Pipeline<'a, D, V2> {
        Pipeline {
            network: self.network,
            classifier: self.classifier,
            confirmations: self.confirmations,
            deployer: self.deployer,
            verifier: Some(verifier),
            registry: self.registry,
        }
    }

    pub fn network(&self) -> &NetworkContext {
        &self.network
    }

    pub fn registry(&self) -> &RegistryFile {
        &self.registry
    }

    /// Run `stages` in order, each flushing with its own write mode. The first
    /// fatal error ends the run.
    pub async fn run(&self, stages: &[Stage]) -> Result<RunReport, DeployError> {
        validate_plan(stages)?;

        let started_at = Utc::now();
        tracing::info!(
            network = %self.network.name,
            chain_id = self.network.chain_id,
            stages = stages.len(),
            deployer = %self.deployer.deployer_address(),
            "Starting deployment run..."
        );

        let mut submitter = VerificationSubmitter::new();
        let mut reports = Vec::with_capacity(stages.len());
        for stage in stages {
            reports.push(self.run_stage(stage, &mut submitter).await?);
        }

        let report = RunReport {
            network: self.network.clone(),
            started_at,
            finished_at: Utc::now(),
            stages: reports,
        };

        tracing::info!(
            deployed = report.records().count(),
            verified = report.count_with_status(VerificationStatus::Verified),
            verification_failed = report.count_with_status(VerificationStatus::Failed),
            registry = %self.registry.path().display(),
            "✓ Deployment run complete"
        );
        Ok(report)
    }

    /// Run one stage and flush its addresses with the stage's write mode.
    ///
    /// `submitter` is shared across the stages of a run so each artifact is
    /// submitted for verification at most once.
    pub async fn run_stage(
        &self,
        stage: &Stage,
        submitter: &mut VerificationSubmitter,
    ) -> Result<StageReport, DeployError> {
        let kind = self.classifier.classify(&self.network.name);
        let policy = VerificationPolicy::select(kind, self.verifier);
        let executor = DeploymentExecutor::new(self.deployer, kind, &self.confirmations);

        tracing::info!(
            stage = %stage.name,
            network = %self.network.name,
            kind = %kind,
            confirmations = executor.confirmations(),
            verify = !policy.is_skip(),
            artifacts = stage.artifacts.len(),
            "Running stage"
        );

        let mut progress = StageProgress::new(&stage.name);
        let mut accumulator = AddressRegistry::new();
        let mut records = Vec::with_capacity(stage.artifacts.len());

        for (index, spec) in stage.artifacts.iter().enumerate() {
            progress.advance(StageState::Deploying { index });
            let mut record = executor
                .execute(spec)
                .await
                .inspect_err(|e| progress.abort(e))?;

            if !policy.is_skip() {
                progress.advance(StageState::Verifying { index });
            }
            submitter.submit(&policy, spec, &mut record).await;

            accumulator
                .record(record.name(), record.address())
                .inspect_err(|e| progress.abort(e))?;
            records.push(record);
        }
        progress.advance(StageState::Accumulated);

        let mode = stage.write_mode;
        self.registry
            .write(&accumulator, mode)
            .inspect_err(|e| progress.abort(e))?;
        progress.advance(StageState::Written);

        tracing::info!(stage = %stage.name, "---------------------Done--------------------");

        Ok(StageReport {
            name: stage.name.clone(),
            kind,
            mode,
            state: progress.state,
            records,
        })
    }
}
