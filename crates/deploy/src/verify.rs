//! Best-effort source verification of deployed artifacts.
//!
//! Verification never fails a stage: every error from the service is logged
//! and recorded as [`VerificationStatus::Failed`].

use std::{collections::HashMap, future::Future};

use alloy_core::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::{
    artifact::ArtifactSpec,
    executor::DeploymentRecord,
    network::NetworkKind,
};

/// Verification state of a deployment record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum VerificationStatus {
    /// Not attempted: local network or no service configured.
    Skipped,
    /// Submitted, no answer yet.
    Pending,
    Verified,
    Failed,
}

/// What a verification service needs to match deployed code to its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub artifact: String,
    pub address: Address,
    /// ABI-encoded constructor arguments, exactly as appended to the creation code.
    pub constructor_args: Bytes,
}

impl VerificationRequest {
    pub fn new(spec: &ArtifactSpec, address: Address) -> Self {
        Self {
            artifact: spec.name().to_string(),
            address,
            constructor_args: spec.encoded_args(),
        }
    }
}

/// Successful answers from a verification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
}

/// External verification service (e.g. Etherscan).
pub trait VerificationService: Send + Sync {
    fn verify(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = anyhow::Result<VerificationOutcome>> + Send;
}

/// Whether deployments of a stage get submitted for verification.
///
/// Chosen once per stage from the network classification.
#[derive(Debug)]
pub enum VerificationPolicy<'a, V> {
    Skip,
    Submit(&'a V),
}

impl<'a, V> VerificationPolicy<'a, V> {
    pub fn select(kind: NetworkKind, service: Option<&'a V>) -> Self {
        match (kind, service) {
            (NetworkKind::Local, _) => VerificationPolicy::Skip,
            (NetworkKind::Public, Some(service)) => VerificationPolicy::Submit(service),
            (NetworkKind::Public, None) => {
                tracing::warn!("No verification service configured, skipping verification");
                VerificationPolicy::Skip
            }
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, VerificationPolicy::Skip)
    }
}

/// Submits deployments for verification, at most once per artifact per run.
#[derive(Debug, Default)]
pub struct VerificationSubmitter {
    /// Status reached by each artifact's single attempt.
    attempted: HashMap<String, VerificationStatus>,
}

impl VerificationSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts submitted so far in this run.
    pub fn attempts(&self) -> usize {
        self.attempted.len()
    }

    /// Apply `policy` to a freshly confirmed record, updating its status.
    pub async fn submit<V: VerificationService>(
        &mut self,
        policy: &VerificationPolicy<'_, V>,
        spec: &ArtifactSpec,
        record: &mut DeploymentRecord,
    ) {
        let service = match policy {
            VerificationPolicy::Skip => {
                record.set_verification(VerificationStatus::Skipped);
                return;
            }
            VerificationPolicy::Submit(service) => *service,
        };

        if let Some(&status) = self.attempted.get(record.name()) {
            tracing::warn!(
                artifact = record.name(),
                status = %status,
                "Verification already attempted in this run, not resubmitting"
            );
            record.set_verification(status);
            return;
        }
        self.attempted
            .insert(record.name().to_string(), VerificationStatus::Pending);

        record.set_verification(VerificationStatus::Pending);
        let request = VerificationRequest::new(spec, record.address());

        tracing::info!(
            artifact = record.name(),
            address = %record.address(),
            "Verifying contract..."
        );

        let status = match service.verify(&request).await {
            Ok(VerificationOutcome::Verified) => {
                tracing::info!(artifact = record.name(), "Contract verified");
                VerificationStatus::Verified
            }
            Ok(VerificationOutcome::AlreadyVerified) => {
                tracing::info!(artifact = record.name(), "Contract already verified");
                VerificationStatus::Verified
            }
            Err(e) => {
                tracing::warn!(
                    artifact = record.name(),
                    error = %format!("{e:#}"),
                    "Verification failed, continuing"
                );
                VerificationStatus::Failed
            }
        };

        self.attempted.insert(record.name().to_string(), status);
        record.set_verification(status);
    }
}
