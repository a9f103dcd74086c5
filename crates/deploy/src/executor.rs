//! Deployment of a single artifact and the record it produces.

use std::future::Future;

use alloy_core::primitives::{Address, B256};
use chrono::{DateTime, Utc};

use crate::{
    artifact::ArtifactSpec,
    error::DeployError,
    network::{ConfirmationPolicy, NetworkKind},
    verify::VerificationStatus,
};

/// Outcome of a confirmed creation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Deploy-and-wait primitive provided by a network client.
///
/// Implementations submit one creation transaction and resolve only once the
/// transaction is included and `confirmations` blocks deep. A revert or an
/// exceeded wait is reported as an error; implementations never retry.
pub trait ContractDeployer: Send + Sync {
    /// The account signing creation transactions.
    fn deployer_address(&self) -> Address;

    fn deploy_and_wait(
        &self,
        spec: &ArtifactSpec,
        confirmations: u64,
    ) -> impl Future<Output = anyhow::Result<DeployedContract>> + Send;
}

/// A confirmed deployment. Only the verification status changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    name: String,
    address: Address,
    tx_hash: B256,
    block_number: u64,
    confirmations: u64,
    confirmed_at: DateTime<Utc>,
    verification: VerificationStatus,
}

impl DeploymentRecord {
    pub fn new(name: impl Into<String>, deployed: DeployedContract, confirmations: u64) -> Self {
        Self {
            name: name.into(),
            address: deployed.address,
            tx_hash: deployed.tx_hash,
            block_number: deployed.block_number,
            confirmations,
            confirmed_at: Utc::now(),
            verification: VerificationStatus::Skipped,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Confirmation depth waited for before this record was created.
    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    pub fn confirmed_at(&self) -> DateTime<Utc> {
        self.confirmed_at
    }

    pub fn verification(&self) -> VerificationStatus {
        self.verification
    }

    pub(crate) fn set_verification(&mut self, status: VerificationStatus) {
        self.verification = status;
    }
}

/// Deploys artifacts one at a time at a fixed confirmation depth.
#[derive(Debug)]
pub struct DeploymentExecutor<'a, D> {
    deployer: &'a D,
    confirmations: u64,
}

impl<'a, D: ContractDeployer> DeploymentExecutor<'a, D> {
    pub fn new(deployer: &'a D, kind: NetworkKind, policy: &ConfirmationPolicy) -> Self {
        Self {
            deployer,
            confirmations: policy.depth_for(kind),
        }
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// Deploy `spec` and block until it reaches the required depth.
    pub async fn execute(&self, spec: &ArtifactSpec) -> Result<DeploymentRecord, DeployError> {
        tracing::info!(
            artifact = spec.name(),
            args = spec.args().len(),
            deployer = %self.deployer.deployer_address(),
            confirmations = self.confirmations,
            "---------------------Deploy {} --------------------",
            spec.name()
        );

        let deployed = self
            .deployer
            .deploy_and_wait(spec, self.confirmations)
            .await
            .map_err(|e| DeployError::transaction(spec.name(), e))?;

        tracing::info!(
            artifact = spec.name(),
            address = %deployed.address,
            tx_hash = %deployed.tx_hash,
            block = deployed.block_number,
            "{} deployed to {}",
            spec.name(),
            deployed.address
        );

        Ok(DeploymentRecord::new(
            spec.name(),
            deployed,
            self.confirmations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingDeployer {
        calls: Mutex<Vec<(String, u64)>>,
        fail: bool,
    }

    impl ContractDeployer for RecordingDeployer {
        fn deployer_address(&self) -> Address {
            Address::with_last_byte(0x01)
        }

        async fn deploy_and_wait(
            &self,
            spec: &ArtifactSpec,
            confirmations: u64,
        ) -> anyhow::Result<DeployedContract> {
            self.calls
                .lock()
                .unwrap()
                .push((spec.name().to_string(), confirmations));
            if self.fail {
                anyhow::bail!("execution reverted");
            }
            Ok(DeployedContract {
                address: Address::with_last_byte(0x42),
                tx_hash: B256::with_last_byte(0x07),
                block_number: 12,
            })
        }
    }

    fn deployer(fail: bool) -> RecordingDeployer {
        RecordingDeployer {
            calls: Mutex::new(Vec::new()),
            fail,
        }
    }

    #[tokio::test]
    async fn test_local_deploy_uses_depth_one() {
        let deployer = deployer(false);
        let executor =
            DeploymentExecutor::new(&deployer, NetworkKind::Local, &ConfirmationPolicy::default());

        let record = executor.execute(&ArtifactSpec::new("BNB")).await.unwrap();

        assert_eq!(record.name(), "BNB");
        assert_eq!(record.address(), Address::with_last_byte(0x42));
        assert_eq!(record.confirmations(), 1);
        assert_eq!(record.block_number(), 12);
        assert_eq!(record.verification(), VerificationStatus::Skipped);
        assert_eq!(*deployer.calls.lock().unwrap(), [("BNB".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_public_deploy_uses_depth_six() {
        let deployer = deployer(false);
        let executor =
            DeploymentExecutor::new(&deployer, NetworkKind::Public, &ConfirmationPolicy::default());

        let record = executor.execute(&ArtifactSpec::new("TRON")).await.unwrap();
        assert_eq!(record.confirmations(), 6);
    }

    #[tokio::test]
    async fn test_failure_is_transaction_error() {
        let deployer = deployer(true);
        let executor =
            DeploymentExecutor::new(&deployer, NetworkKind::Local, &ConfirmationPolicy::default());

        let err = executor
            .execute(&ArtifactSpec::new("Polygon"))
            .await
            .unwrap_err();

        assert!(err.is_transaction_failure());
        assert!(err.to_string().contains("Polygon"));
        // Attempted exactly once, no retry.
        assert_eq!(deployer.calls.lock().unwrap().len(), 1);
    }
}
