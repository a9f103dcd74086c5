//! Failure taxonomy for a pipeline run.
//!
//! Only fatal failures are represented here. Verification failures are
//! consumed by [`crate::VerificationSubmitter`] and never reach the caller.

use std::path::PathBuf;

/// A fatal error that aborts the current stage (and therefore the run).
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The creation transaction reverted, or its confirmation wait was exceeded.
    #[error("deployment of {artifact} failed")]
    Transaction {
        artifact: String,
        #[source]
        source: anyhow::Error,
    },

    /// The registry file could not be created or extended.
    #[error("failed to write address registry at {}", path.display())]
    RegistryIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The declared stages are not a valid run (e.g. duplicate artifact names).
    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),
}

impl DeployError {
    pub(crate) fn transaction(artifact: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Transaction {
            artifact: artifact.into(),
            source,
        }
    }

    pub(crate) fn registry_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RegistryIo {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure happened while sending or confirming a transaction.
    pub fn is_transaction_failure(&self) -> bool {
        matches!(self, Self::Transaction { .. })
    }
}
