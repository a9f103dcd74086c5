//! poolkit-deploy - Deployment pipeline for the token set and pool factory.
//!
//! This crate deploys compiled contract artifacts stage by stage, waits for a
//! network-dependent confirmation depth, submits public deployments for source
//! verification and publishes the resulting addresses to a generated registry
//! file.

pub mod artifact;
pub mod config;
mod error;
pub mod eth;
pub mod etherscan;
pub mod executor;
pub mod network;
pub mod pipeline;
pub mod registry;
pub mod rpc;
pub mod signer;
pub mod stages;
pub mod verify;

pub use artifact::{ArtifactSpec, ArtifactStore, CompiledArtifact, ConstructorArg, to_wei};
pub use config::{DeployConfig, EtherscanConfig, ValidatedConfig};
pub use error::DeployError;
pub use eth::{DeployerIdentity, JsonRpcDeployer, RpcDeployerSettings};
pub use etherscan::{EtherscanClient, EtherscanSettings};
pub use executor::{ContractDeployer, DeployedContract, DeploymentExecutor, DeploymentRecord};
pub use network::{ConfirmationPolicy, NetworkClassifier, NetworkContext, NetworkKind};
pub use pipeline::{NoVerifier, Pipeline, RunReport, StageReport, StageState};
pub use registry::{AddressRegistry, RegistryEntry, RegistryFile, WriteMode, parse_registry};
pub use signer::LocalSigner;
pub use stages::{Stage, declared_stages, select_stages};
pub use verify::{
    VerificationOutcome, VerificationPolicy, VerificationRequest, VerificationService,
    VerificationStatus, VerificationSubmitter,
};
