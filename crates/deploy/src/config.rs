//! Run configuration.
//!
//! Values are layered with figment: built-in defaults, then an optional
//! `Poolkit.toml`, then `POOLKIT_*` environment variables (nested keys are
//! separated by `__`, e.g. `POOLKIT_ETHERSCAN__API_KEY`).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    artifact::ArtifactStore,
    eth::RpcDeployerSettings,
    etherscan::{DEFAULT_ETHERSCAN_API_URL, EtherscanSettings},
    network::{
        ConfirmationPolicy, DEFAULT_DEVELOPMENT_NETWORKS, NetworkClassifier, NetworkKind,
        known_chain_id,
    },
    registry::{DEFAULT_REGISTRY_PATH, RegistryFile},
    signer::LocalSigner,
};

pub const CONFIG_FILENAME: &str = "Poolkit.toml";
pub const ENV_PREFIX: &str = "POOLKIT_";

pub const DEFAULT_NETWORK: &str = "hardhat";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

fn default_etherscan_api_url() -> String {
    DEFAULT_ETHERSCAN_API_URL.to_string()
}

/// Etherscan credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtherscanConfig {
    #[serde(default = "default_etherscan_api_url")]
    pub api_url: String,
    pub api_key: String,
}

/// Raw, unvalidated configuration as read from file and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Network name, classified against `development_networks`.
    pub network: String,
    pub rpc_url: String,
    /// Expected chain id. Defaults to the known id of `network`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Hex private key used to sign creation transactions locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// Node-managed deployer account, used when no private key is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    pub development_networks: Vec<String>,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub artifacts_dir: PathBuf,
    pub registry_path: PathBuf,
    pub confirmations: ConfirmationPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etherscan: Option<EtherscanConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: None,
            private_key: None,
            deployer: None,
            development_networks: DEFAULT_DEVELOPMENT_NETWORKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            confirmations: ConfirmationPolicy::default(),
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            registry_path: PathBuf::from(DEFAULT_REGISTRY_PATH),
            etherscan: None,
        }
    }
}

impl DeployConfig {
    /// The layered configuration sources, lowest priority first.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(DeployConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from defaults, `path` (if it exists) and the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = Self::figment(path)
            .extract()
            .context("Failed to load configuration")?;
        tracing::debug!(path = %path.display(), network = %config.network, "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration as TOML.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Check the configuration and resolve it into typed values.
    pub fn validate(&self) -> Result<ValidatedConfig> {
        if self.network.trim().is_empty() {
            anyhow::bail!("network must not be empty");
        }
        if self.development_networks.is_empty() {
            anyhow::bail!("development_networks must name at least one network");
        }
        if self.confirmations.local == 0 || self.confirmations.public == 0 {
            anyhow::bail!("confirmation depths must be at least 1");
        }
        if self.confirmation_timeout_secs == 0 {
            anyhow::bail!("confirmation_timeout_secs must be positive");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }

        let rpc_url = Url::parse(&self.rpc_url)
            .with_context(|| format!("Invalid rpc_url {}", self.rpc_url))?;

        let signer = self
            .private_key
            .as_deref()
            .map(LocalSigner::from_private_key)
            .transpose()
            .context("Invalid private_key")?;

        let classifier = NetworkClassifier::new(&self.development_networks);
        let kind = classifier.classify(&self.network);
        if kind == NetworkKind::Public && signer.is_none() {
            anyhow::bail!(
                "network {} is public and requires a private_key (set {}PRIVATE_KEY)",
                self.network,
                ENV_PREFIX
            );
        }

        let etherscan = self
            .etherscan
            .as_ref()
            .map(|e| -> Result<(Url, String)> {
                if e.api_key.trim().is_empty() {
                    anyhow::bail!("etherscan.api_key must not be empty");
                }
                let url = Url::parse(&e.api_url)
                    .with_context(|| format!("Invalid etherscan.api_url {}", e.api_url))?;
                Ok((url, e.api_key.clone()))
            })
            .transpose()?;

        Ok(ValidatedConfig {
            network: self.network.clone(),
            rpc_url,
            chain_id: self.chain_id.or_else(|| known_chain_id(&self.network)),
            signer,
            deployer: self.deployer,
            classifier,
            kind,
            confirmations: self.confirmations,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            artifacts: ArtifactStore::new(&self.artifacts_dir),
            registry_path: self.registry_path.clone(),
            etherscan,
        })
    }
}

/// Configuration that passed [`DeployConfig::validate`].
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub network: String,
    pub rpc_url: Url,
    pub chain_id: Option<u64>,
    pub signer: Option<LocalSigner>,
    pub deployer: Option<Address>,
    pub classifier: NetworkClassifier,
    pub kind: NetworkKind,
    pub confirmations: ConfirmationPolicy,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub artifacts: ArtifactStore,
    pub registry_path: PathBuf,
    etherscan: Option<(Url, String)>,
}

impl ValidatedConfig {
    pub fn rpc_settings(&self) -> RpcDeployerSettings {
        RpcDeployerSettings {
            rpc_url: self.rpc_url.clone(),
            chain_id: self.chain_id,
            signer: self.signer.clone(),
            deployer: self.deployer,
            artifacts: self.artifacts.clone(),
            poll_interval: self.poll_interval,
            confirmation_timeout: self.confirmation_timeout,
        }
    }

    /// Etherscan settings for `chain_id`, or `None` when no API key is configured.
    pub fn etherscan_settings(&self, chain_id: u64) -> Option<EtherscanSettings> {
        self.etherscan.as_ref().map(|(url, key)| {
            EtherscanSettings::new(url.clone(), key.clone(), chain_id, self.artifacts.clone())
        })
    }

    pub fn registry(&self) -> RegistryFile {
        RegistryFile::new(&self.registry_path)
    }
}
