//! Network classification and the confirmation depth it implies.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Networks treated as local/development when no explicit set is configured.
pub const DEFAULT_DEVELOPMENT_NETWORKS: &[&str] = &["hardhat", "localhost"];

/// Confirmation depth on development networks.
pub const LOCAL_CONFIRMATIONS: u64 = 1;
/// Confirmation depth on persistent/public networks.
pub const PUBLIC_CONFIRMATIONS: u64 = 6;

/// Chain id used by the hardhat in-process and localhost nodes.
pub const HARDHAT_CHAIN_ID: u64 = 31337;
/// Sepolia testnet chain id.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;

/// Whether a network is disposable (local/dev) or persistent (public).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum NetworkKind {
    Local,
    Public,
}

impl NetworkKind {
    pub fn is_local(self) -> bool {
        self == NetworkKind::Local
    }

    /// Confirmation depth under the default policy.
    pub fn confirmations(self) -> u64 {
        ConfirmationPolicy::default().depth_for(self)
    }
}

/// Confirmation depth per network kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    pub local: u64,
    pub public: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            local: LOCAL_CONFIRMATIONS,
            public: PUBLIC_CONFIRMATIONS,
        }
    }
}

impl ConfirmationPolicy {
    pub fn depth_for(&self, kind: NetworkKind) -> u64 {
        match kind {
            NetworkKind::Local => self.local,
            NetworkKind::Public => self.public,
        }
    }
}

/// Decides whether a network name belongs to the development set.
///
/// Classification is a pure membership test: the same name always yields the
/// same answer for a given classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkClassifier {
    development: BTreeSet<String>,
}

impl Default for NetworkClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_DEVELOPMENT_NETWORKS.iter().copied())
    }
}

impl NetworkClassifier {
    pub fn new<I, S>(development: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            development: development.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_local(&self, network: &str) -> bool {
        self.development.contains(network)
    }

    pub fn classify(&self, network: &str) -> NetworkKind {
        if self.is_local(network) {
            NetworkKind::Local
        } else {
            NetworkKind::Public
        }
    }

    pub fn development_networks(&self) -> impl Iterator<Item = &str> {
        self.development.iter().map(String::as_str)
    }
}

/// The network a run is executed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkContext {
    pub name: String,
    pub chain_id: u64,
}

impl NetworkContext {
    pub fn new(name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            chain_id,
        }
    }
}

/// Chain id of a well-known network name, if any.
pub fn known_chain_id(network: &str) -> Option<u64> {
    match network {
        "hardhat" | "localhost" => Some(HARDHAT_CHAIN_ID),
        "sepolia" => Some(SEPOLIA_CHAIN_ID),
        _ => None,
    }
}
