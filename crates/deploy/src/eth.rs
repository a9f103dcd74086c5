//! [`ContractDeployer`] backed by an Ethereum JSON-RPC node.

use std::time::{Duration, Instant};

use alloy_core::primitives::{Address, B256, Bytes, U64, U256};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::{
    artifact::{ArtifactSpec, ArtifactStore},
    executor::{ContractDeployer, DeployedContract},
    rpc,
    signer::{CreationTransaction, LocalSigner},
};

/// Extra gas on top of the node's estimate, in percent.
const GAS_LIMIT_MARGIN_PERCENT: u64 = 20;

/// The account creation transactions are sent from.
#[derive(Debug, Clone)]
pub enum DeployerIdentity {
    /// An account unlocked on the node (hardhat/anvil dev accounts).
    NodeManaged(Address),
    /// A key held by this process; transactions are signed locally.
    Local(LocalSigner),
}

impl DeployerIdentity {
    pub fn address(&self) -> Address {
        match self {
            DeployerIdentity::NodeManaged(address) => *address,
            DeployerIdentity::Local(signer) => signer.address(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: B256,
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    block_number: u64,
    contract_address: Option<Address>,
    /// Absent on pre-Byzantium chains.
    status: Option<U64>,
}

impl TransactionReceipt {
    fn reverted(&self) -> bool {
        self.status.is_some_and(|s| s == U64::ZERO)
    }
}

/// Connection settings for [`JsonRpcDeployer::connect`].
#[derive(Debug, Clone)]
pub struct RpcDeployerSettings {
    pub rpc_url: Url,
    /// Expected chain id; the node's `eth_chainId` must match when set.
    pub chain_id: Option<u64>,
    /// Local signing key. Without one the node's account is used.
    pub signer: Option<LocalSigner>,
    /// Node-managed account to send from; defaults to `eth_accounts[0]`.
    pub deployer: Option<Address>,
    pub artifacts: ArtifactStore,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

/// Deploys compiled artifacts through a JSON-RPC endpoint and waits for the
/// requested confirmation depth by polling.
#[derive(Debug)]
pub struct JsonRpcDeployer {
    client: reqwest::Client,
    rpc_url: String,
    chain_id: u64,
    identity: DeployerIdentity,
    artifacts: ArtifactStore,
    poll_interval: Duration,
    confirmation_timeout: Duration,
}

impl JsonRpcDeployer {
    /// Connect to the node, check its chain id and resolve the deployer account.
    pub async fn connect(settings: RpcDeployerSettings) -> Result<Self> {
        let client = rpc::create_client()?;
        let rpc_url = settings.rpc_url.to_string();

        let chain_id_hex: String = rpc::json_rpc_call(&client, &rpc_url, "eth_chainId", vec![])
            .await
            .with_context(|| format!("Failed to reach RPC endpoint {}", rpc_url))?;
        let chain_id = rpc::parse_hex_u64(&chain_id_hex)
            .with_context(|| format!("Invalid chain id {}", chain_id_hex))?;

        if let Some(expected) = settings.chain_id {
            if expected != chain_id {
                anyhow::bail!(
                    "Chain id mismatch: configured {}, node at {} reports {}",
                    expected,
                    rpc_url,
                    chain_id
                );
            }
        }

        let identity = match (settings.signer, settings.deployer) {
            (Some(signer), _) => DeployerIdentity::Local(signer),
            (None, Some(address)) => DeployerIdentity::NodeManaged(address),
            (None, None) => {
                let accounts: Vec<Address> =
                    rpc::json_rpc_call(&client, &rpc_url, "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                let deployer = accounts
                    .first()
                    .copied()
                    .context("Node exposes no accounts and no private key is configured")?;
                DeployerIdentity::NodeManaged(deployer)
            }
        };

        tracing::info!(
            rpc_url = %rpc_url,
            chain_id,
            deployer = %identity.address(),
            local_signing = matches!(identity, DeployerIdentity::Local(_)),
            "Connected to network"
        );

        Ok(Self {
            client,
            rpc_url,
            chain_id,
            identity,
            artifacts: settings.artifacts,
            poll_interval: settings.poll_interval,
            confirmation_timeout: settings.confirmation_timeout,
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        rpc::json_rpc_call(&self.client, &self.rpc_url, method, params).await
    }

    async fn block_number(&self) -> Result<u64> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        Ok(rpc::parse_hex_u64(&hex)?)
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<TransactionReceipt>> {
        self.call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await
    }

    async fn send_creation(&self, data: Bytes) -> Result<B256> {
        match &self.identity {
            DeployerIdentity::NodeManaged(from) => self
                .call(
                    "eth_sendTransaction",
                    vec![json!({ "from": from, "data": data })],
                )
                .await
                .context("Failed to send creation transaction"),
            DeployerIdentity::Local(signer) => {
                let from = signer.address();
                let nonce_hex: String = self
                    .call("eth_getTransactionCount", vec![json!(from), json!("pending")])
                    .await
                    .context("Failed to fetch deployer nonce")?;
                let gas_price: U256 = self
                    .call("eth_gasPrice", vec![])
                    .await
                    .context("Failed to fetch gas price")?;
                let gas_hex: String = self
                    .call(
                        "eth_estimateGas",
                        vec![json!({ "from": from, "data": data })],
                    )
                    .await
                    .context("Failed to estimate deployment gas")?;
                let gas_estimate = rpc::parse_hex_u64(&gas_hex)?;

                let tx = CreationTransaction {
                    nonce: rpc::parse_hex_u64(&nonce_hex)?,
                    gas_price,
                    gas_limit: gas_estimate + gas_estimate * GAS_LIMIT_MARGIN_PERCENT / 100,
                    value: U256::ZERO,
                    data,
                };
                let raw = signer.sign_creation(&tx, self.chain_id)?;

                self.call("eth_sendRawTransaction", vec![json!(raw)])
                    .await
                    .context("Failed to send signed creation transaction")
            }
        }
    }

    async fn wait_for_depth(
        &self,
        tx_hash: B256,
        confirmations: u64,
        deadline: Instant,
    ) -> Result<TransactionReceipt> {
        let this = self;
        let receipt = rpc::poll_until(
            &format!("receipt of {}", tx_hash),
            deadline,
            self.poll_interval,
            move || this.transaction_receipt(tx_hash),
        )
        .await
        .context("Confirmation wait exceeded")?;

        if receipt.reverted() {
            anyhow::bail!(
                "Transaction {} reverted in block {}",
                receipt.transaction_hash,
                receipt.block_number
            );
        }

        // Inclusion counts as the first confirmation.
        let target = receipt.block_number + confirmations.saturating_sub(1);
        if confirmations > 1 {
            rpc::poll_until(
                &format!("{} confirmations of {}", confirmations, tx_hash),
                deadline,
                self.poll_interval,
                move || async move {
                    let head = this.block_number().await?;
                    tracing::debug!(tx_hash = %tx_hash, head, target, "Waiting for confirmations");
                    Ok((head >= target).then_some(head))
                },
            )
            .await
            .context("Confirmation wait exceeded")?;
        }

        Ok(receipt)
    }
}

impl ContractDeployer for JsonRpcDeployer {
    fn deployer_address(&self) -> Address {
        self.identity.address()
    }

    async fn deploy_and_wait(
        &self,
        spec: &ArtifactSpec,
        confirmations: u64,
    ) -> Result<DeployedContract> {
        let artifact = self.artifacts.load(spec.name())?;
        let data = artifact.creation_code(spec);

        let tx_hash = self.send_creation(data).await?;
        tracing::info!(
            artifact = spec.name(),
            tx_hash = %tx_hash,
            confirmations,
            "Creation transaction sent, waiting for confirmations..."
        );

        let deadline = Instant::now() + self.confirmation_timeout;
        let receipt = self.wait_for_depth(tx_hash, confirmations, deadline).await?;

        let address = receipt
            .contract_address
            .with_context(|| format!("Receipt of {} has no contract address", tx_hash))?;

        Ok(DeployedContract {
            address,
            tx_hash,
            block_number: receipt.block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_parsing() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x1b4",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
            "status": "0x1",
            "gasUsed": "0x5208",
        }))
        .unwrap();

        assert_eq!(receipt.block_number, 436);
        assert!(!receipt.reverted());
        assert_eq!(
            receipt.contract_address,
            Some("0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap())
        );
    }

    #[test]
    fn test_reverted_receipt() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x2",
            "contractAddress": null,
            "status": "0x0",
        }))
        .unwrap();

        assert!(receipt.reverted());
        assert_eq!(receipt.contract_address, None);
    }

    #[test]
    fn test_receipt_without_status_is_not_reverted() {
        let receipt: TransactionReceipt = serde_json::from_value(json!({
            "transactionHash": "0x88df016429689c079f3b2f6ad39fa052532c56795b733da78a91ebe6a713944b",
            "blockNumber": "0x2",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
        }))
        .unwrap();

        assert!(!receipt.reverted());
    }

    #[test]
    fn test_identity_address() {
        let node = DeployerIdentity::NodeManaged(Address::with_last_byte(3));
        assert_eq!(node.address(), Address::with_last_byte(3));

        let signer = LocalSigner::from_private_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        let expected = signer.address();
        assert_eq!(DeployerIdentity::Local(signer).address(), expected);
    }
}
