//! Etherscan source verification.

use std::time::Duration;

use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    artifact::ArtifactStore,
    verify::{VerificationOutcome, VerificationRequest, VerificationService},
};

/// Etherscan's multichain API endpoint.
pub const DEFAULT_ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_MAX_POLLS: usize = 24;

/// Raw response envelope shared by all Etherscan API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiResponse {
    status: String,
    message: String,
    result: String,
}

impl ApiResponse {
    fn is_ok(&self) -> bool {
        self.status == "1"
    }
}

/// Answer to a `verifysourcecode` submission.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Submission {
    Queued { guid: String },
    AlreadyVerified,
}

/// Answer to a `checkverifystatus` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckStatus {
    Pending,
    Done(VerificationOutcome),
}

/// Pending status check, distinguished from fatal errors by downcasting.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct NotYet(String);

fn is_already_verified(text: &str) -> bool {
    text.to_ascii_lowercase().contains("already verified")
}

fn classify_submission(response: ApiResponse) -> Result<Submission> {
    if response.is_ok() {
        return Ok(Submission::Queued {
            guid: response.result,
        });
    }
    if is_already_verified(&response.result) {
        return Ok(Submission::AlreadyVerified);
    }
    // Explorers only accept sources once they have indexed the bytecode.
    // Submissions are never repeated within a run, so this is final.
    if response.result.contains("Unable to locate ContractCode") {
        anyhow::bail!(
            "Etherscan has not indexed the contract yet: {}",
            response.result
        );
    }
    anyhow::bail!(
        "Etherscan rejected submission: {} ({})",
        response.result,
        response.message
    )
}

fn classify_status(response: ApiResponse) -> Result<CheckStatus> {
    if response.result.contains("Pending in queue") {
        return Ok(CheckStatus::Pending);
    }
    if is_already_verified(&response.result) {
        return Ok(CheckStatus::Done(VerificationOutcome::AlreadyVerified));
    }
    if response.is_ok() && response.result.starts_with("Pass") {
        return Ok(CheckStatus::Done(VerificationOutcome::Verified));
    }
    anyhow::bail!("Etherscan verification failed: {}", response.result)
}

/// Configuration for [`EtherscanClient`].
#[derive(Debug, Clone)]
pub struct EtherscanSettings {
    pub api_url: Url,
    pub api_key: String,
    pub chain_id: u64,
    pub artifacts: ArtifactStore,
    pub poll_interval: Duration,
    pub max_polls: usize,
}

impl EtherscanSettings {
    pub fn new(api_url: Url, api_key: impl Into<String>, chain_id: u64, artifacts: ArtifactStore) -> Self {
        Self {
            api_url,
            api_key: api_key.into(),
            chain_id,
            artifacts,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

/// [`VerificationService`] submitting standard-JSON input to Etherscan.
#[derive(Debug)]
pub struct EtherscanClient {
    client: reqwest::Client,
    settings: EtherscanSettings,
}

impl EtherscanClient {
    pub fn new(settings: EtherscanSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, settings })
    }

    async fn submit(&self, request: &VerificationRequest) -> Result<Submission> {
        let artifact = self.settings.artifacts.load(&request.artifact)?;
        let source = self.settings.artifacts.verification_source(&artifact)?;

        let address = request.address.to_string();
        let constructor_args = hex::encode(&request.constructor_args);
        let chain_id = self.settings.chain_id.to_string();
        let form = [
            ("apikey", self.settings.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", source.standard_json_input.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", source.qualified_name.as_str()),
            ("compilerversion", source.compiler_version.as_str()),
            // Misspelling is part of the Etherscan API.
            ("constructorArguements", constructor_args.as_str()),
        ];

        let response: ApiResponse = self
            .client
            .post(self.settings.api_url.clone())
            .query(&[("chainid", chain_id.as_str())])
            .form(&form)
            .send()
            .await
            .context("Failed to send verification request")?
            .json()
            .await
            .context("Failed to parse verification response")?;

        classify_submission(response)
    }

    async fn check(&self, guid: &str) -> Result<CheckStatus> {
        let chain_id = self.settings.chain_id.to_string();
        let response: ApiResponse = self
            .client
            .get(self.settings.api_url.clone())
            .query(&[
                ("chainid", chain_id.as_str()),
                ("apikey", self.settings.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .context("Failed to query verification status")?
            .json()
            .await
            .context("Failed to parse verification status")?;

        classify_status(response)
    }

    /// Status of `guid`, with a pending check reported as a retryable error.
    async fn outcome(&self, guid: &str) -> Result<VerificationOutcome> {
        match self.check(guid).await? {
            CheckStatus::Pending => Err(NotYet(format!("{} still pending", guid)).into()),
            CheckStatus::Done(outcome) => Ok(outcome),
        }
    }

    fn backoff(&self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.settings.poll_interval)
            .with_max_times(self.settings.max_polls)
    }
}

impl VerificationService for EtherscanClient {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome> {
        let guid = match self.submit(request).await? {
            Submission::AlreadyVerified => return Ok(VerificationOutcome::AlreadyVerified),
            Submission::Queued { guid } => guid,
        };
        tracing::info!(artifact = %request.artifact, guid = %guid, "Verification submitted");

        let guid = guid.as_str();
        (move || self.outcome(guid))
            .retry(self.backoff())
            .when(|e: &anyhow::Error| e.is::<NotYet>())
            .await
            .with_context(|| format!("Verification of {} did not complete", request.artifact))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use alloy_core::primitives::Address;
    use tempdir::TempDir;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::*;
    use crate::artifact::ArtifactSpec;

    fn response(status: &str, message: &str, result: &str) -> ApiResponse {
        ApiResponse {
            status: status.to_string(),
            message: message.to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn test_submission_queued() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"status":"1","message":"OK","result":"ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn"}"#,
        )
        .unwrap();
        assert_eq!(
            classify_submission(parsed).unwrap(),
            Submission::Queued {
                guid: "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn".to_string()
            }
        );
    }

    #[test]
    fn test_submission_already_verified() {
        let resp = response("0", "NOTOK", "Contract source code already verified");
        assert_eq!(classify_submission(resp).unwrap(), Submission::AlreadyVerified);
    }

    #[test]
    fn test_submission_before_indexing_is_final() {
        let resp = response(
            "0",
            "NOTOK",
            "Unable to locate ContractCode at 0x5FbDB2315678afecb367f032d93F642f64180aa3",
        );
        let err = classify_submission(resp).unwrap_err();
        assert!(!err.is::<NotYet>());
        assert!(err.to_string().contains("not indexed"));
    }

    #[test]
    fn test_submission_rejected() {
        let resp = response("0", "NOTOK", "Invalid API Key");
        let err = classify_submission(resp).unwrap_err();
        assert!(!err.is::<NotYet>());
        assert!(err.to_string().contains("Invalid API Key"));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(response("0", "NOTOK", "Pending in queue")).unwrap(),
            CheckStatus::Pending
        );
        assert_eq!(
            classify_status(response("1", "OK", "Pass - Verified")).unwrap(),
            CheckStatus::Done(VerificationOutcome::Verified)
        );
        assert_eq!(
            classify_status(response("1", "OK", "Already Verified")).unwrap(),
            CheckStatus::Done(VerificationOutcome::AlreadyVerified)
        );
        assert!(classify_status(response("0", "NOTOK", "Fail - Unable to verify")).is_err());
    }

    /// Hardhat layout with one compiled contract and its build info.
    fn artifact_store(root: &std::path::Path, name: &str) -> ArtifactStore {
        let dir = root.join(format!("contracts/{name}.sol"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::create_dir_all(root.join("build-info")).unwrap();
        std::fs::write(
            dir.join(format!("{name}.json")),
            serde_json::json!({
                "contractName": name,
                "sourceName": format!("contracts/{name}.sol"),
                "bytecode": "0x6001",
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            dir.join(format!("{name}.dbg.json")),
            r#"{"_format":"hh-sol-dbg-1","buildInfo":"../../build-info/abc.json"}"#,
        )
        .unwrap();
        std::fs::write(
            root.join("build-info/abc.json"),
            r#"{"solcLongVersion":"0.8.20+commit.a1b79de6","input":{"language":"Solidity"}}"#,
        )
        .unwrap();
        ArtifactStore::new(root)
    }

    /// Read one HTTP request, headers and body, off `stream`.
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Answer every request with `body`, counting requests.
    async fn serve(body: &'static str) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/v2/api", listener.local_addr().unwrap())).unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                read_request(&mut stream).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        (url, requests)
    }

    #[tokio::test]
    async fn test_unindexed_contract_is_submitted_once() {
        let tmp = TempDir::new("poolkit-etherscan").unwrap();
        let (url, requests) = serve(
            r#"{"status":"0","message":"NOTOK","result":"Unable to locate ContractCode at 0x0000000000000000000000000000000000000000"}"#,
        )
        .await;

        let mut settings =
            EtherscanSettings::new(url, "key", 11155111, artifact_store(tmp.path(), "BNB"));
        settings.poll_interval = Duration::from_millis(1);
        let client = EtherscanClient {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            settings,
        };

        let request = VerificationRequest::new(&ArtifactSpec::new("BNB"), Address::ZERO);
        let err = client.verify(&request).await.unwrap_err();

        assert!(err.to_string().contains("not indexed"));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }
}
