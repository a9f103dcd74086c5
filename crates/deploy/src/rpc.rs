//! Shared helpers for talking to an Ethereum JSON-RPC endpoint.

use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for a single RPC request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    error: Option<RpcError>,
}

/// Make a JSON-RPC call and deserialize the result.
///
/// A `null` result deserializes fine into an `Option<T>`, which is how pending
/// lookups such as `eth_getTransactionReceipt` are represented.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1
    });

    let envelope: RpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = envelope.error {
        anyhow::bail!("RPC error in {} ({}): {}", method, error.code, error.message);
    }

    serde_json::from_value(envelope.result.unwrap_or(Value::Null))
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value or `deadline` passes.
///
/// Errors from `check_fn` are treated as transient and logged; `Ok(None)` means
/// "not yet".
pub async fn poll_until<T, F, Fut>(
    name: &str,
    deadline: Instant,
    interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    loop {
        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                tracing::trace!(target_name = %name, "Not ready yet, polling again...");
            }
            Err(e) => {
                tracing::trace!(error = %e, target_name = %name, "Poll failed, retrying...");
            }
        }

        if Instant::now() >= deadline {
            anyhow::bail!("Timeout waiting for {}", name);
        }

        tokio::time::sleep(interval).await;
    }
}

/// Deserialize a u64 from a hex quantity string (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Deserialize)]
    struct Quantity {
        #[serde(deserialize_with = "deserialize_u64_from_hex")]
        value: u64,
    }

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x7a69").unwrap(), 31337);
        assert!(parse_hex_u64("0xzz").is_err());

        let q: Quantity = serde_json::from_str(r#"{"value":"0xaa36a7"}"#).unwrap();
        assert_eq!(q.value, 11155111);
    }

    #[test]
    fn test_response_envelope() {
        let pending: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert!(pending.result.is_none());
        assert!(pending.error.is_none());

        let failed: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        let error = failed.error.unwrap();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "nonce too low");
    }

    #[tokio::test]
    async fn test_poll_until_returns_first_value() {
        let calls = AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);

        let value = poll_until("counter", deadline, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => anyhow::bail!("transient"),
                    1 => Ok(None),
                    _ => Ok(Some(n)),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let deadline = Instant::now() + Duration::from_millis(20);
        let result: Result<(), _> =
            poll_until("never", deadline, Duration::from_millis(5), || async { Ok(None) }).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("Timeout waiting for never"));
    }
}
