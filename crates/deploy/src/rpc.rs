//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{DeployError, Result};

/// Default timeout for RPC requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DeployError::config(format!("Failed to create HTTP client: {e}")))
}

fn rpc_error(method: &str, message: impl std::fmt::Display) -> DeployError {
    DeployError::Rpc {
        method: method.to_string(),
        message: message.to_string(),
    }
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or [`DeployError::Rpc`] if the request failed or the
/// node returned an error object. The error message of the node is kept verbatim
/// so that revert reasons survive.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| rpc_error(method, format!("failed to send request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| rpc_error(method, format!("failed to parse response: {e}")))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Err(rpc_error(method, message));
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| rpc_error(method, "no result in response"))?;

    serde_json::from_value(result_value)
        .map_err(|e| rpc_error(method, format!("failed to deserialize result: {e}")))
}

/// Deserialize a u64 from a hex quantity string (with 0x prefix).
pub fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_quantity(&s).map_err(serde::de::Error::custom)
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(s: &str) -> std::result::Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("quantity `{s}` is missing the 0x prefix"))?;
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity `{s}`: {e}"))
}

/// Format a u64 as a hex quantity.
pub fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}
