//! JSON-RPC utilities shared by the readiness probes and the EVM deployer.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolchainError};

/// Default timeout for a single RPC request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between polling attempts when waiting for readiness.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| ToolchainError::Rpc(format!("failed to create HTTP client: {e}")))
}

/// Make a JSON-RPC call and deserialize the `result` field.
///
/// An `error` member in the response body is surfaced as
/// [`ToolchainError::Rpc`] with the server's message.
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
        .map_err(|e| ToolchainError::Rpc(format!("failed to send {method} request: {e}")))?;

    let body: Value = response
        .json()
        .await
        .map_err(|e| ToolchainError::Rpc(format!("failed to parse {method} response: {e}")))?;

    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Err(ToolchainError::Rpc(format!("{method}: {message}")));
    }

    let result = body
        .get("result")
        .ok_or_else(|| ToolchainError::Rpc(format!("{method}: no result in response")))?
        .clone();

    serde_json::from_value(result)
        .map_err(|e| ToolchainError::Rpc(format!("failed to deserialize {method} result: {e}")))
}

/// Repeatedly call `check_fn` until it succeeds or the budget elapses.
///
/// Each attempt is the caller's responsibility to bound; this loop bounds
/// the total wall-clock wait and honors the cancellation token between
/// attempts.
pub async fn wait_until_ready<F, Fut, T>(
    name: &str,
    budget: Duration,
    token: &CancellationToken,
    check_fn: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start = tokio::time::Instant::now();

    loop {
        if token.is_cancelled() {
            return Err(ToolchainError::cancelled(name));
        }

        match check_fn().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::trace!(error = %e, service = %name, "readiness check failed, retrying...");
            }
        }

        if start.elapsed() > budget {
            return Err(ToolchainError::Timeout {
                operation: format!("waiting for {name}"),
                elapsed: start.elapsed(),
            });
        }

        crate::exec::sleep_cancellable(DEFAULT_POLL_INTERVAL, token, name).await?;
    }
}
