//! Lightweight readiness probes.
//!
//! Two questions get asked about a dev network before anything is started:
//! "is something already listening on its port" and "does that something
//! answer like a healthy node". A port that accepts connections but fails
//! the health probe is an occupied port, not a network to reuse.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::rpc;

/// Timeout applied to a single TCP connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout applied to a single health probe so one slow probe cannot stall
/// a whole readiness wait.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Boxed readiness check returning true when the service answers.
pub type ProbeFn = Box<dyn Fn() -> BoxFuture<'static, bool> + Send + Sync>;

/// Whether nothing is listening on `127.0.0.1:port`.
///
/// A successful connect means the port is occupied; every failure mode
/// (refused, timeout) counts as free.
pub async fn port_free(port: u16) -> bool {
    let connect = tokio::net::TcpStream::connect(("127.0.0.1", port));
    match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
        Ok(Ok(_)) => false,
        _ => true,
    }
}

/// Probe that succeeds when a JSON-RPC method call round-trips.
///
/// Used with `eth_blockNumber` for EVM nodes and `getHealth` for the Solana
/// validator; the result value is discarded, only transport success counts.
pub fn rpc_probe(client: reqwest::Client, url: String, method: &'static str) -> ProbeFn {
    Box::new(move || {
        let client = client.clone();
        let url = url.clone();
        async move {
            let call = rpc::json_rpc_call::<serde_json::Value>(&client, &url, method, vec![]);
            matches!(tokio::time::timeout(PROBE_TIMEOUT, call).await, Ok(Ok(_)))
        }
        .boxed()
    })
}

/// Probe that succeeds on any HTTP success status.
pub fn http_probe(client: reqwest::Client, url: String) -> ProbeFn {
    Box::new(move || {
        let client = client.clone();
        let url = url.clone();
        async move {
            let get = client.get(&url).send();
            match tokio::time::timeout(PROBE_TIMEOUT, get).await {
                Ok(Ok(resp)) => resp.status().is_success(),
                _ => false,
            }
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_port_free_on_unused_port() {
        // Bind then drop to find a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(port_free(port).await);
    }

    #[tokio::test]
    async fn test_port_occupied_when_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!port_free(port).await);
    }

    #[tokio::test]
    async fn test_rpc_probe_fails_against_nothing() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = rpc_probe(
            rpc::create_client().unwrap(),
            format!("http://127.0.0.1:{port}/"),
            "eth_blockNumber",
        );
        assert!(!probe().await);
    }
}
