//! Integration tests for scgen-toolchain.
//!
//! Most tests run with no external toolchain installed. The end-to-end
//! tests require solc/ganache on PATH and are #[ignore]d.
//! Run with: cargo test --test integration_test

use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use scgen_toolchain::{
    EvmOptions, EvmPipeline, InputFile, NetworkLifecycleManager, NetworkStatus, ToolchainError,
    exec::ExecRequest, probe,
};

/// Pick a port in a range unlikely to collide with anything listening.
fn random_free_port() -> u16 {
    rand::rng().random_range(41000..=49000)
}

/// Count entries in the system temp directory carrying a staging prefix.
fn staging_entries(prefix: &str) -> usize {
    std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
                .count()
        })
        .unwrap_or(0)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

/// The compile pipeline must leave no staging directory behind whether
/// the build tool is present, succeeds, or is missing entirely.
#[tokio::test]
async fn test_compile_leaves_no_staging_directory() -> Result<()> {
    init_test_tracing();

    let before = staging_entries("scgen-solc");

    let pipeline = EvmPipeline::new(EvmOptions::default())?;
    let source = InputFile::new(
        "Counter.sol",
        b"pragma solidity ^0.8.0; contract Counter {}".to_vec(),
    );
    // outcome depends on whether solc is installed; the cleanup
    // invariant does not
    let _ = pipeline.compile(source, &CancellationToken::new()).await;

    assert_eq!(staging_entries("scgen-solc"), before);
    Ok(())
}

/// Input validation fires before any network or process activity.
#[tokio::test]
async fn test_deploy_rejects_bad_pair_before_any_side_effect() -> Result<()> {
    init_test_tracing();

    let mut pipeline = EvmPipeline::new(EvmOptions {
        // nothing listens here; validation must fail first
        rpc_url: "http://127.0.0.1:1".to_string(),
        port: 1,
        ..EvmOptions::default()
    })?;

    let start = std::time::Instant::now();
    let err = pipeline
        .deploy(
            InputFile::new("a.abi", b"[]".to_vec()),
            InputFile::new("b.abi", b"[]".to_vec()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ToolchainError::Validation(_)));
    // no probe, no poll loop
    assert!(start.elapsed() < Duration::from_secs(1));
    Ok(())
}

/// A launcher that never produces a healthy service fails after the
/// configured attempts and leaves no process running.
#[tokio::test]
async fn test_unhealthy_network_start_fails_bounded_and_clean() -> Result<()> {
    init_test_tracing();

    let port = random_free_port();
    let launch = ExecRequest::new("sh").args(["-c", "sleep 600"]);
    let mut manager = NetworkLifecycleManager::new(
        "never-ready",
        launch,
        port,
        Box::new(|| async { false }.boxed()),
    )
    .poll(Duration::from_millis(50), 3);

    let err = manager
        .ensure_running(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ToolchainError::Timeout { .. }));
    assert_eq!(manager.status(), NetworkStatus::TimedOut);

    // the just-started process tree was killed, so there is nothing
    // left for stop() to act on
    assert!(!manager.stop());
    Ok(())
}

/// A network that is already answering its probe is never started twice.
#[tokio::test]
async fn test_ensure_running_is_idempotent() -> Result<()> {
    init_test_tracing();

    let port = random_free_port();
    // a launcher that would fail loudly if it were ever spawned
    let launch = ExecRequest::new("/nonexistent/dev-network");
    let mut manager = NetworkLifecycleManager::new(
        "already-up",
        launch,
        port,
        Box::new(|| async { true }.boxed()),
    );

    let token = CancellationToken::new();
    assert_eq!(
        manager.ensure_running(&token).await?,
        NetworkStatus::Running
    );
    assert_eq!(
        manager.ensure_running(&token).await?,
        NetworkStatus::Running
    );
    assert!(manager.handle().is_none());
    Ok(())
}

/// End-to-end: compile a one-function contract and deploy it.
/// Requires `solc` and `ganache` on PATH.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_evm_compile_and_deploy_end_to_end() -> Result<()> {
    init_test_tracing();

    let port = random_free_port();
    let options = EvmOptions {
        rpc_url: format!("http://127.0.0.1:{port}"),
        port,
        ..EvmOptions::default()
    };
    let token = CancellationToken::new();

    let source = b"// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\ncontract Counter { uint256 public n; function inc() public { n += 1; } }\n";

    let mut pipeline = EvmPipeline::new(options)?;
    let artifact = pipeline
        .compile(InputFile::new("Counter.sol", source.to_vec()), &token)
        .await?;
    assert!(!artifact.bytecode.is_empty());
    assert!(!artifact.interface.is_empty());

    let outcome = pipeline
        .deploy(
            InputFile::new(artifact.interface_file_name.clone(), artifact.interface),
            InputFile::new(artifact.bytecode_file_name.clone(), artifact.bytecode),
            &token,
        )
        .await?;
    assert!(outcome.address.starts_with("0x"));
    assert!(outcome.transaction.is_some());

    pipeline.stop_network();
    Ok(())
}

/// Swapped interface/bytecode inputs deploy the same as ordered ones.
/// Requires `solc` and `ganache` on PATH.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_swapped_inputs_deploy_identically() -> Result<()> {
    init_test_tracing();

    let port = random_free_port();
    let options = EvmOptions {
        rpc_url: format!("http://127.0.0.1:{port}"),
        port,
        ..EvmOptions::default()
    };
    let token = CancellationToken::new();

    let source = b"// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\ncontract Flag { bool public up; }\n";

    let mut pipeline = EvmPipeline::new(options)?;
    let artifact = pipeline
        .compile(InputFile::new("Flag.sol", source.to_vec()), &token)
        .await?;

    // bytecode first, interface second
    let outcome = pipeline
        .deploy(
            InputFile::new(artifact.bytecode_file_name.clone(), artifact.bytecode),
            InputFile::new(artifact.interface_file_name.clone(), artifact.interface),
            &token,
        )
        .await?;
    assert!(outcome.address.starts_with("0x"));

    pipeline.stop_network();
    Ok(())
}

/// The readiness probe alone reports a running network correctly.
#[tokio::test]
async fn test_port_probe_reflects_listener_state() -> Result<()> {
    let port = random_free_port();
    assert!(probe::port_free(port).await);

    let listener = std::net::TcpListener::bind(("127.0.0.1", port))?;
    assert!(!probe::port_free(port).await);
    drop(listener);
    Ok(())
}
