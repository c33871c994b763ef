//! scgen is a CLI tool to compile and deploy smart contracts against local dev networks.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::{Chain, Cli, Command, NetworkAction};
use scgen_toolchain::{
    CompiledArtifact, EvmPipeline, InputFile, RadixPipeline, ScgenConfig, SolanaPipeline, rpc,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = ScgenConfig::load(cli.config.as_deref())?;

    // Ctrl-C cancels in-flight toolchain work; started processes and
    // containers are torn down before the pipelines unwind.
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            signal_token.cancel();
        }
    });

    match cli.command {
        Command::Compile { chain, source, out } => {
            let input = read_input(&source)?;
            let artifact = match chain {
                Chain::Evm => EvmPipeline::new(config.evm)?.compile(input, &token).await?,
                Chain::Solana => {
                    SolanaPipeline::new(config.solana)?
                        .compile(input, &token)
                        .await?
                }
                Chain::Radix => RadixPipeline::new(config.radix).compile(input, &token).await?,
            };
            write_artifact(&artifact, &out)?;
        }

        Command::Deploy {
            chain,
            interface,
            bytecode,
        } => {
            let interface = read_input(&interface)?;
            let bytecode = read_input(&bytecode)?;
            let outcome = match chain {
                Chain::Evm => {
                    EvmPipeline::new(config.evm)?
                        .deploy(interface, bytecode, &token)
                        .await?
                }
                Chain::Solana => {
                    SolanaPipeline::new(config.solana)?
                        .deploy(interface, bytecode, &token)
                        .await?
                }
                Chain::Radix => {
                    RadixPipeline::new(config.radix)
                        .deploy(interface, bytecode, &token)
                        .await?
                }
            };
            tracing::info!(
                address = %outcome.address,
                transaction = outcome.transaction.as_deref().unwrap_or("n/a"),
                "deployment complete"
            );
            println!("{}", outcome.address);
        }

        Command::Network { action } => run_network_action(action, &config, &token).await?,
    }

    Ok(())
}

async fn run_network_action(
    action: NetworkAction,
    config: &ScgenConfig,
    token: &CancellationToken,
) -> Result<()> {
    match action {
        NetworkAction::Start { chain } => {
            let status = match chain {
                Chain::Evm => {
                    EvmPipeline::new(config.evm.clone())?
                        .ensure_network(token)
                        .await?
                }
                Chain::Solana => {
                    SolanaPipeline::new(config.solana.clone())?
                        .ensure_network(token)
                        .await?
                }
                Chain::Radix => {
                    anyhow::bail!("the radix simulator runs per-deployment inside Docker")
                }
            };
            tracing::info!(%chain, %status, "network is up");
        }

        NetworkAction::Stop { chain } => {
            let stopped = match chain {
                Chain::Evm => EvmPipeline::new(config.evm.clone())?.stop_network(),
                Chain::Solana => SolanaPipeline::new(config.solana.clone())?.stop_network(),
                Chain::Radix => {
                    anyhow::bail!("the radix simulator runs per-deployment inside Docker")
                }
            };
            // stop only terminates processes this instance started
            if !stopped {
                tracing::info!(%chain, "no network process started by this invocation");
            }
        }

        NetworkAction::Status { chain } => {
            let (url, method) = match chain {
                Chain::Evm => (config.evm.rpc_url.as_str(), "eth_blockNumber"),
                Chain::Solana => (config.solana.rpc_url.as_str(), "getHealth"),
                Chain::Radix => {
                    anyhow::bail!("the radix simulator runs per-deployment inside Docker")
                }
            };
            let client = rpc::create_client()?;
            match rpc::json_rpc_call::<serde_json::Value>(&client, url, method, vec![]).await {
                Ok(_) => {
                    tracing::info!(%chain, url, "network is reachable");
                    println!("running");
                }
                Err(e) => {
                    tracing::debug!(%chain, url, error = %e, "probe failed");
                    println!("not-running");
                }
            }
        }
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<InputFile> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(InputFile::new(name, bytes))
}

fn write_artifact(artifact: &CompiledArtifact, out: &Path) -> Result<()> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("failed to create output directory {}", out.display()))?;

    let bytecode_path = out.join(&artifact.bytecode_file_name);
    std::fs::write(&bytecode_path, &artifact.bytecode)
        .with_context(|| format!("failed to write {}", bytecode_path.display()))?;
    tracing::info!(path = %bytecode_path.display(), "wrote bytecode");

    if !artifact.interface.is_empty() {
        let interface_path = out.join(&artifact.interface_file_name);
        std::fs::write(&interface_path, &artifact.interface)
            .with_context(|| format!("failed to write {}", interface_path.display()))?;
        tracing::info!(path = %interface_path.display(), "wrote interface");
    }

    Ok(())
}
