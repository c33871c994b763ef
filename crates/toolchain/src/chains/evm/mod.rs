//! EVM pipeline: solc compilation and deployment to a Ganache dev chain.

pub mod cmd;

use std::{path::Path, time::Duration};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::{
    artifact::{CompiledArtifact, DeploymentOutcome, InputFile, MAX_SOURCE_BYTES, resolve_program_pair},
    config::EvmOptions,
    error::{Result, ToolchainError},
    exec::{self, ExecRequest},
    fs::{self, StagingDir},
    network::{NetworkLifecycleManager, NetworkStatus},
    probe, rpc,
};

pub use cmd::GanacheCmdBuilder;

/// solc is fast; anything beyond this is a hang.
const SOLC_TIMEOUT: Duration = Duration::from_secs(120);
/// Total wait for a deployment transaction to be mined.
const RECEIPT_BUDGET: Duration = Duration::from_secs(60);

pub struct EvmPipeline {
    options: EvmOptions,
    client: reqwest::Client,
    network: NetworkLifecycleManager,
}

impl EvmPipeline {
    pub fn new(options: EvmOptions) -> Result<Self> {
        let client = rpc::create_client()?;
        let launch = ExecRequest::new("ganache")
            .args(GanacheCmdBuilder::new().port(options.port).build());
        let network = NetworkLifecycleManager::new(
            "ganache",
            launch,
            options.port,
            probe::rpc_probe(client.clone(), options.rpc_url.clone(), "eth_blockNumber"),
        );
        Ok(Self {
            options,
            client,
            network,
        })
    }

    pub async fn ensure_network(&mut self, token: &CancellationToken) -> Result<NetworkStatus> {
        self.network.ensure_running(token).await
    }

    pub fn stop_network(&mut self) -> bool {
        self.network.stop()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network.status()
    }

    /// Compile a single Solidity source with `solc --abi --bin --optimize`.
    pub async fn compile(
        &self,
        source: InputFile,
        token: &CancellationToken,
    ) -> Result<CompiledArtifact> {
        source.validate(".sol", MAX_SOURCE_BYTES)?;

        let staging = StagingDir::new("scgen-solc")?;
        let file_name = fs::safe_file_name(&source.name);
        std::fs::write(staging.join(&file_name), &source.bytes)?;
        let out_dir = staging.join("out");

        let request = ExecRequest::new("solc")
            .args(["--abi", "--bin", "--optimize", "-o"])
            .arg(out_dir.display().to_string())
            .arg(&file_name)
            .current_dir(staging.path())
            .timeout(SOLC_TIMEOUT);

        exec::run(&request, token).await?.into_tool_result("solc")?;

        let stem = Path::new(&file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Contract".to_string());

        let abi_path = locate_output(&out_dir, &stem, ".abi")?;
        let bin_path = locate_output(&out_dir, &stem, ".bin")?;

        let artifact = CompiledArtifact::new(
            std::fs::read(&bin_path)?,
            format!("{stem}.bin"),
            std::fs::read(&abi_path)?,
            format!("{stem}.abi"),
        );

        if artifact.bytecode.is_empty() {
            return Err(ToolchainError::Validation(format!(
                "solc produced empty bytecode for '{stem}' (is the contract abstract?)"
            )));
        }

        tracing::info!(
            contract = %stem,
            bytecode_bytes = artifact.bytecode.len(),
            "solidity compilation finished"
        );

        staging.close();
        Ok(artifact)
    }

    /// Deploy compiled bytecode via `eth_sendTransaction` and wait for
    /// the receipt. The abi/bin pair may arrive in either order.
    pub async fn deploy(
        &mut self,
        first: InputFile,
        second: InputFile,
        token: &CancellationToken,
    ) -> Result<DeploymentOutcome> {
        let (interface, bytecode) = resolve_program_pair(first, second, ".abi", ".bin")?;
        tracing::debug!(interface = %interface.name, bytecode = %bytecode.name, "deploying contract");

        self.network.ensure_running(token).await?;

        let sender = self.resolve_sender().await?;
        let data = deployment_data(&bytecode.bytes);
        let url = self.options.rpc_url.clone();

        let tx_hash: String = rpc::json_rpc_call(
            &self.client,
            &url,
            "eth_sendTransaction",
            vec![json!({
                "from": sender,
                "data": data,
                "gas": format!("{:#x}", self.options.gas_limit),
            })],
        )
        .await?;

        tracing::debug!(tx_hash, "deployment transaction submitted, waiting for receipt");

        let client = self.client.clone();
        let receipt: Value =
            rpc::wait_until_ready("transaction receipt", RECEIPT_BUDGET, token, || {
                let client = client.clone();
                let url = url.clone();
                let tx_hash = tx_hash.clone();
                async move {
                    let receipt: Value = rpc::json_rpc_call(
                        &client,
                        &url,
                        "eth_getTransactionReceipt",
                        vec![json!(tx_hash)],
                    )
                    .await?;
                    if receipt.is_null() {
                        Err(ToolchainError::Rpc("transaction not yet mined".to_string()))
                    } else {
                        Ok(receipt)
                    }
                }
            })
            .await?;

        let status = receipt["status"].as_str().unwrap_or("0x0");
        if status != "0x1" {
            return Err(ToolchainError::Rpc(format!(
                "deployment transaction {tx_hash} reverted (status {status})"
            )));
        }

        let address = receipt["contractAddress"]
            .as_str()
            .ok_or_else(|| {
                ToolchainError::Rpc("receipt carries no contract address".to_string())
            })?
            .to_string();

        tracing::info!(address, tx_hash, "contract deployed");
        Ok(DeploymentOutcome {
            address,
            transaction: Some(tx_hash),
        })
    }

    /// Configured sender, or the node's first unlocked account.
    async fn resolve_sender(&self) -> Result<String> {
        if !self.options.sender_address.is_empty() {
            return Ok(self.options.sender_address.clone());
        }
        let accounts: Vec<String> = rpc::json_rpc_call(
            &self.client,
            &self.options.rpc_url,
            "eth_accounts",
            vec![],
        )
        .await?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| ToolchainError::Rpc("node reports no unlocked accounts".to_string()))
    }
}

/// The `.bin` output of solc is hex text; normalize it into transaction
/// call data.
fn deployment_data(bin_bytes: &[u8]) -> String {
    let hex = String::from_utf8_lossy(bin_bytes);
    format!("0x{}", hex.trim().trim_start_matches("0x"))
}

fn locate_output(out_dir: &Path, stem: &str, extension: &str) -> Result<std::path::PathBuf> {
    let expected = out_dir.join(format!("{stem}{extension}"));
    if expected.is_file() {
        return Ok(expected);
    }
    // the contract name inside the source does not have to match the
    // file name, so fall back to any output with the right extension
    fs::find_by_extension(out_dir, extension).ok_or_else(|| ToolchainError::ArtifactMissing {
        expected: format!("{stem}{extension}"),
        listing: fs::dir_listing(out_dir),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compile_rejects_non_solidity_input() {
        let pipeline = EvmPipeline::new(EvmOptions::default()).unwrap();
        let err = pipeline
            .compile(
                InputFile::new("program.rs", b"fn main() {}".to_vec()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Validation(_)));
    }

    #[test]
    fn test_deployment_data_normalization() {
        assert_eq!(deployment_data(b"6080604052"), "0x6080604052");
        assert_eq!(deployment_data(b"0x6080604052\n"), "0x6080604052");
        assert_eq!(deployment_data(b"  6080  "), "0x6080");
    }

    #[test]
    fn test_locate_output_reports_listing() {
        let staging = StagingDir::new("scgen-evm-test").unwrap();
        std::fs::write(staging.join("Other.bin"), b"60").unwrap();
        // fallback by extension
        let found = locate_output(staging.path(), "Token", ".bin").unwrap();
        assert_eq!(found.file_name().unwrap(), "Other.bin");

        let err = locate_output(staging.path(), "Token", ".abi").unwrap_err();
        match err {
            ToolchainError::ArtifactMissing { expected, listing } => {
                assert_eq!(expected, "Token.abi");
                assert!(listing.contains("Other.bin"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Requires `solc` on PATH.
    #[tokio::test]
    #[ignore]
    async fn test_compile_trivial_contract() {
        let source = b"// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\ncontract Counter { uint256 public n; function inc() public { n += 1; } }\n";
        let pipeline = EvmPipeline::new(EvmOptions::default()).unwrap();
        let artifact = pipeline
            .compile(
                InputFile::new("Counter.sol", source.to_vec()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!artifact.bytecode.is_empty());
        assert!(!artifact.interface.is_empty());
    }
}
