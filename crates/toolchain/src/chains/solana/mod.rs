//! Solana pipeline: Anchor builds and program deployment against a
//! solana-test-validator.

pub mod cmd;

use std::{path::PathBuf, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    artifact::{
        CompiledArtifact, DeploymentOutcome, InputFile, MAX_ARCHIVE_BYTES, resolve_program_pair,
    },
    config::SolanaOptions,
    error::{Result, ToolchainError},
    exec::{self, ExecRequest},
    extract,
    fs::{self, StagingDir},
    funding::{FaucetClient, FundingManager},
    network::{NetworkLifecycleManager, NetworkStatus},
    probe, rpc,
};

pub use cmd::TestValidatorCmdBuilder;

/// Anchor builds pull and compile full dependency trees.
const ANCHOR_TIMEOUT: Duration = Duration::from_secs(300);
/// Program deployment writes the binary in many transactions.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(300);
/// A deployment costs rent plus fees; 1 SOL covers small programs.
const MIN_DEPLOY_BALANCE: f64 = 1.0;

pub struct SolanaPipeline {
    options: SolanaOptions,
    network: NetworkLifecycleManager,
}

impl SolanaPipeline {
    pub fn new(options: SolanaOptions) -> Result<Self> {
        let client = rpc::create_client()?;
        let launch = ExecRequest::new("solana-test-validator")
            .args(TestValidatorCmdBuilder::new().rpc_port(options.port).build());
        let network = NetworkLifecycleManager::new(
            "solana-test-validator",
            launch,
            options.port,
            probe::rpc_probe(client, options.rpc_url.clone(), "getHealth"),
        );
        Ok(Self { options, network })
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

    /// Build an Anchor project from a packaged project archive and
    /// return the program binary plus its IDL.
    pub async fn compile(
        &self,
        archive: InputFile,
        token: &CancellationToken,
    ) -> Result<CompiledArtifact> {
        archive.validate(".tar.gz", MAX_ARCHIVE_BYTES)?;

        let staging = StagingDir::new("scgen-anchor")?;
        fs::extract_tar_gz(&archive.bytes, staging.path())?;
        let project_root = project_root(staging.path());

        let request = ExecRequest::new("anchor")
            .arg("build")
            .current_dir(&project_root)
            .timeout(ANCHOR_TIMEOUT);
        exec::run(&request, token).await?.into_tool_result("anchor")?;

        let deploy_dir = project_root.join("target/deploy");
        let idl_dir = project_root.join("target/idl");

        let so_path =
            fs::find_by_extension(&deploy_dir, ".so").ok_or_else(|| ToolchainError::ArtifactMissing {
                expected: "target/deploy/*.so".to_string(),
                listing: fs::dir_listing(&deploy_dir),
            })?;
        let idl_path =
            fs::find_by_extension(&idl_dir, ".json").ok_or_else(|| ToolchainError::ArtifactMissing {
                expected: "target/idl/*.json".to_string(),
                listing: fs::dir_listing(&idl_dir),
            })?;

        let artifact = CompiledArtifact::new(
            std::fs::read(&so_path)?,
            file_name_of(&so_path),
            std::fs::read(&idl_path)?,
            file_name_of(&idl_path),
        );

        tracing::info!(
            program = %artifact.bytecode_file_name,
            bytecode_bytes = artifact.bytecode.len(),
            "anchor build finished"
        );

        staging.close();
        Ok(artifact)
    }

    /// Deploy a program binary with the `solana` CLI. The idl/so pair
    /// may arrive in either order.
    pub async fn deploy(
        &mut self,
        first: InputFile,
        second: InputFile,
        token: &CancellationToken,
    ) -> Result<DeploymentOutcome> {
        let (idl, program) = resolve_program_pair(first, second, ".json", ".so")?;
        tracing::debug!(idl = %idl.name, program = %program.name, "deploying program");

        let keypair = fs::expand_home(&self.options.keypair_path);
        self.ensure_keypair(&keypair, token).await?;

        let started_here = if self.options.use_local_validator {
            matches!(self.ensure_network(token).await?, NetworkStatus::Ready)
        } else {
            false
        };

        let result = self.deploy_inner(program, &keypair, token).await;

        if started_here && self.options.stop_validator_after_deploy {
            self.stop_network();
        }

        result
    }

    async fn deploy_inner(
        &self,
        program: InputFile,
        keypair: &PathBuf,
        token: &CancellationToken,
    ) -> Result<DeploymentOutcome> {
        let faucet = SolanaCliFaucet {
            rpc_url: self.options.rpc_url.clone(),
            keypair: keypair.clone(),
        };
        FundingManager::new(faucet, MIN_DEPLOY_BALANCE)
            .ensure_funded(token)
            .await?;

        let staging = StagingDir::new("scgen-solana-deploy")?;
        let so_path = staging.join(fs::safe_file_name(&program.name));
        std::fs::write(&so_path, &program.bytes)?;

        // fresh keypair per deployment so the program id is unique
        let program_keypair = staging.join("program-keypair.json");
        let request = ExecRequest::new("solana-keygen")
            .args(["new", "--no-bip39-passphrase", "--force", "-o"])
            .arg(program_keypair.display().to_string());
        exec::run(&request, token).await?.into_tool_result("solana-keygen")?;

        let request = ExecRequest::new("solana")
            .args(["address", "-k"])
            .arg(program_keypair.display().to_string());
        let outcome = exec::run(&request, token).await?.into_tool_result("solana")?;
        let program_id = outcome.stdout.trim().to_string();

        let request = ExecRequest::new("solana")
            .args(["program", "deploy", "--url"])
            .arg(&self.options.rpc_url)
            .arg("--keypair")
            .arg(keypair.display().to_string())
            .arg("--program-id")
            .arg(program_keypair.display().to_string())
            .arg(so_path.display().to_string())
            .timeout(DEPLOY_TIMEOUT);
        let outcome = exec::run(&request, token).await?.into_tool_result("solana")?;

        let combined = format!("{}\n{}", outcome.stdout, outcome.stderr);
        let address = extract::program_id(&combined).unwrap_or(program_id);
        let transaction = extract::deploy_signature(&combined);

        tracing::info!(address, ?transaction, "program deployed");

        staging.close();
        Ok(DeploymentOutcome {
            address,
            transaction,
        })
    }

    /// Generate the deployer keypair on first use.
    async fn ensure_keypair(&self, keypair: &PathBuf, token: &CancellationToken) -> Result<()> {
        if keypair.is_file() {
            return Ok(());
        }
        tracing::info!(path = %keypair.display(), "deployer keypair absent, generating");
        if let Some(parent) = keypair.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let request = ExecRequest::new("solana-keygen")
            .args(["new", "--no-bip39-passphrase", "--force", "-o"])
            .arg(keypair.display().to_string());
        exec::run(&request, token).await?.into_tool_result("solana-keygen")?;
        Ok(())
    }
}

/// Faucet backed by the `solana` CLI.
pub struct SolanaCliFaucet {
    pub rpc_url: String,
    pub keypair: PathBuf,
}

impl FaucetClient for SolanaCliFaucet {
    async fn balance(&self, token: &CancellationToken) -> Result<f64> {
        let request = ExecRequest::new("solana")
            .args(["balance", "-k"])
            .arg(self.keypair.display().to_string())
            .arg("--url")
            .arg(&self.rpc_url);
        let outcome = exec::run(&request, token).await?;
        if !outcome.success() {
            tracing::debug!(stderr = %outcome.stderr.trim(), "balance query failed, reading as zero");
            return Ok(0.0);
        }
        // unparseable output reads as zero
        Ok(extract::sol_balance(&outcome.stdout).unwrap_or(0.0))
    }

    async fn airdrop(&self, amount: f64, token: &CancellationToken) -> Result<()> {
        let request = ExecRequest::new("solana")
            .arg("airdrop")
            .arg(amount.to_string())
            .arg("-k")
            .arg(self.keypair.display().to_string())
            .arg("--url")
            .arg(&self.rpc_url);
        exec::run(&request, token).await?.into_tool_result("solana")?;
        Ok(())
    }

    fn is_local(&self) -> bool {
        self.rpc_url.contains("127.0.0.1") || self.rpc_url.contains("localhost")
    }
}

/// Archives usually wrap the project in a single top-level directory.
fn project_root(staged: &std::path::Path) -> PathBuf {
    let entries: Vec<PathBuf> = std::fs::read_dir(staged)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .collect()
        })
        .unwrap_or_default();
    match entries.as_slice() {
        [single] if single.is_dir() => single.clone(),
        _ => staged.to_path_buf(),
    }
}

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
