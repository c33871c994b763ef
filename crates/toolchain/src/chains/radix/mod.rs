//! Radix pipeline: Scrypto wasm builds on the host, resim deployment
//! inside a Docker container so nothing has to be installed locally.

pub mod script;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    artifact::{CompiledArtifact, DeploymentOutcome, InputFile, MAX_ARCHIVE_BYTES},
    config::RadixOptions,
    docker::{ContainerOrchestrator, DockerImage, ScriptedRun},
    error::{Result, ToolchainError},
    exec::{self, ExecRequest},
    extract,
    fs::{self, StagingDir},
};

pub use script::ResimScriptBuilder;

/// Scrypto builds compile the full radix-engine dependency tree.
const SCRYPTO_BUILD_TIMEOUT: Duration = Duration::from_secs(600);
/// Container budget covers reset, account creation and publish.
const RESIM_RUN_TIMEOUT: Duration = Duration::from_secs(600);

pub struct RadixPipeline {
    options: RadixOptions,
}

impl RadixPipeline {
    pub fn new(options: RadixOptions) -> Self {
        Self { options }
    }

    /// Build a Scrypto package from a packaged project archive.
    pub async fn compile(
        &self,
        archive: InputFile,
        token: &CancellationToken,
    ) -> Result<CompiledArtifact> {
        archive.validate(".tar.gz", MAX_ARCHIVE_BYTES)?;

        let staging = StagingDir::new("scgen-scrypto")?;
        fs::extract_tar_gz(&archive.bytes, staging.path())?;
        let project_root = project_root(staging.path());

        let request = ExecRequest::new("cargo")
            .args(["build", "--target", "wasm32-unknown-unknown", "--release"])
            .current_dir(&project_root)
            .timeout(SCRYPTO_BUILD_TIMEOUT);
        exec::run(&request, token).await?.into_tool_result("cargo")?;

        let release_dir = project_root.join("target/wasm32-unknown-unknown/release");
        let wasm_path = fs::find_by_extension(&release_dir, ".wasm").ok_or_else(|| {
            ToolchainError::ArtifactMissing {
                expected: "target/wasm32-unknown-unknown/release/*.wasm".to_string(),
                listing: fs::dir_listing(&release_dir),
            }
        })?;

        let wasm_name = wasm_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // scrypto packages have no separate interface file
        let artifact = CompiledArtifact::new(std::fs::read(&wasm_path)?, wasm_name, Vec::new(), "");

        tracing::info!(
            package = %artifact.bytecode_file_name,
            bytecode_bytes = artifact.bytecode.len(),
            "scrypto build finished"
        );

        staging.close();
        Ok(artifact)
    }

    /// Publish a wasm package to a fresh resim ledger inside the
    /// toolchain container. The schema/wasm pair may arrive in either
    /// order; the schema file is optional.
    pub async fn deploy(
        &self,
        first: InputFile,
        second: InputFile,
        token: &CancellationToken,
    ) -> Result<DeploymentOutcome> {
        let (schema, wasm) = if first.has_extension(".wasm") {
            tracing::debug!(
                first = %first.name,
                second = %second.name,
                "input files arrived swapped, correcting order"
            );
            (second, first)
        } else {
            (first, second)
        };
        wasm.validate(".wasm", MAX_ARCHIVE_BYTES)?;

        let workspace = StagingDir::new("scgen-resim-ws")?;
        let home = StagingDir::new("scgen-resim-home")?;

        let wasm_name = fs::safe_file_name(&wasm.name);
        std::fs::write(workspace.join(&wasm_name), &wasm.bytes)?;
        if !schema.bytes.is_empty() {
            let schema_name = fs::safe_file_name(&schema.name);
            if schema_name != wasm_name {
                std::fs::write(workspace.join(&schema_name), &schema.bytes)?;
            }
        }

        let mut orchestrator = ContainerOrchestrator::connect()?;
        let run = ScriptedRun {
            image: DockerImage::new(&self.options.docker_image, &self.options.docker_tag),
            workspace: workspace.path().to_path_buf(),
            home: home.path().to_path_buf(),
            script: ResimScriptBuilder::new(&wasm_name).build(),
            timeout: RESIM_RUN_TIMEOUT,
        };

        let output = orchestrator.run_scripted(&run, token).await?;
        if output.exit_code != 0 {
            return Err(ToolchainError::Tool {
                tool: "resim".to_string(),
                code: output.exit_code as i32,
                stderr: output.output.trim().to_string(),
            });
        }

        if let Some(account) = extract::simulator_account(&output.output) {
            tracing::debug!(account, "simulator account created");
        }

        let address = extract::package_address(&output.output).ok_or_else(|| {
            ToolchainError::Tool {
                tool: "resim".to_string(),
                code: 0,
                stderr: format!(
                    "publish output carries no package address: {}",
                    output.output.trim()
                ),
            }
        })?;

        tracing::info!(address, "package published");

        workspace.close();
        home.close();
        Ok(DeploymentOutcome {
            address,
            transaction: Some("deployed_successfully".to_string()),
        })
    }
}

/// Archives usually wrap the project in a single top-level directory.
fn project_root(staged: &std::path::Path) -> std::path::PathBuf {
    let entries: Vec<std::path::PathBuf> = std::fs::read_dir(staged)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    match entries.as_slice() {
        [single] if single.is_dir() => single.clone(),
        _ => staged.to_path_buf(),
    }
}
