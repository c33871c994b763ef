//! Docker client for scripted build/deploy containers.
//!
//! Chains whose toolchain we do not install on the host (resim) run
//! inside a short-lived container: the whole multi-step sequence is a
//! single shell script executed once, so state created by one step
//! (accounts, local ledger) survives to the next.

use std::{path::Path, time::Duration};

use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, WaitContainerOptions,
    },
    image::CreateImageOptions,
    secret::HostConfig,
};
use futures::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolchainError};

/// Budget for pulling an absent image, separate from the run budget.
const IMAGE_PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Name of the script file written into the mounted workspace.
const SCRIPT_FILE_NAME: &str = "deploy.sh";

/// Fallback ids when the host user cannot be determined.
const FALLBACK_UID: u32 = 1000;
const FALLBACK_GID: u32 = 1000;

/// A Docker image reference with image name and tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DockerImage {
    pub image: String,
    pub tag: String,
}

impl DockerImage {
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
        }
    }

    /// Full image reference (image:tag).
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl std::fmt::Display for DockerImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.image, self.tag)
    }
}

/// One scripted container run.
#[derive(Debug, Clone)]
pub struct ScriptedRun {
    pub image: DockerImage,
    /// Host directory bind-mounted at /workspace; the script is written here.
    pub workspace: std::path::PathBuf,
    /// Host directory bind-mounted at /home/runner for toolchain caches.
    pub home: std::path::PathBuf,
    /// Shell script body executed inside the container.
    pub script: String,
    /// Wall-clock budget for the container run.
    pub timeout: Duration,
}

/// Combined output of a finished container run.
#[derive(Debug)]
pub struct ScriptedOutput {
    pub exit_code: i64,
    /// Interleaved stdout + stderr, in arrival order.
    pub output: String,
}

/// Thin wrapper over the bollard client.
pub struct ContainerOrchestrator {
    docker: Docker,
    name_generator: names::Generator<'static>,
}

impl ContainerOrchestrator {
    /// Connect to the local Docker daemon. An unreachable daemon is a
    /// startup failure, reported before any image or container work.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            ToolchainError::startup("docker", format!("cannot reach the Docker daemon: {e}"))
        })?;
        Ok(Self {
            docker,
            name_generator: names::Generator::default(),
        })
    }

    /// Make sure the image is available locally, pulling it if absent.
    /// The pull has its own budget, distinct from any build timeout.
    pub async fn ensure_image(&self, image: &DockerImage) -> Result<()> {
        let full_name = image.full_name();

        if self.docker.inspect_image(&full_name).await.is_ok() {
            tracing::debug!(image = %full_name, "image already available locally, skipping pull");
            return Ok(());
        }

        tracing::info!(image = %full_name, "image not found locally, pulling");

        let pull = async {
            let mut stream = self.docker.create_image(
                Some(CreateImageOptions {
                    from_image: image.image.clone(),
                    tag: image.tag.clone(),
                    ..Default::default()
                }),
                None,
                None,
            );

            while let Some(result) = stream.next().await {
                let info = result.map_err(|e| {
                    ToolchainError::Docker(format!("failed to pull image '{full_name}': {e}"))
                })?;
                if let Some(status) = info.status {
                    tracing::trace!(status, "image pull");
                }
            }
            Ok::<_, ToolchainError>(())
        };

        timeout(IMAGE_PULL_TIMEOUT, pull)
            .await
            .map_err(|_| ToolchainError::Timeout {
                operation: format!("pulling image {full_name}"),
                elapsed: IMAGE_PULL_TIMEOUT,
            })?
    }

    /// Write the run's script into its workspace and execute it inside
    /// a fresh container. The container is force-removed on every exit
    /// path; the caller owns the workspace/home directories.
    pub async fn run_scripted(
        &mut self,
        run: &ScriptedRun,
        token: &CancellationToken,
    ) -> Result<ScriptedOutput> {
        self.ensure_image(&run.image).await?;

        let script_path = run.workspace.join(SCRIPT_FILE_NAME);
        std::fs::write(&script_path, &run.script)?;

        let (uid, gid) = host_ids(&run.workspace);
        let container_name = format!("scgen-{}", self.name_generator.next().unwrap_or_default());

        let host_config = HostConfig {
            binds: Some(vec![
                format!("{}:/workspace", run.workspace.display()),
                format!("{}:/home/runner", run.home.display()),
            ]),
            ..Default::default()
        };

        let config = Config {
            image: Some(run.image.full_name()),
            entrypoint: Some(vec![
                "sh".to_string(),
                format!("/workspace/{SCRIPT_FILE_NAME}"),
            ]),
            user: Some(format!("{uid}:{gid}")),
            env: Some(vec!["HOME=/home/runner".to_string()]),
            working_dir: Some("/workspace".to_string()),
            host_config: Some(host_config),
            ..Default::default()
        };

        tracing::debug!(container_name, image = %run.image, "starting scripted container");

        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name.as_str(),
                    ..Default::default()
                }),
                config,
            )
            .await
            .map_err(|e| ToolchainError::Docker(format!("failed to create container: {e}")))?;
        let container_id = container.id;

        let result = self.start_and_collect(&container_id, run, token).await;

        // Force-remove regardless of how the run ended. The container is
        // not auto-removed so logs can still be read after exit.
        if let Err(e) = self
            .docker
            .remove_container(
                &container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::warn!(container_name, error = %e, "failed to remove container");
        } else {
            tracing::debug!(container_name, "container removed");
        }

        result
    }

    async fn start_and_collect(
        &self,
        container_id: &str,
        run: &ScriptedRun,
        token: &CancellationToken,
    ) -> Result<ScriptedOutput> {
        self.docker
            .start_container::<String>(container_id, None)
            .await
            .map_err(|e| ToolchainError::Docker(format!("failed to start container: {e}")))?;

        let execution = async {
            let exit_code = self.wait_for_exit(container_id).await?;
            let output = self.collect_logs(container_id).await?;
            Ok::<_, ToolchainError>(ScriptedOutput { exit_code, output })
        };

        tokio::select! {
            result = execution => result,
            _ = tokio::time::sleep(run.timeout) => Err(ToolchainError::Timeout {
                operation: format!("container run ({})", run.image),
                elapsed: run.timeout,
            }),
            _ = token.cancelled() => Err(ToolchainError::cancelled(format!(
                "container run ({})", run.image
            ))),
        }
    }

    async fn wait_for_exit(&self, container_id: &str) -> Result<i64> {
        let mut wait_stream = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits through the error variant
            // while still carrying the status code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(ToolchainError::Docker(format!(
                "failed to wait for container: {e}"
            ))),
            None => Err(ToolchainError::Docker(
                "container wait stream ended without a response".to_string(),
            )),
        }
    }

    /// Combined stdout+stderr of a finished container.
    async fn collect_logs(&self, container_id: &str) -> Result<String> {
        let mut log_stream = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut output = String::new();
        while let Some(entry) = log_stream.next().await {
            match entry {
                Ok(log) => output.push_str(&log.to_string()),
                Err(e) => {
                    tracing::warn!(container_id, error = %e, "error reading container logs");
                    break;
                }
            }
        }
        Ok(output)
    }
}

/// Numeric user/group ids the container should run as, so files written
/// into the bind mounts are not root-owned on the host.
#[cfg(unix)]
fn host_ids(workspace: &Path) -> (u32, u32) {
    use std::os::unix::fs::MetadataExt;
    match std::fs::metadata(workspace) {
        Ok(meta) => (meta.uid(), meta.gid()),
        Err(_) => (FALLBACK_UID, FALLBACK_GID),
    }
}

#[cfg(not(unix))]
fn host_ids(_workspace: &Path) -> (u32, u32) {
    (FALLBACK_UID, FALLBACK_GID)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::StagingDir;

    #[test]
    fn test_image_full_name() {
        let image = DockerImage::new("ghcr.io/krulknul/try-scrypto", "1.3.0");
        assert_eq!(image.full_name(), "ghcr.io/krulknul/try-scrypto:1.3.0");
        assert_eq!(image.to_string(), image.full_name());
    }

    #[test]
    fn test_host_ids_match_workspace_owner() {
        let staging = StagingDir::new("scgen-docker-test").unwrap();
        let (uid, gid) = host_ids(staging.path());
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let meta = std::fs::metadata(staging.path()).unwrap();
            assert_eq!((uid, gid), (meta.uid(), meta.gid()));
        }
        let _ = (uid, gid);
    }

    #[test]
    fn test_host_ids_fall_back_for_missing_path() {
        let (uid, gid) = host_ids(Path::new("/no/such/workspace"));
        assert_eq!((uid, gid), (FALLBACK_UID, FALLBACK_GID));
    }

    /// Requires a running Docker daemon with network access.
    #[tokio::test]
    #[ignore]
    async fn test_scripted_run_round_trip() {
        let workspace = StagingDir::new("scgen-docker-ws").unwrap();
        let home = StagingDir::new("scgen-docker-home").unwrap();

        let mut orchestrator = ContainerOrchestrator::connect().unwrap();
        let run = ScriptedRun {
            image: DockerImage::new("alpine", "3.20"),
            workspace: workspace.path().to_path_buf(),
            home: home.path().to_path_buf(),
            script: "echo DEPLOY_RESULT:package_sim1testaddressvalue000000\n".to_string(),
            timeout: Duration::from_secs(60),
        };

        let token = CancellationToken::new();
        let output = orchestrator.run_scripted(&run, &token).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert!(output.output.contains("DEPLOY_RESULT:"));
    }
}
