//! Lifecycle management for ephemeral dev networks.
//!
//! One manager instance owns one dev network (Ganache, solana-test-validator).
//! The handle to a process this manager started is instance state, not a
//! process-wide static, so isolated test runs cannot interfere with each
//! other.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{Result, ToolchainError},
    exec::{self, ExecRequest, ProcessHandle},
    probe::{self, ProbeFn},
};

/// Default interval between readiness polls after a start.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of readiness polls before giving up.
pub const DEFAULT_MAX_POLLS: u32 = 15;

/// Observable lifecycle state of a managed dev network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkStatus {
    Unknown,
    Checking,
    /// The network was already answering; nothing was started.
    Running,
    Starting,
    /// The network this manager started became healthy.
    Ready,
    TimedOut,
}

/// Supervises one ephemeral dev network: probe, start, poll, tear down.
pub struct NetworkLifecycleManager {
    name: String,
    launch: ExecRequest,
    port: u16,
    probe: ProbeFn,
    poll_interval: Duration,
    max_polls: u32,
    status: NetworkStatus,
    /// Present only for a process this manager started itself.
    handle: Option<ProcessHandle>,
}

impl NetworkLifecycleManager {
    /// Create a manager for a network reachable on `port`, launched with
    /// `launch` when not already running, probed with `probe`.
    pub fn new(name: impl Into<String>, launch: ExecRequest, port: u16, probe: ProbeFn) -> Self {
        Self {
            name: name.into(),
            launch,
            port,
            probe,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            status: NetworkStatus::Unknown,
            handle: None,
        }
    }

    /// Override the readiness poll cadence.
    pub fn poll(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Current lifecycle state.
    pub fn status(&self) -> NetworkStatus {
        self.status
    }

    /// Handle of the process this manager started, if any.
    pub fn handle(&self) -> Option<ProcessHandle> {
        self.handle
    }

    /// Ensure the network is answering, starting it if necessary.
    ///
    /// Idempotent: when the network already answers the probe, this is a
    /// no-op and no process is started. A port that is occupied but fails
    /// the probe is reported as a startup failure rather than silently
    /// restarted. When a start is needed, readiness is polled on a fixed
    /// interval up to a bounded attempt count; if the window elapses the
    /// just-started process tree is killed so no half-started network is
    /// left behind.
    pub async fn ensure_running(&mut self, token: &CancellationToken) -> Result<NetworkStatus> {
        self.status = NetworkStatus::Checking;

        if (self.probe)().await {
            tracing::info!(network = %self.name, "dev network already running");
            self.status = NetworkStatus::Running;
            return Ok(self.status);
        }

        if !probe::port_free(self.port).await {
            self.status = NetworkStatus::Unknown;
            return Err(ToolchainError::startup(
                &self.name,
                format!(
                    "port {} is occupied by a process that fails the readiness probe",
                    self.port
                ),
            ));
        }

        tracing::info!(network = %self.name, port = self.port, "starting dev network");
        let handle = exec::spawn_detached(&self.launch)?;
        self.handle = Some(handle);
        self.status = NetworkStatus::Starting;

        for attempt in 1..=self.max_polls {
            if let Err(e) = exec::sleep_cancellable(self.poll_interval, token, &self.name).await {
                self.kill_started();
                return Err(e);
            }

            // Each poll carries its own short timeout (inside the probe), so
            // one slow probe cannot stall the whole wait.
            if (self.probe)().await {
                tracing::info!(network = %self.name, attempt, "dev network ready");
                self.status = NetworkStatus::Ready;
                return Ok(self.status);
            }

            tracing::debug!(
                network = %self.name,
                attempt,
                max = self.max_polls,
                "dev network not ready yet"
            );
        }

        self.kill_started();
        self.status = NetworkStatus::TimedOut;
        Err(ToolchainError::Timeout {
            operation: format!("{} readiness", self.name),
            elapsed: self.poll_interval * self.max_polls,
        })
    }

    /// Stop the network if this manager started it.
    ///
    /// Never errors: returns false when there is nothing to stop, true when
    /// a kill was issued (a process observed already exited counts as
    /// stopped).
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            None => {
                tracing::debug!(network = %self.name, "nothing to stop");
                false
            }
            Some(handle) => {
                if handle.is_alive() {
                    handle.kill_tree();
                    tracing::info!(network = %self.name, pid = handle.pid(), "dev network stopped");
                } else {
                    tracing::debug!(network = %self.name, pid = handle.pid(), "dev network already exited");
                }
                self.status = NetworkStatus::Unknown;
                true
            }
        }
    }

    fn kill_started(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.kill_tree();
            tracing::warn!(
                network = %self.name,
                pid = handle.pid(),
                "killed dev network that failed to become ready"
            );
        }
    }
}

impl Drop for NetworkLifecycleManager {
    fn drop(&mut self) {
        // Best-effort: a network we started must not outlive its manager
        // unless stop() already ran.
        if let Some(handle) = self.handle.take() {
            handle.kill_tree();
        }
    }
}
