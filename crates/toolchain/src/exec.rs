//! Process execution primitive.
//!
//! Runs an external command with captured output, a bounded timeout and
//! cooperative cancellation. On timeout or cancellation the whole process
//! tree is killed, not just the top process (build tools spawn children).
//!
//! Children are started in their own session so the group can be signalled
//! as a unit on unix.

use std::{collections::HashMap, path::PathBuf, process::Stdio, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{io::AsyncReadExt, process::Command, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolchainError};

/// Default upper bound applied when a request does not carry its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Immutable description of one external command invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    envs: HashMap<String, String>,
}

impl ExecRequest {
    /// Create a request for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            envs: HashMap::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Override the default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add an environment variable override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    /// The program name, used in error reporting.
    pub fn program(&self) -> &str {
        &self.program
    }

    fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }

        // New session so the whole tree can be signalled via the pgid.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd
    }
}

/// Captured result of one command invocation. Owned by the caller.
#[derive(Debug)]
pub struct ExecOutcome {
    /// Exit code reported by the OS (-1 when terminated by a signal).
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
    /// OS process id of the spawned process.
    pub pid: Option<u32>,
    /// When the process was started.
    pub started_at: DateTime<Utc>,
}

impl ExecOutcome {
    /// Whether the command exited with code zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The stderr text, or a generic message when the tool printed nothing.
    pub fn error_message(&self) -> String {
        if self.stderr.trim().is_empty() {
            format!("process failed with exit code {}", self.exit_code)
        } else {
            self.stderr.clone()
        }
    }

    /// Promote a non-zero exit into a [`ToolchainError::Tool`].
    pub fn into_tool_result(self, tool: &str) -> Result<ExecOutcome> {
        if self.success() {
            Ok(self)
        } else {
            Err(ToolchainError::Tool {
                tool: tool.to_string(),
                code: self.exit_code,
                stderr: self.error_message(),
            })
        }
    }
}

/// Handle to a process launched with fire-and-continue semantics.
///
/// The process outlives the spawning call; the handle records the process
/// group so the tree can be killed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    /// The OS process id (also the process group id, since the child is a
    /// session leader).
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Kill the process and all of its descendants. Returns false if the
    /// tree was already gone.
    pub fn kill_tree(&self) -> bool {
        kill_tree(self.pid)
    }

    /// Whether the process (group leader) is still alive.
    pub fn is_alive(&self) -> bool {
        #[cfg(unix)]
        {
            unsafe { libc::kill(self.pid as i32, 0) == 0 }
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

/// Send SIGKILL to the process group rooted at `pid`.
pub(crate) fn kill_tree(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let alive = unsafe { libc::kill(-(pid as i32), libc::SIGKILL) } == 0;
        if alive {
            tracing::debug!(pid, "killed process tree");
        } else {
            tracing::trace!(pid, "process tree already gone");
        }
        alive
    }
    #[cfg(not(unix))]
    {
        tracing::warn!(pid, "process tree kill is best-effort on this platform");
        false
    }
}

/// Run a command to completion, capturing output.
///
/// The timeout comes from the request (or [`DEFAULT_TIMEOUT`]); it fires
/// independently of `token`, and only the timeout path is reported as
/// [`ToolchainError::Timeout`]. Caller cancellation surfaces as
/// [`ToolchainError::Cancelled`]. In both cases the process tree is killed
/// before returning. No retry happens here; retry policy belongs to callers.
pub async fn run(request: &ExecRequest, token: &CancellationToken) -> Result<ExecOutcome> {
    let timeout = request.effective_timeout();
    let started_at = Utc::now();
    let start = Instant::now();

    let mut child = request.command().spawn().map_err(|e| {
        ToolchainError::startup(request.program(), format!("{e}"))
    })?;
    let pid = child.id();

    tracing::debug!(
        program = %request.program(),
        args = ?request.args,
        ?pid,
        ?timeout,
        "process spawned"
    );

    // Drain stdout/stderr concurrently so the child cannot block on a full
    // pipe while we wait for it.
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(ref mut pipe) = stdout_pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(ref mut pipe) = stderr_pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = tokio::time::sleep(timeout) => {
            if let Some(pid) = pid {
                kill_tree(pid);
            }
            let _ = child.wait().await;
            tracing::warn!(program = %request.program(), ?timeout, "process timed out, tree killed");
            return Err(ToolchainError::Timeout {
                operation: request.program().to_string(),
                elapsed: start.elapsed(),
            });
        }
        _ = token.cancelled() => {
            if let Some(pid) = pid {
                kill_tree(pid);
            }
            let _ = child.wait().await;
            tracing::debug!(program = %request.program(), "process cancelled, tree killed");
            return Err(ToolchainError::cancelled(request.program()));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    let duration = start.elapsed();
    let exit_code = status.code().unwrap_or(-1);

    tracing::debug!(
        program = %request.program(),
        exit_code,
        ?duration,
        "process completed"
    );

    Ok(ExecOutcome {
        exit_code,
        stdout,
        stderr,
        duration,
        pid,
        started_at,
    })
}

/// Spawn a long-lived process and return without waiting for it.
///
/// Used for dev networks: the process is expected to outlive this call, so
/// output is discarded and reaping is delegated to a background task.
pub fn spawn_detached(request: &ExecRequest) -> Result<ProcessHandle> {
    let mut cmd = request.command();
    cmd.stdout(Stdio::null()).stderr(Stdio::null());
    cmd.kill_on_drop(false);

    let mut child = cmd.spawn().map_err(|e| {
        ToolchainError::startup(request.program(), format!("{e}"))
    })?;
    let pid = child.id().ok_or_else(|| {
        ToolchainError::startup(request.program(), "process exited before a pid was observed")
    })?;

    tracing::info!(program = %request.program(), pid, "detached process started");

    // Reap the child when it eventually exits so it never zombifies.
    tokio::spawn(async move {
        let _ = child.wait().await;
    });

    Ok(ProcessHandle { pid })
}

/// Sleep that aborts early when the token fires.
pub(crate) async fn sleep_cancellable(
    duration: Duration,
    token: &CancellationToken,
    operation: &str,
) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = token.cancelled() => Err(ToolchainError::cancelled(operation)),
    }
}
