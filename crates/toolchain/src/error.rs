//! Error taxonomy for the toolchain orchestration layer.
//!
//! Every failure mode a caller has to react to differently gets its own
//! variant, so pipelines can tell "the compiler is not installed" apart
//! from "the compiler rejected the source" without string matching.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ToolchainError>;

/// Failures produced by the compile/deploy pipelines and their primitives.
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// An external binary or the container runtime could not be launched at
    /// all. Not retried automatically.
    #[error("failed to start '{program}': {message}")]
    Startup { program: String, message: String },

    /// A bounded wait (process, readiness poll, container run) exhausted its
    /// budget. Distinct from caller cancellation.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    /// The caller's cancellation signal fired mid-operation.
    #[error("{operation} was cancelled")]
    Cancelled { operation: String },

    /// An external tool ran but exited non-zero. Carries the tool's stderr
    /// verbatim so the underlying diagnostic reaches the caller.
    #[error("{tool} exited with code {code}: {stderr}")]
    Tool {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// A build succeeded but an expected output file is absent. The listing
    /// of the output directory is included to aid diagnosis.
    #[error("expected artifact '{expected}' not found; directory contents: {listing}")]
    ArtifactMissing { expected: String, listing: String },

    /// Malformed, oversized or wrong-type input, rejected before any
    /// process is spawned.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A JSON-RPC round-trip failed or returned an error response.
    #[error("rpc failure: {0}")]
    Rpc(String),

    /// A Docker API operation failed after the daemon was reachable.
    #[error("docker operation failed: {0}")]
    Docker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ToolchainError {
    /// Convenience constructor for [`ToolchainError::Startup`].
    pub fn startup(program: impl Into<String>, message: impl ToString) -> Self {
        Self::Startup {
            program: program.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`ToolchainError::Cancelled`].
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// True for failures caused by the environment (missing binary,
    /// unreachable daemon) rather than by the supplied input.
    pub fn is_environmental(&self) -> bool {
        matches!(self, Self::Startup { .. } | Self::Docker(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_stderr_verbatim() {
        let err = ToolchainError::Tool {
            tool: "solc".to_string(),
            code: 1,
            stderr: "ParserError: Expected ';'".to_string(),
        };
        assert!(err.to_string().contains("ParserError: Expected ';'"));
        assert!(err.to_string().contains("solc"));
    }

    #[test]
    fn test_environmental_classification() {
        assert!(ToolchainError::startup("docker", "daemon unreachable").is_environmental());
        assert!(!ToolchainError::Validation("empty file".into()).is_environmental());
    }
}
