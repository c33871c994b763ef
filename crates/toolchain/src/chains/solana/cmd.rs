//! Command builder for solana-test-validator.

/// Builder for solana-test-validator launch arguments.
#[derive(Debug, Clone)]
pub struct TestValidatorCmdBuilder {
    rpc_port: u16,
    reset: bool,
    quiet: bool,
}

impl TestValidatorCmdBuilder {
    pub fn new() -> Self {
        Self {
            rpc_port: 8899,
            reset: true,
            quiet: true,
        }
    }

    /// Set the JSON-RPC port.
    pub fn rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = port;
        self
    }

    /// Start from a fresh ledger instead of reusing the previous one.
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Suppress the validator's interactive dashboard.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Build the command as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec!["--rpc-port".to_string(), self.rpc_port.to_string()];
        if self.reset {
            cmd.push("--reset".to_string());
        }
        if self.quiet {
            cmd.push("--quiet".to_string());
        }
        cmd
    }
}

impl Default for TestValidatorCmdBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let cmd = TestValidatorCmdBuilder::new().build();
        assert_eq!(cmd, vec!["--rpc-port", "8899", "--reset", "--quiet"]);
    }

    #[test]
    fn test_reuse_ledger() {
        let cmd = TestValidatorCmdBuilder::new().reset(false).rpc_port(9899).build();
        assert!(!cmd.contains(&"--reset".to_string()));
        assert!(cmd.contains(&"9899".to_string()));
    }
}
