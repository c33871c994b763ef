//! Script builder for resim runs inside the toolchain container.
//!
//! All resim steps run in one script within one container lifetime so
//! the simulator state created by `resim reset` / `resim new-account`
//! is still there when the package is published.

use crate::extract::DEPLOY_RESULT_MARKER;

/// Builder for the shell script executed inside the resim container.
#[derive(Debug, Clone)]
pub struct ResimScriptBuilder {
    wasm_file: String,
    reset: bool,
}

impl ResimScriptBuilder {
    /// Create a builder publishing the given wasm file (a path relative
    /// to the mounted workspace).
    pub fn new(wasm_file: impl Into<String>) -> Self {
        Self {
            wasm_file: wasm_file.into(),
            reset: true,
        }
    }

    /// Skip the `resim reset` step.
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Build the script body.
    pub fn build(self) -> String {
        let mut script = String::from("#!/bin/sh\nset -e\n");
        if self.reset {
            script.push_str("resim reset\n");
        }
        script.push_str("resim new-account\n");
        script.push_str(&format!(
            "PUBLISH_OUTPUT=$(resim publish \"/workspace/{}\")\n",
            self.wasm_file
        ));
        script.push_str("echo \"$PUBLISH_OUTPUT\"\n");
        // the marker line is what the orchestration layer parses
        script.push_str(
            "PACKAGE=$(echo \"$PUBLISH_OUTPUT\" | grep -o 'package_sim1[a-z0-9_]*' | head -n 1)\n",
        );
        script.push_str(&format!("echo \"{DEPLOY_RESULT_MARKER}$PACKAGE\"\n"));
        script
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_publishes_and_marks() {
        let script = ResimScriptBuilder::new("contract.wasm").build();
        assert!(script.starts_with("#!/bin/sh\nset -e\n"));
        assert!(script.contains("resim reset"));
        assert!(script.contains("resim new-account"));
        assert!(script.contains("resim publish \"/workspace/contract.wasm\""));
        assert!(script.contains("echo \"DEPLOY_RESULT:$PACKAGE\""));
    }

    #[test]
    fn test_reset_can_be_skipped() {
        let script = ResimScriptBuilder::new("contract.wasm").reset(false).build();
        assert!(!script.contains("resim reset"));
    }
}
