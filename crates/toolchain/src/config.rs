//! Per-chain connection settings.
//!
//! Loaded from an optional `Scgen.toml` layered with `SCGEN_*`
//! environment variables; CLI flags override via serialized defaults.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolchainError};

/// EVM chain settings (Ganache + solc path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvmOptions {
    /// JSON-RPC endpoint of the dev network.
    pub rpc_url: String,
    /// Sender account for deployments; empty means "first unlocked
    /// account reported by eth_accounts".
    pub sender_address: String,
    /// Gas limit passed to eth_sendTransaction.
    pub gas_limit: u64,
    /// Port the local Ganache instance listens on.
    pub port: u16,
}

impl Default for EvmOptions {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            sender_address: String::new(),
            gas_limit: 6_000_000,
            port: 8545,
        }
    }
}

/// Solana chain settings (test validator + solana CLI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolanaOptions {
    pub rpc_url: String,
    /// Path to the deployer keypair; `~` is expanded.
    pub keypair_path: String,
    /// Start (and probe) a local solana-test-validator.
    pub use_local_validator: bool,
    /// Tear the validator down after a deployment this run started it for.
    pub stop_validator_after_deploy: bool,
    pub port: u16,
}

impl Default for SolanaOptions {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            keypair_path: "~/.config/solana/id.json".to_string(),
            use_local_validator: true,
            stop_validator_after_deploy: false,
            port: 8899,
        }
    }
}

/// Radix settings (resim inside Docker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadixOptions {
    /// Image carrying the scrypto toolchain and resim.
    pub docker_image: String,
    pub docker_tag: String,
}

impl Default for RadixOptions {
    fn default() -> Self {
        Self {
            docker_image: "ghcr.io/krulknul/try-scrypto".to_string(),
            docker_tag: "1.3.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScgenConfig {
    #[serde(default)]
    pub evm: EvmOptions,
    #[serde(default)]
    pub solana: SolanaOptions,
    #[serde(default)]
    pub radix: RadixOptions,
}

impl ScgenConfig {
    /// Defaults, then the TOML file if present, then `SCGEN_*` env vars
    /// (`SCGEN_SOLANA__RPC_URL` style nesting).
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ScgenConfig::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("SCGEN_").split("__"))
            .extract()
            .map_err(|e| ToolchainError::Validation(format!("invalid configuration: {e}")))
    }

    /// Expanded deployer keypair path.
    pub fn solana_keypair(&self) -> PathBuf {
        crate::fs::expand_home(&self.solana.keypair_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = ScgenConfig::load(None).unwrap();
        assert_eq!(config.evm.port, 8545);
        assert_eq!(config.solana.port, 8899);
        assert!(config.solana.use_local_validator);
        assert_eq!(config.radix.docker_tag, "1.3.0");
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let staging = crate::fs::StagingDir::new("scgen-config-test").unwrap();
        let path = staging.join("Scgen.toml");
        std::fs::write(
            &path,
            "[evm]\nrpc_url = \"http://10.0.0.5:9545\"\ngas_limit = 8000000\n",
        )
        .unwrap();

        let config = ScgenConfig::load(Some(&path)).unwrap();
        assert_eq!(config.evm.rpc_url, "http://10.0.0.5:9545");
        assert_eq!(config.evm.gas_limit, 8_000_000);
        // untouched sections keep their defaults
        assert_eq!(config.solana.port, 8899);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = ScgenConfig::load(Some(Path::new("/no/such/Scgen.toml"))).unwrap();
        assert_eq!(config, ScgenConfig::default());
    }

    #[test]
    fn test_keypair_path_expansion() {
        let config = ScgenConfig::default();
        let keypair = config.solana_keypair();
        assert!(!keypair.to_string_lossy().starts_with('~'));
    }
}
