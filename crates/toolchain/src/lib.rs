//! scgen-toolchain - Smart contract toolchain orchestration.
//!
//! This crate drives external blockchain toolchains (solc, anchor, the
//! solana CLI, resim-in-Docker) to compile and deploy contracts against
//! ephemeral dev networks, with bounded waits and guaranteed cleanup.

pub mod artifact;
pub mod chains;
pub mod config;
pub mod docker;
pub mod error;
pub mod exec;
pub mod extract;
pub mod fs;
pub mod funding;
pub mod generate;
pub mod json;
pub mod network;
pub mod probe;
pub mod rpc;

pub use artifact::{CompiledArtifact, DeploymentOutcome, InputFile};
pub use chains::{evm::EvmPipeline, radix::RadixPipeline, solana::SolanaPipeline};
pub use config::{EvmOptions, RadixOptions, ScgenConfig, SolanaOptions};
pub use error::{Result, ToolchainError};
pub use exec::{ExecOutcome, ExecRequest, ProcessHandle};
pub use network::{NetworkLifecycleManager, NetworkStatus};
