use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Chain {
    Evm,
    Solana,
    Radix,
}

#[derive(Parser)]
#[command(name = "scgen")]
#[command(
    author,
    version,
    about = "Compile and deploy smart contracts against local dev networks"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "SCGEN_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to an Scgen.toml configuration file.
    ///
    /// Settings from the file are overridden by SCGEN_* environment
    /// variables.
    #[arg(long, alias = "conf", env = "SCGEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile contract source into a deployable artifact.
    Compile {
        /// The target chain.
        #[arg(long)]
        chain: Chain,

        /// Source file (.sol) or packaged project archive (.tar.gz).
        #[arg(long)]
        source: PathBuf,

        /// Directory to write the compiled artifacts into.
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Deploy a compiled artifact to the chain's dev network.
    Deploy {
        /// The target chain.
        #[arg(long)]
        chain: Chain,

        /// Interface/schema file (.abi, .json, .rpd).
        #[arg(long)]
        interface: PathBuf,

        /// Bytecode file (.bin, .so, .wasm).
        #[arg(long)]
        bytecode: PathBuf,
    },

    /// Manage a chain's local dev network.
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },
}

#[derive(Subcommand)]
pub enum NetworkAction {
    /// Start the dev network if it is not already running.
    Start {
        /// The target chain.
        #[arg(long)]
        chain: Chain,
    },
    /// Stop a dev network started by this process.
    ///
    /// Network handles live in the invocation that started them: a
    /// network started by an earlier run (or by hand) is left alone.
    Stop {
        /// The target chain.
        #[arg(long)]
        chain: Chain,
    },
    /// Probe the dev network and report its status.
    Status {
        /// The target chain.
        #[arg(long)]
        chain: Chain,
    },
}
