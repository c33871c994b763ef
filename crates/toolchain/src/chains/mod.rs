//! Per-chain compile and deploy pipelines.

pub mod evm;
pub mod radix;
pub mod solana;
