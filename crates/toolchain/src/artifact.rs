//! Compile/deploy artifact value types and input validation.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolchainError};

/// Largest accepted single source file.
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;
/// Largest accepted packaged project archive.
pub const MAX_ARCHIVE_BYTES: usize = 50 * 1024 * 1024;

/// Output of a compile pipeline: bytecode plus an optional interface
/// description (ABI, IDL). Chains without a separate interface file
/// leave `interface` empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledArtifact {
    pub bytecode: Vec<u8>,
    pub bytecode_file_name: String,
    pub interface: Vec<u8>,
    pub interface_file_name: String,
    pub content_type: String,
}

impl CompiledArtifact {
    pub fn new(
        bytecode: Vec<u8>,
        bytecode_file_name: impl Into<String>,
        interface: Vec<u8>,
        interface_file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytecode,
            bytecode_file_name: bytecode_file_name.into(),
            interface,
            interface_file_name: interface_file_name.into(),
            content_type: "application/octet-stream".to_string(),
        }
    }
}

/// Normalized result of a deploy pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentOutcome {
    /// Deployed contract address, program id, or package address.
    pub address: String,
    /// Transaction hash or signature when the chain reports one.
    pub transaction: Option<String>,
}

/// An uploaded input file: a name plus its raw bytes.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.name.to_ascii_lowercase().ends_with(extension)
    }

    /// Reject empty, oversized, or wrongly named inputs before anything
    /// is staged or spawned.
    pub fn validate(&self, extension: &str, max_bytes: usize) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(ToolchainError::Validation(format!(
                "input file '{}' is empty",
                self.name
            )));
        }
        if self.bytes.len() > max_bytes {
            return Err(ToolchainError::Validation(format!(
                "input file '{}' is {} bytes, limit is {max_bytes}",
                self.name,
                self.bytes.len()
            )));
        }
        if !self.has_extension(extension) {
            return Err(ToolchainError::Validation(format!(
                "input file '{}' does not have the expected '{extension}' extension",
                self.name
            )));
        }
        Ok(())
    }
}

/// Resolve an (interface, bytecode) input pair, correcting a swapped
/// order by extension sniffing instead of rejecting it.
pub fn resolve_program_pair(
    first: InputFile,
    second: InputFile,
    interface_ext: &str,
    bytecode_ext: &str,
) -> Result<(InputFile, InputFile)> {
    let (interface, bytecode) = if first.has_extension(bytecode_ext) && second.has_extension(interface_ext)
    {
        tracing::debug!(
            first = %first.name,
            second = %second.name,
            "input files arrived swapped, correcting order"
        );
        (second, first)
    } else {
        (first, second)
    };
    interface.validate(interface_ext, MAX_SOURCE_BYTES)?;
    bytecode.validate(bytecode_ext, MAX_ARCHIVE_BYTES)?;
    Ok((interface, bytecode))
}
