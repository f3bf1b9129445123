// Verification errors
//
// Domain failures raised by the comparator, storage verifier and orchestrator.
// Adapter and loader boundaries wrap these in `anyhow::Error`.

use ethers::types::Address;
use thiserror::Error;

/// Convenience alias for results carrying a [`VerifyError`]
pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("No bytecode found at address {0:?}")]
    NoBytecodeAtAddress(Address),

    #[error("Bytecode length mismatch: local {local} bytes, remote {remote} bytes")]
    LengthMismatch { local: usize, remote: usize },

    #[error("Bytecode mismatch after immutable substitution: {differing} bytes differ")]
    DefinitiveMismatch { differing: usize },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Unknown struct: {0}")]
    UnknownStruct(String),

    #[error("Unknown field: {field} in struct {structure}")]
    UnknownField { structure: String, field: String },

    #[error("Cannot access field {0} on non-struct type")]
    NotAStruct(String),

    #[error("Struct {0} has no baseSlot or namespace")]
    MissingBaseSlot(String),

    #[error("Invalid {key_type} key: {key}. {reason}")]
    InvalidMappingKey {
        key_type: String,
        key: String,
        reason: String,
    },

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Cannot decode {solidity_type} at byte offset {offset}: exceeds the 32-byte word")]
    PackedFieldOverflow { solidity_type: String, offset: usize },

    #[error("Invalid schema at {location}: {reason}")]
    InvalidSchema { location: String, reason: String },

    #[error("Function '{0}' not found in ABI")]
    FunctionNotFound(String),

    #[error(transparent)]
    InvalidHex(#[from] common::utils::HexError),

    #[error("Artifact error: {0}")]
    Artifact(String),
}
