//! Closed error taxonomy for the PSPF engine.
//!
//! Every fallible operation in this crate returns [`Result`], whose variants
//! map onto the error kinds of the format specification rather than onto
//! implementation details. Call sites classify a failure by matching on
//! `PspfError`, never by string-matching a message.

use thiserror::Error;

/// Closed set of error kinds the PSPF engine can produce.
#[derive(Debug, Error)]
pub enum PspfError {
    /// Magic trailer missing/corrupt, index checksum mismatch, descriptor
    /// overlap, bad opcode, or unsupported format version.
    #[error("format error: {0}")]
    Format(String),

    /// Slot checksum mismatch, signature invalid, or canonicalization
    /// mismatch.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Archive-limit violation, path escape, invalid workenv path, or
    /// deprecated/unknown metadata field.
    #[error("policy error: {0}")]
    Policy(String),

    /// Lock timeout, I/O failure, mmap failure, or out-of-disk.
    #[error("resource error: {0}")]
    Resource(String),

    /// Manifest missing a required field, invalid entry point, invalid
    /// umask/mode, or unknown opcode name.
    #[error("config error: {0}")]
    Config(String),

    /// Subprocess failed to spawn, or a command result the caller treats as
    /// fatal.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Package format not recognized at all (no magic trailer found).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Underlying I/O failure, preserved with its original type.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for library errors surfaced through `anyhow` at a
    /// dependency boundary (PE fixup, compression codecs).
    #[error("{0}")]
    Generic(String),
}

impl PspfError {
    /// Construct a [`PspfError::Format`] variant.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Construct a [`PspfError::Integrity`] variant.
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// Construct a [`PspfError::Policy`] variant.
    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    /// Construct a [`PspfError::Resource`] variant.
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Construct a [`PspfError::Config`] variant.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Construct a [`PspfError::Runtime`] variant.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

impl From<anyhow::Error> for PspfError {
    fn from(err: anyhow::Error) -> Self {
        PspfError::Generic(err.to_string())
    }
}

/// Result type for PSPF engine operations.
pub type Result<T> = std::result::Result<T, PspfError>;
