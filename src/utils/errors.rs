// src/utils/errors.rs
//! Error types for the recorder, registry, stream and configuration layers
//!
//! The traced socket wrappers never surface these: socket failures travel
//! as the wrapped call's status code, and recorder failures are logged and
//! swallowed at the call site.

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Trace buffer full, event dropped")]
    BufferFull,

    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    #[error("Extension registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Extension already registered: {0}")]
    DuplicateExtension(String),

    #[error("Event code space exhausted: {name} needs {count} codes from {first}, max is {max}")]
    CodeSpaceExhausted {
        name: String,
        first: u16,
        count: u16,
        max: u16,
    },

    #[error("Stream write failed: {0}")]
    StreamFailed(String),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;

impl From<config::ConfigError> for TraceError {
    fn from(e: config::ConfigError) -> Self {
        TraceError::ConfigError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TraceError::CodeSpaceExhausted {
            name: "aws_secure_sockets".to_string(),
            first: 4094,
            count: 3,
            max: 4095,
        };
        let msg = err.to_string();
        assert!(msg.contains("aws_secure_sockets"));
        assert!(msg.contains("4094"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TraceError = io.into();
        assert!(matches!(err, TraceError::Io(_)));
    }
}
