// src/utils/config.rs
//! Layered configuration: defaults, optional config file, environment
//!
//! Environment variables use the `SOCKETS_TRACE` prefix with `__` between
//! path segments, e.g. `SOCKETS_TRACE__RECORDER__CAPACITY=8192`.

use crate::extension::registry::MAX_EVENT_CODE;
use crate::recording::codec::MAX_RECORD_SIZE;
use crate::recording::compressor::{CompressionLevel, MAX_DECOMPRESSED_FRAME};
use crate::recording::trace_buffer::OverflowPolicy;
use crate::utils::errors::{Result, TraceError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default config file name (any extension the `config` crate understands)
pub const DEFAULT_CONFIG_NAME: &str = "sockets-trace";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SOCKETS_TRACE";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub recorder: RecorderConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

/// Trace buffer and code allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Number of events the buffer holds before the overflow policy applies
    pub capacity: usize,

    /// What happens when the buffer is full
    pub overflow: OverflowPolicy,

    /// First event code handed out to extensions
    pub first_extension_code: u16,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            overflow: OverflowPolicy::DropNewest,
            first_extension_code: 0x100,
        }
    }
}

/// Trace stream output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Output trace file
    pub path: PathBuf,

    /// Events per batch frame
    pub batch_size: usize,

    /// Periodic flush interval (milliseconds)
    pub flush_interval_ms: u64,

    /// Batch frame compression
    pub compression: CompressionLevel,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sockets-trace.tzxt"),
            batch_size: 256,
            flush_interval_ms: 100,
            compression: CompressionLevel::Disabled,
        }
    }
}

/// Process logging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TraceConfig {
    /// Load from `./sockets-trace.*` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit file (required) or the default name (optional)
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let builder = match path {
            Some(path) => Config::builder().add_source(File::from(path)),
            None => Config::builder()
                .add_source(File::with_name(DEFAULT_CONFIG_NAME).required(false)),
        };

        let config: TraceConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        debug!("Loaded configuration: {:?}", config);

        Ok(config)
    }

    /// Reject values the recorder or stream writer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.recorder.capacity == 0 {
            return Err(TraceError::ConfigError(
                "recorder.capacity must be greater than 0".to_string(),
            ));
        }

        if self.recorder.first_extension_code > MAX_EVENT_CODE {
            return Err(TraceError::ConfigError(format!(
                "recorder.first_extension_code must be at most {}",
                MAX_EVENT_CODE
            )));
        }

        if self.stream.batch_size == 0 {
            return Err(TraceError::ConfigError(
                "stream.batch_size must be greater than 0".to_string(),
            ));
        }

        let max_batch = MAX_DECOMPRESSED_FRAME / MAX_RECORD_SIZE;
        if self.stream.batch_size > max_batch {
            return Err(TraceError::ConfigError(format!(
                "stream.batch_size must be at most {}",
                max_batch
            )));
        }

        if self.stream.flush_interval_ms == 0 {
            return Err(TraceError::ConfigError(
                "stream.flush_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
