// src/recording/compressor.rs
//! zstd compression for event batch frames

use crate::utils::errors::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::debug;

/// Largest frame payload `decompress` will produce
pub const MAX_DECOMPRESSED_FRAME: usize = 64 * 1024 * 1024;

/// Compression levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    /// Frames written raw
    #[default]
    Disabled,

    /// Fast compression (level 1)
    Fast,

    /// Balanced (level 3)
    Balanced,

    /// Best compression (level 19)
    Best,
}

impl CompressionLevel {
    /// zstd level, `None` when disabled
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            CompressionLevel::Disabled => None,
            CompressionLevel::Fast => Some(1),
            CompressionLevel::Balanced => Some(3),
            CompressionLevel::Best => Some(19),
        }
    }
}

pub struct Compressor {
    level: CompressionLevel,
}

impl Compressor {
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub fn is_enabled(&self) -> bool {
        self.level.as_i32().is_some()
    }

    /// Compress a frame payload; returns the input unchanged when disabled
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let Some(level) = self.level.as_i32() else {
            return Ok(data.to_vec());
        };

        let compressed = zstd::encode_all(data, level).map_err(|e| {
            TraceError::CompressionFailed(format!("Compression error: {}", e))
        })?;

        debug!(
            "Compressed {} bytes -> {} bytes at level {}",
            data.len(),
            compressed.len(),
            level
        );

        Ok(compressed)
    }

    /// Decompress a frame payload written with any level, refusing output
    /// larger than [`MAX_DECOMPRESSED_FRAME`]
    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let decoder = zstd::stream::read::Decoder::new(data).map_err(|e| {
            TraceError::CompressionFailed(format!("Decompression error: {}", e))
        })?;

        let mut out = Vec::new();
        decoder
            .take(MAX_DECOMPRESSED_FRAME as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| TraceError::CompressionFailed(format!("Decompression error: {}", e)))?;

        if out.len() > MAX_DECOMPRESSED_FRAME {
            return Err(TraceError::CompressionFailed(format!(
                "Decompressed frame exceeds {} bytes",
                MAX_DECOMPRESSED_FRAME
            )));
        }

        Ok(out)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressionLevel::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_levels() {
        assert_eq!(CompressionLevel::Disabled.as_i32(), None);
        assert_eq!(CompressionLevel::Fast.as_i32(), Some(1));
        assert_eq!(CompressionLevel::Balanced.as_i32(), Some(3));
        assert_eq!(CompressionLevel::Best.as_i32(), Some(19));
    }

    #[test]
    fn test_disabled_passes_through() {
        let compressor = Compressor::default();
        assert!(!compressor.is_enabled());

        let data = b"raw frame".to_vec();
        assert_eq!(compressor.compress(&data).unwrap(), data);
    }

    #[test]
    fn test_compress_decompress() {
        let compressor = Compressor::new(CompressionLevel::Balanced);

        // Repetitive record payloads, as produced by a busy socket loop
        let data = [0x01u8, 0x01, 0x02, 0x00, 0x07, 0x00, 0x00, 0x00].repeat(512);

        let compressed = compressor.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(Compressor::decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_decompress_rejects_oversized_frame() {
        // A few KiB of zeros expanding past the frame limit
        let bomb = zstd::encode_all(&vec![0u8; MAX_DECOMPRESSED_FRAME + 1][..], 1).unwrap();
        assert!(bomb.len() < 64 * 1024);

        let result = Compressor::decompress(&bomb);
        assert!(matches!(result, Err(TraceError::CompressionFailed(_))));
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let result = Compressor::decompress(b"not zstd");
        assert!(matches!(result, Err(TraceError::CompressionFailed(_))));
    }
}
