// src/recording/event.rs
//! Trace event types

use serde::{Deserialize, Serialize};

/// Most payload words a single event carries
pub const MAX_PARAMS: usize = 3;

/// Fixed-shape trace event: an event code and up to three payload words
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub code: u16,
    params: [u32; MAX_PARAMS],
    param_count: u8,
}

impl TraceEvent {
    pub fn with2(code: u16, p1: u32, p2: u32) -> Self {
        Self {
            code,
            params: [p1, p2, 0],
            param_count: 2,
        }
    }

    pub fn with3(code: u16, p1: u32, p2: u32, p3: u32) -> Self {
        Self {
            code,
            params: [p1, p2, p3],
            param_count: 3,
        }
    }

    /// Build from a decoded word slice; `None` if it holds more than three words
    pub fn from_params(code: u16, words: &[u32]) -> Option<Self> {
        if words.len() > MAX_PARAMS {
            return None;
        }

        let mut params = [0; MAX_PARAMS];
        params[..words.len()].copy_from_slice(words);

        Some(Self {
            code,
            params,
            param_count: words.len() as u8,
        })
    }

    /// Payload words in recorded order
    pub fn params(&self) -> &[u32] {
        &self.params[..self.param_count as usize]
    }
}

/// Event as held by the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Recorder-wide sequence number
    pub seq: u32,

    /// Nanoseconds since the recorder started
    pub timestamp_ns: u64,

    pub event: TraceEvent,
}
