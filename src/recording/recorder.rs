// src/recording/recorder.rs
//! Trace recorder: the sink traced calls write into
//!
//! [`TraceRecorder`] is the seam the socket wrappers depend on.
//! [`BufferedRecorder`] is the in-process implementation: it assigns
//! extension codes, stamps every event with a sequence number and a
//! timestamp, and parks it in a lock-free [`TraceBuffer`] until the stream
//! writer drains it.

use crate::extension::descriptor::ExtensionDescriptor;
use crate::extension::registry::{ExtensionRegistry, RegisteredExtension};
use crate::recording::event::{RecordedEvent, TraceEvent};
use crate::recording::trace_buffer::{BufferStats, PushOutcome, TraceBuffer};
use crate::utils::config::RecorderConfig;
use crate::utils::errors::{Result, TraceError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Sink for trace events
pub trait TraceRecorder: Send + Sync {
    /// Reserve event codes for an extension
    fn register_extension(&self, descriptor: &ExtensionDescriptor) -> Result<RegisteredExtension>;

    /// Store one event. Must not block on I/O.
    fn store_event(&self, event: TraceEvent) -> Result<()>;

    fn store_event2(&self, code: u16, p1: u32, p2: u32) -> Result<()> {
        self.store_event(TraceEvent::with2(code, p1, p2))
    }

    fn store_event3(&self, code: u16, p1: u32, p2: u32, p3: u32) -> Result<()> {
        self.store_event(TraceEvent::with3(code, p1, p2, p3))
    }
}

impl<R: TraceRecorder + ?Sized> TraceRecorder for Arc<R> {
    fn register_extension(&self, descriptor: &ExtensionDescriptor) -> Result<RegisteredExtension> {
        (**self).register_extension(descriptor)
    }

    fn store_event(&self, event: TraceEvent) -> Result<()> {
        (**self).store_event(event)
    }
}

impl<R: TraceRecorder + ?Sized> TraceRecorder for &R {
    fn register_extension(&self, descriptor: &ExtensionDescriptor) -> Result<RegisteredExtension> {
        (**self).register_extension(descriptor)
    }

    fn store_event(&self, event: TraceEvent) -> Result<()> {
        (**self).store_event(event)
    }
}

/// In-process recorder backed by a bounded trace buffer
pub struct BufferedRecorder {
    buffer: TraceBuffer,
    registry: Mutex<ExtensionRegistry>,
    next_seq: AtomicU32,
    epoch: Instant,
    started_at: DateTime<Utc>,
}

impl BufferedRecorder {
    pub fn new(config: &RecorderConfig) -> Self {
        info!(
            "Initializing trace recorder (capacity {}, {:?})",
            config.capacity, config.overflow
        );

        Self {
            buffer: TraceBuffer::new(config.capacity, config.overflow),
            registry: Mutex::new(ExtensionRegistry::new(config.first_extension_code)),
            next_seq: AtomicU32::new(0),
            epoch: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Wall-clock time event timestamps are relative to
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Pop up to `max` buffered events, oldest first
    pub fn drain(&self, max: usize) -> Vec<RecordedEvent> {
        self.buffer.drain(max)
    }

    /// Registered extensions, in code order
    pub fn extensions(&self) -> Vec<RegisteredExtension> {
        self.registry.lock().extensions().to_vec()
    }

    pub fn stats(&self) -> BufferStats {
        self.buffer.stats()
    }
}

impl Default for BufferedRecorder {
    fn default() -> Self {
        Self::new(&RecorderConfig::default())
    }
}

impl TraceRecorder for BufferedRecorder {
    fn register_extension(&self, descriptor: &ExtensionDescriptor) -> Result<RegisteredExtension> {
        self.registry.lock().register(descriptor)
    }

    /// Sequence numbers are consumed even for rejected events, so gaps in a
    /// decoded trace mark where events were lost.
    fn store_event(&self, event: TraceEvent) -> Result<()> {
        let recorded = RecordedEvent {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            timestamp_ns: self.epoch.elapsed().as_nanos() as u64,
            event,
        };

        match self.buffer.push(recorded) {
            PushOutcome::Stored => Ok(()),
            PushOutcome::Displaced(oldest) => {
                debug!("Trace buffer full, overwrote event seq {}", oldest.seq);
                Ok(())
            }
            PushOutcome::Rejected(_) => Err(TraceError::BufferFull),
        }
    }
}
