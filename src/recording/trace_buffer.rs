// src/recording/trace_buffer.rs
//! Lock-free bounded trace buffer
//!
//! Multi-producer, multi-consumer: any thread running a traced socket call
//! pushes, the stream writer pops.

use crate::recording::event::RecordedEvent;
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// What to do with an event when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Stop when full: reject the new event
    #[default]
    DropNewest,

    /// Ring buffer: displace the oldest event
    OverwriteOldest,
}

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,

    /// Stored, an older event was lost to make room
    Displaced(RecordedEvent),

    /// Not stored
    Rejected(RecordedEvent),
}

pub struct TraceBuffer {
    queue: ArrayQueue<RecordedEvent>,
    policy: OverflowPolicy,
    push_count: AtomicU64,
    pop_count: AtomicU64,
    drop_count: AtomicU64,
}

impl TraceBuffer {
    /// Create a buffer holding `capacity` events. Panics if `capacity` is 0.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            policy,
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
        }
    }

    /// Push an event (non-blocking, lock-free)
    pub fn push(&self, event: RecordedEvent) -> PushOutcome {
        self.push_count.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.policy {
            OverflowPolicy::DropNewest => match self.queue.push(event) {
                Ok(()) => PushOutcome::Stored,
                Err(event) => PushOutcome::Rejected(event),
            },
            OverflowPolicy::OverwriteOldest => match self.queue.force_push(event) {
                None => PushOutcome::Stored,
                Some(oldest) => PushOutcome::Displaced(oldest),
            },
        };

        if outcome != PushOutcome::Stored {
            self.drop_count.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    pub fn try_pop(&self) -> Option<RecordedEvent> {
        let event = self.queue.pop()?;
        self.pop_count.fetch_add(1, Ordering::Relaxed);
        Some(event)
    }

    /// Pop up to `max` events in FIFO order
    pub fn drain(&self, max: usize) -> Vec<RecordedEvent> {
        let mut out = Vec::with_capacity(max.min(self.queue.len()));
        while out.len() < max {
            match self.try_pop() {
                Some(event) => out.push(event),
                None => break,
            }
        }
        out
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
            current_size: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Push attempts, whatever their outcome
    pub push_count: u64,

    pub pop_count: u64,

    /// Events lost to overflow (rejected or displaced)
    pub drop_count: u64,

    pub current_size: usize,

    pub capacity: usize,
}

impl BufferStats {
    pub fn fill_percentage(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.current_size as f64 / self.capacity as f64) * 100.0
        }
    }

    /// Percentage of pushed events lost to overflow
    pub fn drop_rate(&self) -> f64 {
        if self.push_count == 0 {
            0.0
        } else {
            (self.drop_count as f64 / self.push_count as f64) * 100.0
        }
    }
}
