// src/recording/mod.rs
//! Trace event recording and streaming
//!
//! - **Event**: fixed-shape trace event (code + up to three words)
//! - **Trace Buffer**: lock-free bounded MPMC queue with an overflow policy
//! - **Recorder**: `TraceRecorder` seam and the buffered implementation
//! - **Codec**: binary trace stream format
//! - **Compressor**: zstd compression of event batches
//! - **Stream Writer**: background task draining the buffer to a file
//! - **Exporter**: decoded JSON and text output
//!
//! # Architecture
//!
//! ```text
//! traced call → store_event() → Lock-Free Buffer → Stream Writer (tokio)
//!                                                       ↓
//!                                          Batch (batch_size events)
//!                                                       ↓
//!                                          Compress (zstd, optional)
//!                                                       ↓
//!                                          Trace file (.tzxt)
//! ```

pub mod codec;
pub mod compressor;
pub mod event;
pub mod exporter;
pub mod recorder;
pub mod stream_writer;
pub mod trace_buffer;

// Re-export commonly used types
pub use codec::{decode_stream, TraceFile};
pub use compressor::{CompressionLevel, Compressor};
pub use event::{RecordedEvent, TraceEvent};
pub use exporter::{ExportFormat, Exporter};
pub use recorder::{BufferedRecorder, TraceRecorder};
pub use stream_writer::{StreamStats, StreamWriter};
pub use trace_buffer::{BufferStats, OverflowPolicy, TraceBuffer};
