// src/lib.rs
//! Secure Sockets Trace Library
//!
//! Traces secure-sockets `connect`, `send` and `recv` calls into a trace
//! buffer that an offline viewer decodes by extension name and version.
//!
//! # Architecture
//!
//! - **interception**: the `SecureSockets` API, the tracing decorator and a
//!   host TCP backend
//! - **extension**: extension descriptors and event code allocation
//! - **recording**: trace buffer, recorder, binary stream and exporters
//! - **observability**: process logging
//! - **utils**: configuration and errors
//!
//! # Example
//!
//! ```no_run
//! use secure_sockets_trace::{BufferedRecorder, SecureSockets, SocketsSockaddr, StdSockets, TracedSockets};
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//!
//! let recorder = Arc::new(BufferedRecorder::default());
//! let sockets = TracedSockets::register(StdSockets::new(), Arc::clone(&recorder))?;
//!
//! let socket = sockets.inner().socket();
//! let address = SocketsSockaddr::new(Ipv4Addr::new(127, 0, 0, 1), 8883);
//! let ret = sockets.connect(socket, &address, SocketsSockaddr::SIZE);
//! assert_eq!(recorder.drain(1).len(), 1);
//! # let _ = ret;
//! # Ok::<(), secure_sockets_trace::TraceError>(())
//! ```

pub mod extension;
pub mod interception;
pub mod observability;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use extension::{ExtensionDescriptor, ExtensionVersion, RegisteredExtension, SOCKETS_EXTENSION};
pub use interception::{status, SecureSockets, Socket, SocketsSockaddr, StdSockets, TracedSockets};
pub use recording::{BufferedRecorder, StreamWriter, TraceEvent, TraceRecorder};
pub use utils::config::TraceConfig;
pub use utils::errors::{Result, TraceError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
