// src/interception/mod.rs
//! Secure-sockets call interception
//!
//! - **Sockets**: the intercepted API surface (`SecureSockets` trait, handle,
//!   address and status types)
//! - **Traced Sockets**: decorator recording one trace event per call
//! - **Std Sockets**: host backend over `std::net::TcpStream`
//!
//! # Architecture
//!
//! ```text
//! Application
//!     │
//!     └─ connect/send/recv → TracedSockets ─→ backend (StdSockets, ...)
//!                                 │
//!                                 └─ store_event → TraceRecorder
//! ```
//!
//! Call sites opt in by holding a `TracedSockets` instead of the bare
//! backend; both implement `SecureSockets`.

pub mod sockets;
pub mod std_sockets;
pub mod traced_sockets;

// Re-export commonly used types
pub use sockets::{status, SecureSockets, Socket, SocketsSockaddr, Socklen};
pub use std_sockets::StdSockets;
pub use traced_sockets::{SocketsEventCodes, TracedSockets};
