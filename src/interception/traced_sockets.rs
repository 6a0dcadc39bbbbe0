// src/interception/traced_sockets.rs
//! Tracing decorator for the secure-sockets calls
//!
//! [`TracedSockets`] implements [`SecureSockets`] by calling the wrapped
//! backend first and then storing one event with the call's handle, the
//! relevant argument and the returned status. The status goes back to the
//! caller untouched, whatever it is and whether or not the event could be
//! stored.
//!
//! ```text
//! connect -> [socket, address, ret]   code base+0
//! send    -> [socket, ret]            code base+1
//! recv    -> [socket, ret]            code base+2
//! ```

use crate::extension::descriptor::{SOCKETS_CONNECT, SOCKETS_EXTENSION, SOCKETS_RECV, SOCKETS_SEND};
use crate::extension::registry::{RegisteredExtension, MAX_EVENT_CODE};
use crate::interception::sockets::{SecureSockets, Socket, SocketsSockaddr, Socklen};
use crate::recording::recorder::TraceRecorder;
use crate::utils::errors::{Result, TraceError};
use tracing::{debug, warn};

/// Absolute event codes for the three traced calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketsEventCodes {
    pub connect: u16,
    pub send: u16,
    pub recv: u16,
}

impl SocketsEventCodes {
    /// Codes for an extension block starting at `base_code`; the whole block
    /// must fit below [`MAX_EVENT_CODE`].
    pub fn from_base(base_code: u16) -> Result<Self> {
        check_code_range(base_code, SOCKETS_EXTENSION.count())?;

        Ok(Self {
            connect: base_code + SOCKETS_CONNECT,
            send: base_code + SOCKETS_SEND,
            recv: base_code + SOCKETS_RECV,
        })
    }

    pub fn from_registration(extension: &RegisteredExtension) -> Result<Self> {
        if extension.name != SOCKETS_EXTENSION.name || extension.version != SOCKETS_EXTENSION.version {
            return Err(TraceError::RegistrationFailed(format!(
                "expected {} {}, got {} {}",
                SOCKETS_EXTENSION.name, SOCKETS_EXTENSION.version, extension.name, extension.version
            )));
        }

        if extension.count < SOCKETS_EXTENSION.count() {
            return Err(TraceError::RegistrationFailed(format!(
                "{} needs {} codes, registration has {}",
                extension.name,
                SOCKETS_EXTENSION.count(),
                extension.count
            )));
        }

        check_code_range(extension.base_code, extension.count)?;
        Self::from_base(extension.base_code)
    }
}

fn check_code_range(base_code: u16, count: u16) -> Result<()> {
    let last = base_code as u32 + (count.max(1) as u32) - 1;
    if last > MAX_EVENT_CODE as u32 {
        return Err(TraceError::RegistrationFailed(format!(
            "codes {:#x}..={:#x} exceed max event code {:#x}",
            base_code, last, MAX_EVENT_CODE
        )));
    }
    Ok(())
}

/// Secure-sockets backend with every connect/send/recv traced
pub struct TracedSockets<S, R> {
    inner: S,
    recorder: R,
    codes: SocketsEventCodes,
}

impl<S: SecureSockets, R: TraceRecorder> TracedSockets<S, R> {
    /// Register the sockets extension with `recorder` and wrap `inner`
    pub fn register(inner: S, recorder: R) -> Result<Self> {
        let extension = recorder.register_extension(&SOCKETS_EXTENSION)?;
        let codes = SocketsEventCodes::from_registration(&extension)?;
        Ok(Self::with_codes(inner, recorder, codes))
    }

    /// Wrap `inner` using codes registered elsewhere
    pub fn with_codes(inner: S, recorder: R, codes: SocketsEventCodes) -> Self {
        debug!(
            "Tracing secure sockets with codes connect={} send={} recv={}",
            codes.connect, codes.send, codes.recv
        );

        Self {
            inner,
            recorder,
            codes,
        }
    }

    /// Untraced backend, for the calls this extension does not cover
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn codes(&self) -> SocketsEventCodes {
        self.codes
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn stored(&self, call: &str, result: Result<()>) {
        match result {
            Ok(()) => {}
            Err(TraceError::BufferFull) => debug!("Trace buffer full, {} event dropped", call),
            Err(e) => warn!("Failed to record {} event: {}", call, e),
        }
    }
}

impl<S: SecureSockets, R: TraceRecorder> SecureSockets for TracedSockets<S, R> {
    fn connect(&self, socket: Socket, address: &SocketsSockaddr, address_length: Socklen) -> i32 {
        let ret = self.inner.connect(socket, address, address_length);

        // The viewer reads ret == 0 as connected, anything else as timeout/error.
        self.stored(
            "connect",
            self.recorder
                .store_event3(self.codes.connect, socket.as_u32(), address.address, ret as u32),
        );

        ret
    }

    fn send(&self, socket: Socket, buffer: &[u8], flags: u32) -> i32 {
        let ret = self.inner.send(socket, buffer, flags);

        self.stored(
            "send",
            self.recorder
                .store_event2(self.codes.send, socket.as_u32(), ret as u32),
        );

        ret
    }

    fn recv(&self, socket: Socket, buffer: &mut [u8], flags: u32) -> i32 {
        let ret = self.inner.recv(socket, buffer, flags);

        self.stored(
            "recv",
            self.recorder
                .store_event2(self.codes.recv, socket.as_u32(), ret as u32),
        );

        ret
    }
}
