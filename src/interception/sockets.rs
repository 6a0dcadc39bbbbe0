// src/interception/sockets.rs
//! Secure-sockets API surface
//!
//! Calls report status the secure-sockets way: an `i32` that is a byte
//! count or zero on success and one of the negative [`status`] codes on
//! failure.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

/// Socket handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Socket(pub u32);

impl Socket {
    /// Handle value as recorded in trace events
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Address length argument
pub type Socklen = u32;

/// Only IPv4 is supported
pub const SOCKETS_AF_INET: u8 = 2;

/// Destination address. Port and address are in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketsSockaddr {
    pub length: u8,
    pub socket_domain: u8,
    pub port: u16,
    pub address: u32,
}

impl SocketsSockaddr {
    /// Length value callers pass as `address_length`
    pub const SIZE: Socklen = 8;

    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self {
            length: Self::SIZE as u8,
            socket_domain: SOCKETS_AF_INET,
            port,
            address: u32::from(address),
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.address)
    }

    pub fn to_socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip(), self.port)
    }
}

impl From<SocketAddrV4> for SocketsSockaddr {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

/// Status codes
pub mod status {
    pub const ERROR_NONE: i32 = 0;
    pub const SOCKET_ERROR: i32 = -1;
    pub const EWOULDBLOCK: i32 = -11;
    pub const ENOMEM: i32 = -12;
    pub const EINVAL: i32 = -22;
    pub const ENOPROTOOPT: i32 = -109;
    pub const ENOTCONN: i32 = -126;
    pub const EISCONN: i32 = -127;
    pub const ECLOSED: i32 = -128;

    pub fn name(code: i32) -> Option<&'static str> {
        Some(match code {
            ERROR_NONE => "SOCKETS_ERROR_NONE",
            SOCKET_ERROR => "SOCKETS_SOCKET_ERROR",
            EWOULDBLOCK => "SOCKETS_EWOULDBLOCK",
            ENOMEM => "SOCKETS_ENOMEM",
            EINVAL => "SOCKETS_EINVAL",
            ENOPROTOOPT => "SOCKETS_ENOPROTOOPT",
            ENOTCONN => "SOCKETS_ENOTCONN",
            EISCONN => "SOCKETS_EISCONN",
            ECLOSED => "SOCKETS_ECLOSED",
            _ => return None,
        })
    }
}

/// The three calls the trace extension intercepts
pub trait SecureSockets: Send + Sync {
    /// Connect to `address`. 0 on success, a negative status otherwise.
    fn connect(&self, socket: Socket, address: &SocketsSockaddr, address_length: Socklen) -> i32;

    /// Send `buffer`. Bytes sent, or a negative status.
    fn send(&self, socket: Socket, buffer: &[u8], flags: u32) -> i32;

    /// Receive into `buffer`. Bytes received, 0 on timeout, or a negative status.
    fn recv(&self, socket: Socket, buffer: &mut [u8], flags: u32) -> i32;
}

impl<S: SecureSockets + ?Sized> SecureSockets for Arc<S> {
    fn connect(&self, socket: Socket, address: &SocketsSockaddr, address_length: Socklen) -> i32 {
        (**self).connect(socket, address, address_length)
    }

    fn send(&self, socket: Socket, buffer: &[u8], flags: u32) -> i32 {
        (**self).send(socket, buffer, flags)
    }

    fn recv(&self, socket: Socket, buffer: &mut [u8], flags: u32) -> i32 {
        (**self).recv(socket, buffer, flags)
    }
}

impl<S: SecureSockets + ?Sized> SecureSockets for &S {
    fn connect(&self, socket: Socket, address: &SocketsSockaddr, address_length: Socklen) -> i32 {
        (**self).connect(socket, address, address_length)
    }

    fn send(&self, socket: Socket, buffer: &[u8], flags: u32) -> i32 {
        (**self).send(socket, buffer, flags)
    }

    fn recv(&self, socket: Socket, buffer: &mut [u8], flags: u32) -> i32 {
        (**self).recv(socket, buffer, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockaddr_conversion() {
        let addr = SocketsSockaddr::new(Ipv4Addr::new(192, 168, 1, 20), 8883);
        assert_eq!(addr.address, 0xc0a8_0114);
        assert_eq!(addr.socket_domain, SOCKETS_AF_INET);
        assert_eq!(addr.to_socket_addr().to_string(), "192.168.1.20:8883");

        let back = SocketsSockaddr::from(addr.to_socket_addr());
        assert_eq!(back, addr);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(status::name(0), Some("SOCKETS_ERROR_NONE"));
        assert_eq!(status::name(status::ECLOSED), Some("SOCKETS_ECLOSED"));
        assert_eq!(status::name(-5), None);
    }
}
