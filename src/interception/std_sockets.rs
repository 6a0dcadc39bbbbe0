// src/interception/std_sockets.rs
//! Host secure-sockets backend over `std::net::TcpStream`
//!
//! Plain TCP, IPv4 only. Handles index a concurrent table, so one
//! `StdSockets` is shared by every thread using sockets. Flags are accepted
//! and ignored.

use crate::interception::sockets::{status, SecureSockets, Socket, SocketsSockaddr, Socklen, SOCKETS_AF_INET};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(10_000);

pub const SOCKETS_SHUT_RD: u32 = 0;
pub const SOCKETS_SHUT_WR: u32 = 1;
pub const SOCKETS_SHUT_RDWR: u32 = 2;

struct SocketState {
    stream: Option<Arc<TcpStream>>,
    recv_timeout: Duration,
    send_timeout: Duration,
    read_shut: bool,
    write_shut: bool,
}

pub struct StdSockets {
    sockets: DashMap<u32, Arc<Mutex<SocketState>>>,
    next_handle: AtomicU32,
}

impl StdSockets {
    pub fn new() -> Self {
        Self {
            sockets: DashMap::new(),
            next_handle: AtomicU32::new(1),
        }
    }

    /// Allocate an unconnected TCP socket
    pub fn socket(&self) -> Socket {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.sockets.insert(
            handle,
            Arc::new(Mutex::new(SocketState {
                stream: None,
                recv_timeout: DEFAULT_RECV_TIMEOUT,
                send_timeout: DEFAULT_SEND_TIMEOUT,
                read_shut: false,
                write_shut: false,
            })),
        );

        debug!("Allocated socket {}", handle);
        Socket(handle)
    }

    /// Receive timeout; zero is rejected
    pub fn set_receive_timeout(&self, socket: Socket, timeout: Duration) -> i32 {
        self.set_timeout(socket, timeout, |state, t| {
            state.recv_timeout = t;
            state.stream.as_ref().map(|s| s.set_read_timeout(Some(t)))
        })
    }

    /// Send (and connect) timeout; zero is rejected
    pub fn set_send_timeout(&self, socket: Socket, timeout: Duration) -> i32 {
        self.set_timeout(socket, timeout, |state, t| {
            state.send_timeout = t;
            state.stream.as_ref().map(|s| s.set_write_timeout(Some(t)))
        })
    }

    fn set_timeout<F>(&self, socket: Socket, timeout: Duration, apply: F) -> i32
    where
        F: FnOnce(&mut SocketState, Duration) -> Option<io::Result<()>>,
    {
        if timeout.is_zero() {
            return status::EINVAL;
        }

        let Some(entry) = self.entry(socket) else {
            return status::EINVAL;
        };

        let mut state = entry.lock();
        match apply(&mut state, timeout) {
            Some(Err(e)) => status_from_io(&e),
            _ => status::ERROR_NONE,
        }
    }

    /// Shut down one or both directions of a connected socket
    pub fn shutdown(&self, socket: Socket, how: u32) -> i32 {
        let Some(entry) = self.entry(socket) else {
            return status::EINVAL;
        };

        let (direction, read, write) = match how {
            SOCKETS_SHUT_RD => (Shutdown::Read, true, false),
            SOCKETS_SHUT_WR => (Shutdown::Write, false, true),
            SOCKETS_SHUT_RDWR => (Shutdown::Both, true, true),
            _ => return status::EINVAL,
        };

        let mut state = entry.lock();
        let Some(stream) = state.stream.clone() else {
            return status::ENOTCONN;
        };

        state.read_shut |= read;
        state.write_shut |= write;
        drop(state);

        match stream.shutdown(direction) {
            Ok(()) => status::ERROR_NONE,
            // Peer already gone: the direction is closed either way
            Err(e) if e.kind() == ErrorKind::NotConnected => status::ERROR_NONE,
            Err(e) => status_from_io(&e),
        }
    }

    /// Release the handle; the connection closes with the last reference
    pub fn close(&self, socket: Socket) -> i32 {
        match self.sockets.remove(&socket.0) {
            Some(_) => {
                debug!("Closed socket {}", socket.0);
                status::ERROR_NONE
            }
            None => status::EINVAL,
        }
    }

    /// Number of open handles
    pub fn open_count(&self) -> usize {
        self.sockets.len()
    }

    fn entry(&self, socket: Socket) -> Option<Arc<Mutex<SocketState>>> {
        self.sockets.get(&socket.0).map(|e| Arc::clone(e.value()))
    }

    /// Connected stream, or the status to return instead
    fn stream_for(&self, socket: Socket, sending: bool) -> Result<Arc<TcpStream>, i32> {
        let entry = self.entry(socket).ok_or(status::EINVAL)?;
        let state = entry.lock();

        let stream = state.stream.clone().ok_or(status::ENOTCONN)?;
        let shut = if sending { state.write_shut } else { state.read_shut };
        if shut {
            return Err(status::ECLOSED);
        }

        Ok(stream)
    }
}

impl Default for StdSockets {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureSockets for StdSockets {
    fn connect(&self, socket: Socket, address: &SocketsSockaddr, address_length: Socklen) -> i32 {
        let Some(entry) = self.entry(socket) else {
            return status::EINVAL;
        };

        if address.socket_domain != SOCKETS_AF_INET || address_length < SocketsSockaddr::SIZE {
            return status::EINVAL;
        }

        let (recv_timeout, send_timeout) = {
            let state = entry.lock();
            if state.stream.is_some() {
                return status::EISCONN;
            }
            (state.recv_timeout, state.send_timeout)
        };

        let target = SocketAddr::V4(address.to_socket_addr());
        let stream = match TcpStream::connect_timeout(&target, send_timeout) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Socket {} connect to {} failed: {}", socket.0, target, e);
                return status_from_io(&e);
            }
        };

        if let Err(e) = stream
            .set_read_timeout(Some(recv_timeout))
            .and_then(|_| stream.set_write_timeout(Some(send_timeout)))
        {
            return status_from_io(&e);
        }

        let mut state = entry.lock();
        if state.stream.is_some() {
            // Lost a race with another connect on the same handle
            return status::EISCONN;
        }
        state.stream = Some(Arc::new(stream));

        debug!("Socket {} connected to {}", socket.0, target);
        status::ERROR_NONE
    }

    fn send(&self, socket: Socket, buffer: &[u8], _flags: u32) -> i32 {
        let stream = match self.stream_for(socket, true) {
            Ok(stream) => stream,
            Err(code) => return code,
        };

        let len = buffer.len().min(i32::MAX as usize);
        match (&*stream).write(&buffer[..len]) {
            Ok(n) => n as i32,
            Err(e) => status_from_io(&e),
        }
    }

    fn recv(&self, socket: Socket, buffer: &mut [u8], _flags: u32) -> i32 {
        let stream = match self.stream_for(socket, false) {
            Ok(stream) => stream,
            Err(code) => return code,
        };

        if buffer.is_empty() {
            return 0;
        }

        let len = buffer.len().min(i32::MAX as usize);
        match (&*stream).read(&mut buffer[..len]) {
            Ok(0) => status::ECLOSED,
            Ok(n) => n as i32,
            // Timed out with nothing to read
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => 0,
            Err(e) => status_from_io(&e),
        }
    }
}

fn status_from_io(e: &io::Error) -> i32 {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => status::EWOULDBLOCK,
        ErrorKind::NotConnected => status::ENOTCONN,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            status::ECLOSED
        }
        ErrorKind::OutOfMemory => status::ENOMEM,
        ErrorKind::InvalidInput => status::EINVAL,
        _ => status::SOCKET_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
    use std::thread;

    /// Listener on an ephemeral loopback port running `handler` for one client
    fn serve_once<F>(handler: F) -> (SocketsSockaddr, thread::JoinHandle<()>)
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            handler(stream);
        });
        (SocketsSockaddr::new(Ipv4Addr::LOCALHOST, port), handle)
    }

    #[test]
    fn test_echo_round_trip() {
        let (addr, server) = serve_once(|mut stream| {
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let sockets = StdSockets::new();
        let socket = sockets.socket();

        assert_eq!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE), status::ERROR_NONE);
        assert_eq!(sockets.send(socket, b"hello", 0), 5);

        let mut buf = [0u8; 16];
        let mut received = 0;
        while received < 5 {
            let n = sockets.recv(socket, &mut buf[received..], 0);
            assert!(n > 0);
            received += n as usize;
        }
        assert_eq!(&buf[..5], b"hello");

        server.join().unwrap();
        assert_eq!(sockets.close(socket), status::ERROR_NONE);
        assert_eq!(sockets.open_count(), 0);
    }

    #[test]
    fn test_unknown_handle() {
        let sockets = StdSockets::new();
        let addr = SocketsSockaddr::new(Ipv4Addr::LOCALHOST, 1);

        assert_eq!(sockets.connect(Socket(99), &addr, SocketsSockaddr::SIZE), status::EINVAL);
        assert_eq!(sockets.send(Socket(99), b"x", 0), status::EINVAL);
        assert_eq!(sockets.recv(Socket(99), &mut [0u8; 1], 0), status::EINVAL);
        assert_eq!(sockets.close(Socket(99)), status::EINVAL);
    }

    #[test]
    fn test_not_connected() {
        let sockets = StdSockets::new();
        let socket = sockets.socket();

        assert_eq!(sockets.send(socket, b"x", 0), status::ENOTCONN);
        assert_eq!(sockets.recv(socket, &mut [0u8; 1], 0), status::ENOTCONN);
        assert_eq!(sockets.shutdown(socket, SOCKETS_SHUT_RDWR), status::ENOTCONN);
    }

    #[test]
    fn test_invalid_address() {
        let sockets = StdSockets::new();
        let socket = sockets.socket();

        let mut addr = SocketsSockaddr::new(Ipv4Addr::LOCALHOST, 80);
        assert_eq!(sockets.connect(socket, &addr, 2), status::EINVAL);

        addr.socket_domain = 10;
        assert_eq!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE), status::EINVAL);
    }

    #[test]
    fn test_already_connected() {
        let (addr, server) = serve_once(|stream| drop(stream));

        let sockets = StdSockets::new();
        let socket = sockets.socket();

        assert_eq!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE), status::ERROR_NONE);
        assert_eq!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE), status::EISCONN);
        server.join().unwrap();
    }

    #[test]
    fn test_connection_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let sockets = StdSockets::new();
        let socket = sockets.socket();
        let addr = SocketsSockaddr::from(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port));

        assert!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE) < 0);
    }

    #[test]
    fn test_recv_timeout_returns_zero() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let (addr, server) = serve_once(move |stream| {
            // Hold the connection open without sending
            let _ = rx.recv();
            drop(stream);
        });

        let sockets = StdSockets::new();
        let socket = sockets.socket();
        assert_eq!(
            sockets.set_receive_timeout(socket, Duration::from_millis(50)),
            status::ERROR_NONE
        );
        assert_eq!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE), status::ERROR_NONE);

        assert_eq!(sockets.recv(socket, &mut [0u8; 8], 0), 0);

        tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_peer_close_reports_closed() {
        let (addr, server) = serve_once(|stream| drop(stream));

        let sockets = StdSockets::new();
        let socket = sockets.socket();
        assert_eq!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE), status::ERROR_NONE);
        server.join().unwrap();

        assert_eq!(sockets.recv(socket, &mut [0u8; 8], 0), status::ECLOSED);
    }

    #[test]
    fn test_shutdown_write_closes_send() {
        let (addr, server) = serve_once(|mut stream| {
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
        });

        let sockets = StdSockets::new();
        let socket = sockets.socket();
        assert_eq!(sockets.connect(socket, &addr, SocketsSockaddr::SIZE), status::ERROR_NONE);

        assert_eq!(sockets.shutdown(socket, SOCKETS_SHUT_WR), status::ERROR_NONE);
        assert_eq!(sockets.send(socket, b"late", 0), status::ECLOSED);
        assert_eq!(sockets.shutdown(socket, 7), status::EINVAL);

        server.join().unwrap();
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let sockets = StdSockets::new();
        let socket = sockets.socket();
        assert_eq!(sockets.set_send_timeout(socket, Duration::ZERO), status::EINVAL);
        assert_eq!(
            sockets.set_send_timeout(socket, Duration::from_secs(1)),
            status::ERROR_NONE
        );
    }

    #[test]
    fn test_status_from_io() {
        let err = io::Error::new(ErrorKind::ConnectionRefused, "refused");
        assert_eq!(status_from_io(&err), status::SOCKET_ERROR);

        let err = io::Error::new(ErrorKind::TimedOut, "slow");
        assert_eq!(status_from_io(&err), status::EWOULDBLOCK);

        let err = io::Error::new(ErrorKind::BrokenPipe, "gone");
        assert_eq!(status_from_io(&err), status::ECLOSED);
    }
}
