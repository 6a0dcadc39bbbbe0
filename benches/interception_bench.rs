// benches/interception_bench.rs
//! Overhead of the tracing decorator over a backend that does no I/O

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use secure_sockets_trace::recording::OverflowPolicy;
use secure_sockets_trace::utils::config::RecorderConfig;
use secure_sockets_trace::{BufferedRecorder, SecureSockets, Socket, SocketsSockaddr, TracedSockets};
use std::net::Ipv4Addr;
use std::sync::Arc;

struct NullSockets;

impl SecureSockets for NullSockets {
    fn connect(&self, _socket: Socket, _address: &SocketsSockaddr, _address_length: u32) -> i32 {
        0
    }

    fn send(&self, _socket: Socket, buffer: &[u8], _flags: u32) -> i32 {
        buffer.len() as i32
    }

    fn recv(&self, _socket: Socket, buffer: &mut [u8], _flags: u32) -> i32 {
        buffer.len() as i32
    }
}

fn bench_send(c: &mut Criterion) {
    let payload = [0u8; 256];

    c.bench_function("send_untraced", |b| {
        let sockets = NullSockets;
        b.iter(|| sockets.send(black_box(Socket(1)), black_box(&payload), 0))
    });

    // Ring buffer so the recorder never fills up during measurement
    let recorder = Arc::new(BufferedRecorder::new(&RecorderConfig {
        capacity: 65_536,
        overflow: OverflowPolicy::OverwriteOldest,
        first_extension_code: 0x100,
    }));
    let traced = TracedSockets::register(NullSockets, recorder).expect("register extension");

    c.bench_function("send_traced", |b| {
        b.iter(|| traced.send(black_box(Socket(1)), black_box(&payload), 0))
    });

    let address = SocketsSockaddr::new(Ipv4Addr::LOCALHOST, 8883);
    c.bench_function("connect_traced", |b| {
        b.iter(|| traced.connect(black_box(Socket(1)), black_box(&address), SocketsSockaddr::SIZE))
    });
}

criterion_group!(benches, bench_send);
criterion_main!(benches);
