// tests/loopback_trace.rs
//! Traced calls over real loopback TCP, streamed to a file and decoded

use secure_sockets_trace::extension::Outcome;
use secure_sockets_trace::recording::exporter::decode_event;
use secure_sockets_trace::recording::{decode_stream, ExportFormat, Exporter};
use secure_sockets_trace::utils::config::StreamConfig;
use secure_sockets_trace::{
    status, BufferedRecorder, SecureSockets, SocketsSockaddr, StdSockets, StreamWriter,
    TracedSockets,
};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Arc;

#[tokio::test]
async fn test_traced_session_round_trips_through_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.tzxt");

    let recorder = Arc::new(BufferedRecorder::default());
    let sockets = TracedSockets::register(StdSockets::new(), Arc::clone(&recorder)).unwrap();
    let writer = StreamWriter::create(&path, Arc::clone(&recorder), &StreamConfig::default())
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        stream.write_all(&buf).unwrap();
    });

    let address = SocketsSockaddr::new(Ipv4Addr::LOCALHOST, port);
    let (connect_ret, send_ret, recv_ret) = tokio::task::spawn_blocking(move || {
        let socket = sockets.inner().socket();
        let connect_ret = sockets.connect(socket, &address, SocketsSockaddr::SIZE);
        let send_ret = sockets.send(socket, b"ping", 0);

        let mut buf = [0u8; 4];
        let mut recv_ret = 0;
        let mut received = 0;
        while received < 4 {
            recv_ret = sockets.recv(socket, &mut buf[received..], 0);
            assert!(recv_ret > 0);
            received += recv_ret as usize;
        }
        (connect_ret, send_ret, recv_ret)
    })
    .await
    .unwrap();
    server.join().unwrap();

    assert_eq!(connect_ret, status::ERROR_NONE);
    assert_eq!(send_ret, 4);

    writer.shutdown().await.unwrap();
    let trace = decode_stream(&std::fs::read(&path).unwrap()).unwrap();

    assert_eq!(trace.extensions.len(), 1);
    let base = trace.extensions[0].base_code;

    let first = &trace.events[0].event;
    assert_eq!(first.code, base);
    assert_eq!(first.params()[1], u32::from(Ipv4Addr::LOCALHOST));
    assert_eq!(first.params()[2], 0);

    let second = &trace.events[1].event;
    assert_eq!(second.code, base + 1);
    assert_eq!(second.params()[1], 4);

    let last = &trace.events.last().unwrap().event;
    assert_eq!(last.code, base + 2);
    assert_eq!(last.params()[1] as i32, recv_ret);

    let decoded = decode_event(&trace.extensions, trace.started_at, &trace.events[0]);
    assert_eq!(decoded.event.as_deref(), Some("SOCKETS_Connect"));
    assert_eq!(decoded.outcome, Some(Outcome::Success));

    let text = Exporter::new(ExportFormat::Text).export(&trace).unwrap();
    assert!(text.contains("address=127.0.0.1"));
}

#[tokio::test]
async fn test_failed_connect_is_recorded() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let recorder = Arc::new(BufferedRecorder::default());
    let sockets = TracedSockets::register(StdSockets::new(), Arc::clone(&recorder)).unwrap();

    let socket = sockets.inner().socket();
    let address = SocketsSockaddr::new(Ipv4Addr::LOCALHOST, port);
    let ret = sockets.connect(socket, &address, SocketsSockaddr::SIZE);
    assert!(ret < 0);

    let events = recorder.drain(10);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.params()[2] as i32, ret);

    // Unconnected send still records exactly one event
    assert_eq!(sockets.send(socket, b"x", 0), status::ENOTCONN);
    let events = recorder.drain(10);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.params()[1] as i32, status::ENOTCONN);
}
