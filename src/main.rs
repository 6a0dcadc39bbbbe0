// src/main.rs
//! sockets-trace
//!
//! Runs traced socket sessions, decodes trace files and prints the event
//! code table the offline viewer expects.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secure_sockets_trace::extension::MAX_EVENT_CODE;
use secure_sockets_trace::interception::std_sockets::SOCKETS_SHUT_WR;
use secure_sockets_trace::observability::init_tracing;
use secure_sockets_trace::recording::{decode_stream, ExportFormat, Exporter};
use secure_sockets_trace::{
    status, BufferedRecorder, SecureSockets, SocketsSockaddr, StdSockets, StreamWriter,
    TraceConfig, TraceRecorder, TracedSockets, SOCKETS_EXTENSION,
};
use std::net::{SocketAddr, SocketAddrV4, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "sockets-trace", version, about = "Secure-sockets trace recorder")]
struct Cli {
    /// Config file (default: ./sockets-trace.* when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a loopback echo session through the traced calls and print the trace
    Demo {
        /// Echo round trips to perform
        #[arg(long, default_value_t = 3)]
        rounds: u32,

        /// Trace file to write (overrides stream.path)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Decode a trace file
    Dump {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print the descriptor file name and event codes of the sockets extension
    Descriptor {
        /// Base code the extension is registered at
        #[arg(long, default_value_t = 0x100)]
        base_code: u16,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => ExportFormat::Text,
            Format::Json => ExportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TraceConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging)?;

    info!("sockets-trace v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Demo { rounds, output } => {
            let path = output.unwrap_or_else(|| config.stream.path.clone());
            run_demo(&config, rounds, &path).await
        }
        Command::Dump { file, format } => dump(&file, format.into()).await,
        Command::Descriptor { base_code } => print_descriptor(base_code),
    }
}

async fn run_demo(config: &TraceConfig, rounds: u32, path: &Path) -> Result<()> {
    let recorder = Arc::new(BufferedRecorder::new(&config.recorder));
    let sockets = TracedSockets::register(StdSockets::new(), Arc::clone(&recorder))?;
    let writer = StreamWriter::create(path, Arc::clone(&recorder), &config.stream).await?;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = match listener.local_addr()? {
        SocketAddr::V4(addr) => addr,
        other => bail!("Loopback listener bound to non-IPv4 address {}", other),
    };
    let server = std::thread::spawn(move || echo_server(listener));

    let session = tokio::task::spawn_blocking(move || echo_session(&sockets, addr, rounds)).await?;

    let stats = writer.shutdown().await?;

    // On failure the server may still be waiting in accept; leave it detached.
    session?;
    match server.join() {
        Ok(Ok(bytes)) => info!("Echo server relayed {} bytes", bytes),
        Ok(Err(e)) => warn!("Echo server failed: {}", e),
        Err(_) => warn!("Echo server panicked"),
    }

    info!(
        "Wrote {} events to {} ({} dropped)",
        stats.events_written,
        path.display(),
        recorder.stats().drop_count
    );

    dump(path, ExportFormat::Text).await
}

fn echo_server(listener: TcpListener) -> std::io::Result<u64> {
    let (stream, peer) = listener.accept()?;
    info!("Echo server accepted {}", peer);

    let (mut reader, mut writer) = (&stream, &stream);
    std::io::copy(&mut reader, &mut writer)
}

fn echo_session<R: TraceRecorder>(
    sockets: &TracedSockets<StdSockets, R>,
    addr: SocketAddrV4,
    rounds: u32,
) -> Result<()> {
    let socket = sockets.inner().socket();

    let ret = sockets.connect(socket, &SocketsSockaddr::from(addr), SocketsSockaddr::SIZE);
    if ret != status::ERROR_NONE {
        bail!("connect to {} failed: {}", addr, describe(ret));
    }

    for round in 0..rounds {
        let message = format!("round {}", round);
        let sent = sockets.send(socket, message.as_bytes(), 0);
        if sent < 0 {
            bail!("send failed: {}", describe(sent));
        }

        let mut buffer = [0u8; 64];
        let mut received = 0usize;
        while received < sent as usize {
            let n = sockets.recv(socket, &mut buffer[received..], 0);
            if n <= 0 {
                bail!("recv failed: {}", describe(n));
            }
            received += n as usize;
        }

        info!("Round {} echoed {:?}", round, String::from_utf8_lossy(&buffer[..received]));
    }

    // Half-close so the server sees EOF; the next recv reports the closed connection.
    sockets.inner().shutdown(socket, SOCKETS_SHUT_WR);
    let ret = sockets.recv(socket, &mut [0u8; 16], 0);
    info!("Final recv returned {}", describe(ret));

    sockets.inner().close(socket);
    Ok(())
}

fn describe(ret: i32) -> String {
    match status::name(ret) {
        Some(name) => format!("{} ({})", ret, name),
        None => ret.to_string(),
    }
}

async fn dump(path: &Path, format: ExportFormat) -> Result<()> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let trace = decode_stream(&data)?;

    for extension in &trace.extensions {
        if extension.descriptor().is_none() {
            warn!(
                "No descriptor for {} {}, its events are shown raw",
                extension.name, extension.version
            );
        }
    }

    println!("{}", Exporter::new(format).export(&trace)?);
    Ok(())
}

fn print_descriptor(base_code: u16) -> Result<()> {
    let count = SOCKETS_EXTENSION.count();
    if base_code as u32 + count as u32 - 1 > MAX_EVENT_CODE as u32 {
        bail!("Base code {} leaves no room for {} events (max code {})", base_code, count, MAX_EVENT_CODE);
    }

    println!("{}", SOCKETS_EXTENSION.descriptor_file_name());
    for event in SOCKETS_EXTENSION.events {
        let fields: Vec<_> = event.fields.iter().map(|f| f.name).collect();
        println!(
            "{:#06x}  {:<16} {}",
            base_code + event.offset,
            event.name,
            fields.join(", ")
        );
    }

    Ok(())
}
