// src/recording/stream_writer.rs
//! Background writer streaming the trace buffer to disk
//!
//! Runs as a tokio task: on every tick it emits table frames for extensions
//! registered since the last tick, then drains the recorder in batch frames.
//! The wrappers never wait on it; if it falls behind, the buffer's overflow
//! policy decides what is lost.

use crate::recording::codec::{self, FrameKind, FLAG_COMPRESSED};
use crate::recording::compressor::Compressor;
use crate::recording::event::RecordedEvent;
use crate::recording::recorder::BufferedRecorder;
use crate::utils::config::StreamConfig;
use crate::utils::errors::{Result, TraceError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

enum Command {
    Flush(oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Handle to the background stream writer
pub struct StreamWriter {
    commands: mpsc::Sender<Command>,
    handle: Option<JoinHandle<Result<StreamStats>>>,
}

impl StreamWriter {
    /// Create (truncate) `path` and start streaming into it
    pub async fn create(
        path: &Path,
        recorder: Arc<BufferedRecorder>,
        config: &StreamConfig,
    ) -> Result<Self> {
        let file = tokio::fs::File::create(path).await.map_err(|e| {
            TraceError::StreamFailed(format!("Failed to create {}: {}", path.display(), e))
        })?;

        info!("Streaming trace to {}", path.display());
        Self::start(BufWriter::new(file), recorder, config).await
    }

    /// Write the stream header and spawn the writer task
    pub async fn start<W>(
        writer: W,
        recorder: Arc<BufferedRecorder>,
        config: &StreamConfig,
    ) -> Result<Self>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut task = WriterTask {
            writer,
            recorder,
            compressor: Compressor::new(config.compression),
            batch_size: config.batch_size,
            extensions_written: 0,
            stats: StreamStats::default(),
        };
        task.write_header().await?;

        let (tx, rx) = mpsc::channel(8);
        let interval = Duration::from_millis(config.flush_interval_ms);
        let handle = tokio::spawn(task.run(rx, interval));

        Ok(Self {
            commands: tx,
            handle: Some(handle),
        })
    }

    /// Drain everything buffered so far and wait until it is written
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        self.commands
            .send(Command::Flush(ack_tx))
            .await
            .map_err(|_| TraceError::StreamFailed("Writer task has stopped".to_string()))?;

        ack_rx
            .await
            .map_err(|_| TraceError::StreamFailed("Writer task dropped flush".to_string()))?
    }

    /// Drain, close the output and return final statistics
    pub async fn shutdown(mut self) -> Result<StreamStats> {
        info!("Shutting down trace stream writer");

        // A closed channel means the task already exited; its result is in the handle.
        let _ = self.commands.send(Command::Shutdown).await;

        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| TraceError::StreamFailed(format!("Writer task failed: {}", e)))?,
            None => Ok(StreamStats::default()),
        }
    }
}

/// Stream writer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_written: u64,
    pub events_written: u64,
    pub extensions_written: u64,
    pub bytes_written: u64,
}

struct WriterTask<W> {
    writer: W,
    recorder: Arc<BufferedRecorder>,
    compressor: Compressor,
    batch_size: usize,
    extensions_written: usize,
    stats: StreamStats,
}

impl<W: AsyncWrite + Unpin + Send> WriterTask<W> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, interval: Duration) -> Result<StreamStats> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // A failed write may leave a torn frame behind; nothing after it would decode.
                    if let Err(e) = self.flush_all().await {
                        error!("Failed to flush trace stream, stopping writer: {}", e);
                        return Err(e);
                    }
                }

                command = commands.recv() => match command {
                    Some(Command::Flush(ack)) => {
                        if let Err(e) = self.flush_all().await {
                            error!("Failed to flush trace stream, stopping writer: {}", e);
                            let _ = ack.send(Err(TraceError::StreamFailed(format!("Flush failed: {}", e))));
                            return Err(e);
                        }
                        let _ = ack.send(Ok(()));
                    }
                    // Shutdown, or every handle dropped
                    Some(Command::Shutdown) | None => {
                        self.flush_all().await?;
                        self.writer.shutdown().await?;

                        info!(
                            "Trace stream closed: {} events in {} frames, {} bytes",
                            self.stats.events_written,
                            self.stats.frames_written,
                            self.stats.bytes_written
                        );
                        return Ok(self.stats);
                    }
                }
            }
        }
    }

    async fn write_header(&mut self) -> Result<()> {
        let header = codec::encode_file_header(self.recorder.started_at());
        self.writer.write_all(&header).await?;
        self.stats.bytes_written += header.len() as u64;
        Ok(())
    }

    async fn flush_all(&mut self) -> Result<()> {
        self.write_new_extensions().await?;

        loop {
            let batch = self.recorder.drain(self.batch_size);
            if batch.is_empty() {
                break;
            }
            self.write_batch(&batch).await?;
        }

        self.writer.flush().await?;
        Ok(())
    }

    async fn write_new_extensions(&mut self) -> Result<()> {
        let extensions = self.recorder.extensions();

        for extension in &extensions[self.extensions_written.min(extensions.len())..] {
            let payload = codec::encode_extension(extension)?;
            self.write_frame(FrameKind::Extension, 0, &payload).await?;
            self.extensions_written += 1;
            self.stats.extensions_written += 1;
        }

        Ok(())
    }

    async fn write_batch(&mut self, batch: &[RecordedEvent]) -> Result<()> {
        let encoded = codec::encode_events(batch);
        let payload = self.compressor.compress(&encoded)?;
        let flags = if self.compressor.is_enabled() {
            FLAG_COMPRESSED
        } else {
            0
        };

        self.write_frame(FrameKind::Events, flags, &payload).await?;
        self.stats.events_written += batch.len() as u64;

        debug!("Wrote batch of {} events ({} bytes)", batch.len(), payload.len());
        Ok(())
    }

    async fn write_frame(&mut self, kind: FrameKind, flags: u8, payload: &[u8]) -> Result<()> {
        let frame = codec::encode_frame(kind, flags, payload)?;
        self.writer.write_all(&frame).await?;
        self.stats.frames_written += 1;
        self.stats.bytes_written += frame.len() as u64;
        Ok(())
    }
}
