// src/recording/codec.rs
//! Binary trace stream format
//!
//! All integers little-endian.
//!
//! ```text
//! file    := header frame*
//! header  := "TZXT" version:u16 started_at_unix_ns:i64
//! frame   := kind:u8 flags:u8 len:u32 payload[len]
//!
//! kind 1, extension table entry:
//!   name_len:u8 name major:u8 minor:u8 patch:u16 base_code:u16 count:u16
//! kind 2, event batch (payload zstd-compressed when flags bit 0 is set):
//!   record* where
//!   record := code:u16 param_count:u8 reserved:u8 seq:u32 timestamp_ns:u64 param:u32*
//! ```

use crate::extension::descriptor::ExtensionVersion;
use crate::extension::registry::RegisteredExtension;
use crate::recording::compressor::Compressor;
use crate::recording::event::{RecordedEvent, TraceEvent, MAX_PARAMS};
use crate::utils::errors::{Result, TraceError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

pub const MAGIC: &[u8; 4] = b"TZXT";
pub const FORMAT_VERSION: u16 = 1;
pub const FILE_HEADER_SIZE: usize = 14;
pub const FRAME_HEADER_SIZE: usize = 6;
pub const FLAG_COMPRESSED: u8 = 0x01;

const RECORD_HEADER_SIZE: usize = 16;

/// Encoded size of a record carrying the maximum number of words
pub const MAX_RECORD_SIZE: usize = RECORD_HEADER_SIZE + 4 * MAX_PARAMS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Extension = 1,
    Events = 2,
}

impl FrameKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(FrameKind::Extension),
            2 => Some(FrameKind::Events),
            _ => None,
        }
    }
}

/// Decoded trace stream
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFile {
    pub started_at: DateTime<Utc>,
    pub extensions: Vec<RegisteredExtension>,
    pub events: Vec<RecordedEvent>,
}

pub fn encode_file_header(started_at: DateTime<Utc>) -> Bytes {
    let mut buf = BytesMut::with_capacity(FILE_HEADER_SIZE);
    buf.put_slice(MAGIC);
    buf.put_u16_le(FORMAT_VERSION);
    buf.put_i64_le(started_at.timestamp_nanos_opt().unwrap_or(0));
    buf.freeze()
}

pub fn encode_extension(extension: &RegisteredExtension) -> Result<Bytes> {
    let name = extension.name.as_bytes();
    let name_len = u8::try_from(name.len()).map_err(|_| {
        TraceError::RecordingFailed(format!("Extension name too long: {}", extension.name))
    })?;

    let mut buf = BytesMut::with_capacity(1 + name.len() + 8);
    buf.put_u8(name_len);
    buf.put_slice(name);
    buf.put_u8(extension.version.major);
    buf.put_u8(extension.version.minor);
    buf.put_u16_le(extension.version.patch);
    buf.put_u16_le(extension.base_code);
    buf.put_u16_le(extension.count);
    Ok(buf.freeze())
}

pub fn encode_events(events: &[RecordedEvent]) -> Bytes {
    let mut buf = BytesMut::with_capacity(events.len() * MAX_RECORD_SIZE);
    for recorded in events {
        let params = recorded.event.params();
        buf.put_u16_le(recorded.event.code);
        buf.put_u8(params.len() as u8);
        buf.put_u8(0);
        buf.put_u32_le(recorded.seq);
        buf.put_u64_le(recorded.timestamp_ns);
        for word in params {
            buf.put_u32_le(*word);
        }
    }
    buf.freeze()
}

/// Wrap a payload in a frame header
pub fn encode_frame(kind: FrameKind, flags: u8, payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        TraceError::RecordingFailed(format!("Frame payload too large: {} bytes", payload.len()))
    })?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_u8(kind as u8);
    buf.put_u8(flags);
    buf.put_u32_le(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

fn truncated(what: &str) -> TraceError {
    TraceError::DecodeFailed(format!("Truncated {}", what))
}

/// Decode a complete trace stream
pub fn decode_stream(data: &[u8]) -> Result<TraceFile> {
    let mut buf = data;

    if buf.remaining() < FILE_HEADER_SIZE {
        return Err(truncated("file header"));
    }
    if &buf[..4] != MAGIC {
        return Err(TraceError::DecodeFailed("Bad magic, not a trace stream".to_string()));
    }
    buf.advance(4);

    let version = buf.get_u16_le();
    if version != FORMAT_VERSION {
        return Err(TraceError::DecodeFailed(format!(
            "Unsupported format version {}",
            version
        )));
    }

    let started_ns = buf.get_i64_le();
    let started_at = DateTime::<Utc>::from_timestamp(
        started_ns.div_euclid(1_000_000_000),
        started_ns.rem_euclid(1_000_000_000) as u32,
    )
    .unwrap_or_default();

    let mut file = TraceFile {
        started_at,
        extensions: Vec::new(),
        events: Vec::new(),
    };

    while buf.has_remaining() {
        if buf.remaining() < FRAME_HEADER_SIZE {
            return Err(truncated("frame header"));
        }

        let kind_byte = buf.get_u8();
        let flags = buf.get_u8();
        let len = buf.get_u32_le() as usize;

        if buf.remaining() < len {
            return Err(truncated("frame payload"));
        }
        let (raw, rest) = buf.split_at(len);
        buf = rest;

        let kind = FrameKind::from_u8(kind_byte).ok_or_else(|| {
            TraceError::DecodeFailed(format!("Unknown frame kind {}", kind_byte))
        })?;

        let decompressed;
        let payload = if flags & FLAG_COMPRESSED != 0 {
            decompressed = Compressor::decompress(raw)?;
            &decompressed[..]
        } else {
            raw
        };

        match kind {
            FrameKind::Extension => file.extensions.push(decode_extension(payload)?),
            FrameKind::Events => decode_events(payload, &mut file.events)?,
        }
    }

    Ok(file)
}

fn decode_extension(mut buf: &[u8]) -> Result<RegisteredExtension> {
    if !buf.has_remaining() {
        return Err(truncated("extension entry"));
    }

    let name_len = buf.get_u8() as usize;
    if buf.remaining() < name_len + 8 {
        return Err(truncated("extension entry"));
    }

    let name = std::str::from_utf8(&buf[..name_len])
        .map_err(|e| TraceError::DecodeFailed(format!("Extension name is not UTF-8: {}", e)))?
        .to_string();
    buf.advance(name_len);

    let major = buf.get_u8();
    let minor = buf.get_u8();
    let patch = buf.get_u16_le();

    Ok(RegisteredExtension {
        name,
        version: ExtensionVersion::new(major, minor, patch),
        base_code: buf.get_u16_le(),
        count: buf.get_u16_le(),
    })
}

fn decode_events(mut buf: &[u8], out: &mut Vec<RecordedEvent>) -> Result<()> {
    while buf.has_remaining() {
        if buf.remaining() < RECORD_HEADER_SIZE {
            return Err(truncated("event record"));
        }

        let code = buf.get_u16_le();
        let param_count = buf.get_u8() as usize;
        let _reserved = buf.get_u8();
        let seq = buf.get_u32_le();
        let timestamp_ns = buf.get_u64_le();

        if param_count > MAX_PARAMS {
            return Err(TraceError::DecodeFailed(format!(
                "Event seq {} has {} params, at most {} allowed",
                seq, param_count, MAX_PARAMS
            )));
        }
        if buf.remaining() < param_count * 4 {
            return Err(truncated("event params"));
        }

        let mut words = [0u32; MAX_PARAMS];
        for word in words.iter_mut().take(param_count) {
            *word = buf.get_u32_le();
        }

        // param_count is bounded above, so this always builds
        if let Some(event) = TraceEvent::from_params(code, &words[..param_count]) {
            out.push(RecordedEvent {
                seq,
                timestamp_ns,
                event,
            });
        }
    }

    Ok(())
}
