// src/recording/exporter.rs
//! Export decoded traces for reading
//!
//! Supports:
//! - JSON (one object per event, named fields)
//! - Text (one line per event)
//!
//! Events are decoded through the built-in descriptor matching the
//! extension's exact name and version. Anything without a match is shown
//! raw: code and payload words.

use crate::extension::descriptor::{EventSpec, FieldKind, Outcome};
use crate::extension::registry::RegisteredExtension;
use crate::recording::codec::TraceFile;
use crate::recording::event::RecordedEvent;
use crate::utils::errors::{Result, TraceError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;
use tracing::debug;

/// Export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
}

/// Exporter for decoded traces
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    pub fn export(&self, trace: &TraceFile) -> Result<String> {
        debug!("Exporting {} events to {:?} format", trace.events.len(), self.format);

        let decoded: Vec<_> = trace
            .events
            .iter()
            .map(|e| decode_event(&trace.extensions, trace.started_at, e))
            .collect();

        match self.format {
            ExportFormat::Json => serde_json::to_string_pretty(&decoded).map_err(|e| {
                TraceError::ExportFailed(format!("JSON serialization error: {}", e))
            }),
            ExportFormat::Text => Ok(decoded
                .iter()
                .map(DecodedEvent::to_line)
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }
}

/// A recorded event with its descriptor applied
#[derive(Debug, Clone, Serialize)]
pub struct DecodedEvent {
    pub seq: u32,
    pub time: String,
    pub timestamp_ns: u64,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<DecodedField>,
    pub raw: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    pub name: String,
    pub value: serde_json::Value,
}

impl DecodedEvent {
    pub fn to_line(&self) -> String {
        let mut line = format!("{} #{} ", self.time, self.seq);

        match &self.event {
            Some(name) => {
                line.push_str(name);
                for field in &self.fields {
                    let value = match &field.value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    line.push_str(&format!(" {}={}", field.name, value));
                }
            }
            None => {
                line.push_str(&format!("code={:#x}", self.code));
                if let Some(ext) = &self.extension {
                    line.push_str(&format!(" ext={}", ext));
                }
                line.push_str(&format!(" {:?}", self.raw));
            }
        }

        if let Some(outcome) = self.outcome {
            line.push_str(&format!(" [{}]", outcome));
        }

        line
    }
}

pub fn decode_event(
    extensions: &[RegisteredExtension],
    started_at: DateTime<Utc>,
    recorded: &RecordedEvent,
) -> DecodedEvent {
    let code = recorded.event.code;
    let params = recorded.event.params();
    let extension = extensions.iter().find(|e| e.contains(code));

    let spec = extension.and_then(|ext| {
        let descriptor = ext.descriptor()?;
        let spec = descriptor.event(ext.offset_of(code)?)?;
        (spec.fields.len() == params.len()).then_some(spec)
    });

    let (fields, outcome) = match spec {
        Some(spec) => decode_fields(spec, params),
        None => (Vec::new(), None),
    };

    DecodedEvent {
        seq: recorded.seq,
        time: format_timestamp(started_at, recorded.timestamp_ns),
        timestamp_ns: recorded.timestamp_ns,
        code,
        extension: extension.map(|e| format!("{}-{}", e.name, e.version)),
        event: spec.map(|s| s.name.to_string()),
        fields,
        raw: params.to_vec(),
        outcome,
    }
}

fn decode_fields(spec: &EventSpec, params: &[u32]) -> (Vec<DecodedField>, Option<Outcome>) {
    let fields = spec
        .fields
        .iter()
        .zip(params)
        .map(|(field, &word)| DecodedField {
            name: field.name.to_string(),
            value: match field.kind {
                FieldKind::Handle => serde_json::json!(word),
                FieldKind::Ipv4Address => serde_json::json!(Ipv4Addr::from(word).to_string()),
                FieldKind::Status => serde_json::json!(word as i32),
            },
        })
        .collect();

    let outcome = spec
        .status_index()
        .map(|i| spec.outcome.classify(params[i] as i32));

    (fields, outcome)
}

fn format_timestamp(started_at: DateTime<Utc>, offset_ns: u64) -> String {
    let offset = Duration::nanoseconds(offset_ns.min(i64::MAX as u64) as i64);
    (started_at + offset).to_rfc3339()
}
