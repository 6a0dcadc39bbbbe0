// src/extension/descriptor.rs
//! Extension descriptors: the name, version and event layout an offline
//! viewer uses to decode the binary trace stream.
//!
//! The viewer resolves a descriptor file named
//! `<name>-v<MAJOR>.<MINOR>.<PATCH>.xml`, so the name and version here must
//! match that file exactly. Bump the version whenever an event layout
//! changes; old traces keep resolving to the old file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension version. Major and minor are stored as 8 bits, patch as 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u16,
}

impl ExtensionVersion {
    pub const fn new(major: u8, minor: u8, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ExtensionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// How a payload word is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Opaque socket handle
    Handle,

    /// IPv4 address, host byte order
    Ipv4Address,

    /// Signed status code or byte count
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Classification the viewer applies to an event's result word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeRule {
    /// 0 means OK, anything else timeout/error
    ZeroIsSuccess,

    /// Non-negative is a byte count, negative an error code
    NonNegativeIsSuccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl OutcomeRule {
    pub fn classify(&self, ret: i32) -> Outcome {
        let ok = match self {
            OutcomeRule::ZeroIsSuccess => ret == 0,
            OutcomeRule::NonNegativeIsSuccess => ret >= 0,
        };

        if ok {
            Outcome::Success
        } else {
            Outcome::Failure
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("ok"),
            Outcome::Failure => f.write_str("error"),
        }
    }
}

/// One event of an extension, at a fixed offset from the base code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec {
    pub name: &'static str,
    pub offset: u16,
    /// Payload words, in recorded order
    pub fields: &'static [FieldSpec],
    pub outcome: OutcomeRule,
}

impl EventSpec {
    /// Index of the status word, if the event carries one
    pub fn status_index(&self) -> Option<usize> {
        self.fields.iter().position(|f| f.kind == FieldKind::Status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    pub name: &'static str,
    pub version: ExtensionVersion,
    pub events: &'static [EventSpec],
}

impl ExtensionDescriptor {
    /// Number of event codes the extension occupies
    pub fn count(&self) -> u16 {
        self.events
            .iter()
            .map(|e| e.offset + 1)
            .max()
            .unwrap_or(1)
    }

    /// File name the viewer looks up for this name and version
    pub fn descriptor_file_name(&self) -> String {
        descriptor_file_name(self.name, self.version)
    }

    pub fn event(&self, offset: u16) -> Option<&'static EventSpec> {
        self.events.iter().find(|e| e.offset == offset)
    }
}

pub fn descriptor_file_name(name: &str, version: ExtensionVersion) -> String {
    format!("{}-{}.xml", name, version)
}

pub const SOCKETS_CONNECT: u16 = 0;
pub const SOCKETS_SEND: u16 = 1;
pub const SOCKETS_RECV: u16 = 2;

const SOCKET_FIELD: FieldSpec = FieldSpec {
    name: "socket",
    kind: FieldKind::Handle,
};

const RET_FIELD: FieldSpec = FieldSpec {
    name: "ret",
    kind: FieldKind::Status,
};

/// The secure-sockets extension
pub static SOCKETS_EXTENSION: ExtensionDescriptor = ExtensionDescriptor {
    name: "aws_secure_sockets",
    version: ExtensionVersion::new(1, 0, 0),
    events: &[
        EventSpec {
            name: "SOCKETS_Connect",
            offset: SOCKETS_CONNECT,
            fields: &[
                SOCKET_FIELD,
                FieldSpec {
                    name: "address",
                    kind: FieldKind::Ipv4Address,
                },
                RET_FIELD,
            ],
            outcome: OutcomeRule::ZeroIsSuccess,
        },
        EventSpec {
            name: "SOCKETS_Send",
            offset: SOCKETS_SEND,
            fields: &[SOCKET_FIELD, RET_FIELD],
            outcome: OutcomeRule::NonNegativeIsSuccess,
        },
        EventSpec {
            name: "SOCKETS_Recv",
            offset: SOCKETS_RECV,
            fields: &[SOCKET_FIELD, RET_FIELD],
            outcome: OutcomeRule::NonNegativeIsSuccess,
        },
    ],
};

static CATALOG: &[&ExtensionDescriptor] = &[&SOCKETS_EXTENSION];

/// Find a built-in descriptor by exact name and version
pub fn lookup_descriptor(
    name: &str,
    version: ExtensionVersion,
) -> Option<&'static ExtensionDescriptor> {
    CATALOG
        .iter()
        .copied()
        .find(|d| d.name == name && d.version == version)
}
