// src/extension/mod.rs
//! Trace extensions
//!
//! An extension names a group of events for the offline viewer:
//!
//! - **Descriptor**: name, version and per-event payload layout
//! - **Registry**: assigns each extension a contiguous block of event codes

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    lookup_descriptor, EventSpec, ExtensionDescriptor, ExtensionVersion, FieldKind, FieldSpec,
    Outcome, OutcomeRule, SOCKETS_EXTENSION,
};
pub use registry::{ExtensionRegistry, RegisteredExtension, MAX_EVENT_CODE};
