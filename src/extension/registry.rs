// src/extension/registry.rs
//! Event code allocation for registered extensions
//!
//! Each extension gets a contiguous block of codes; the viewer maps a code
//! back to its extension through the table written into the trace stream.

use crate::extension::descriptor::{lookup_descriptor, ExtensionDescriptor, ExtensionVersion};
use crate::utils::errors::{Result, TraceError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Highest event code the viewer accepts
pub const MAX_EVENT_CODE: u16 = 4095;

/// An extension with its assigned code block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredExtension {
    pub name: String,
    pub version: ExtensionVersion,
    pub base_code: u16,
    pub count: u16,
}

impl RegisteredExtension {
    pub fn contains(&self, code: u16) -> bool {
        code >= self.base_code && (code - self.base_code) < self.count
    }

    pub fn offset_of(&self, code: u16) -> Option<u16> {
        self.contains(code).then(|| code - self.base_code)
    }

    /// Absolute code for an event offset
    pub fn code_of(&self, offset: u16) -> Option<u16> {
        (offset < self.count).then(|| self.base_code + offset)
    }

    /// Built-in descriptor matching this name and version, if any
    pub fn descriptor(&self) -> Option<&'static ExtensionDescriptor> {
        lookup_descriptor(&self.name, self.version)
    }
}

/// Code allocator
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    next_code: u16,
    extensions: Vec<RegisteredExtension>,
}

impl ExtensionRegistry {
    pub fn new(first_code: u16) -> Self {
        Self {
            next_code: first_code,
            extensions: Vec::new(),
        }
    }

    /// Assign the next free block of codes to `descriptor`
    pub fn register(&mut self, descriptor: &ExtensionDescriptor) -> Result<RegisteredExtension> {
        if self.get(descriptor.name).is_some() {
            return Err(TraceError::DuplicateExtension(descriptor.name.to_string()));
        }

        let count = descriptor.count();
        let last = self.next_code as u32 + count as u32 - 1;
        if last > MAX_EVENT_CODE as u32 {
            return Err(TraceError::CodeSpaceExhausted {
                name: descriptor.name.to_string(),
                first: self.next_code,
                count,
                max: MAX_EVENT_CODE,
            });
        }

        let registered = RegisteredExtension {
            name: descriptor.name.to_string(),
            version: descriptor.version,
            base_code: self.next_code,
            count,
        };

        // `last + 1` may be 4096; nothing fits after it and the next
        // registration fails the range check above.
        self.next_code = (last + 1) as u16;
        self.extensions.push(registered.clone());

        info!(
            "Registered extension {} {} at codes {}..={} ({})",
            registered.name,
            registered.version,
            registered.base_code,
            last,
            descriptor.descriptor_file_name()
        );

        Ok(registered)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredExtension> {
        self.extensions.iter().find(|e| e.name == name)
    }

    pub fn find_by_code(&self, code: u16) -> Option<&RegisteredExtension> {
        self.extensions.iter().find(|e| e.contains(code))
    }

    pub fn extensions(&self) -> &[RegisteredExtension] {
        &self.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::descriptor::{EventSpec, FieldKind, FieldSpec, OutcomeRule, SOCKETS_EXTENSION};

    static SINGLE: ExtensionDescriptor = ExtensionDescriptor {
        name: "single",
        version: ExtensionVersion::new(0, 1, 0),
        events: &[EventSpec {
            name: "Single",
            offset: 0,
            fields: &[FieldSpec {
                name: "ret",
                kind: FieldKind::Status,
            }],
            outcome: OutcomeRule::ZeroIsSuccess,
        }],
    };

    #[test]
    fn test_register_assigns_contiguous_blocks() {
        let mut registry = ExtensionRegistry::new(0x100);

        let sockets = registry.register(&SOCKETS_EXTENSION).unwrap();
        assert_eq!(sockets.base_code, 0x100);
        assert_eq!(sockets.count, 3);

        let single = registry.register(&SINGLE).unwrap();
        assert_eq!(single.base_code, 0x103);

        assert_eq!(registry.find_by_code(0x102).unwrap().name, "aws_secure_sockets");
        assert_eq!(registry.find_by_code(0x103).unwrap().name, "single");
        assert!(registry.find_by_code(0x104).is_none());
        assert!(registry.find_by_code(0xff).is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ExtensionRegistry::new(0);
        registry.register(&SOCKETS_EXTENSION).unwrap();

        let result = registry.register(&SOCKETS_EXTENSION);
        assert!(matches!(result, Err(TraceError::DuplicateExtension(_))));
    }

    #[test]
    fn test_code_space_exhausted() {
        let mut registry = ExtensionRegistry::new(MAX_EVENT_CODE - 1);
        let result = registry.register(&SOCKETS_EXTENSION);
        assert!(matches!(result, Err(TraceError::CodeSpaceExhausted { .. })));

        // Exactly fits at the top of the range
        let mut registry = ExtensionRegistry::new(MAX_EVENT_CODE - 2);
        let sockets = registry.register(&SOCKETS_EXTENSION).unwrap();
        assert_eq!(sockets.code_of(2), Some(MAX_EVENT_CODE));
        assert!(registry.register(&SINGLE).is_err());
    }

    #[test]
    fn test_offset_lookup() {
        let mut registry = ExtensionRegistry::new(10);
        let sockets = registry.register(&SOCKETS_EXTENSION).unwrap();

        assert_eq!(sockets.offset_of(10), Some(0));
        assert_eq!(sockets.offset_of(12), Some(2));
        assert_eq!(sockets.offset_of(13), None);
        assert_eq!(sockets.offset_of(9), None);
        assert_eq!(sockets.code_of(3), None);
        assert!(sockets.descriptor().is_some());
    }
}
