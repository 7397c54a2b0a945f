//! Store Error Types
//!
//! Error taxonomy shared by all four HiNATA stores. Single-item operations
//! fail fast with one of these variants and never partially apply a
//! mutation; batch operations fold them into per-item outcomes instead.

use std::fmt;

use thiserror::Error;

/// The entity kinds managed by the stores, used in error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Packet,
    Block,
    NoteItem,
    Reference,
    Relation,
    Tag,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Packet => "packet",
            EntityKind::Block => "block",
            EntityKind::NoteItem => "note_item",
            EntityKind::Reference => "reference",
            EntityKind::Relation => "relation",
            EntityKind::Tag => "tag",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for store operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A required field is missing or malformed. Raised before any mutation.
    #[error("validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Operation on a nonexistent id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Create with an id or name that already resolves to an existing record.
    #[error("{kind} already exists: {id}")]
    Duplicate { kind: EntityKind, id: String },

    /// Attempted mutation that would violate a store invariant
    /// (self-loop relation, dangling reference, tag hierarchy cycle).
    #[error("consistency violation: {0}")]
    Consistency(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Create a validation error for a specific field path
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::Duplicate {
            kind,
            id: id.to_string(),
        }
    }

    /// Create a consistency error
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Stable machine-readable code, used in batch outcomes and by callers
    /// translating store errors onto an RPC boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Duplicate { .. } => "duplicate",
            Self::Consistency(_) => "consistency_error",
        }
    }

    /// Check if the error was raised before any state was touched
    pub fn is_pre_mutation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Duplicate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(StoreError::validation("core.highlight", "empty").code(), "validation_error");
        assert_eq!(StoreError::not_found(EntityKind::Packet, "abc").code(), "not_found");
        assert_eq!(StoreError::duplicate(EntityKind::Tag, "foo").code(), "duplicate");
        assert_eq!(StoreError::consistency("self loop").code(), "consistency_error");
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = StoreError::validation("payload.core.highlight", "exceeds 1000 chars");
        assert!(err.to_string().contains("payload.core.highlight"));

        let err = StoreError::not_found(EntityKind::Block, "b-1");
        assert_eq!(err.to_string(), "block not found: b-1");
    }

    #[test]
    fn test_pre_mutation_classification() {
        assert!(StoreError::validation("f", "r").is_pre_mutation());
        assert!(StoreError::duplicate(EntityKind::Relation, "x").is_pre_mutation());
        assert!(!StoreError::consistency("cycle").is_pre_mutation());
    }
}
