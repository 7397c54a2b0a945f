//! HiNATA Core Tuple
//!
//! The five-field capture tuple (Highlight, Note, At/source, Tag, Access)
//! underlying every entity in the system. Packets carry one as their
//! payload, knowledge blocks embed one directly.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of the `highlight` field in characters.
pub const MAX_HIGHLIGHT_LEN: usize = 1000;
/// Maximum length of the `note` field in characters.
pub const MAX_NOTE_LEN: usize = 10_000;
/// Maximum length of the `at` (source) field in characters.
pub const MAX_SOURCE_LEN: usize = 2048;
/// Maximum number of tags on a single tuple.
pub const MAX_TAGS: usize = 20;
/// Maximum length of a single tag in characters.
pub const MAX_TAG_LEN: usize = 50;
/// Maximum number of attachments on a packet payload.
pub const MAX_ATTACHMENTS: usize = 5;
/// Maximum number of note items on a knowledge block.
pub const MAX_NOTE_ITEMS: usize = 20;

/// Access control level, a monotonically wider visibility set.
///
/// The stores preserve the four-level semantics but do not enforce
/// ordering; [`AccessLevel::rank`] lets callers compare widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Private,
    ModelReadable,
    Shared,
    Web3Published,
}

impl AccessLevel {
    /// Visibility width, `Private` narrowest.
    pub fn rank(&self) -> u8 {
        match self {
            AccessLevel::Private => 0,
            AccessLevel::ModelReadable => 1,
            AccessLevel::Shared => 2,
            AccessLevel::Web3Published => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Private => "private",
            AccessLevel::ModelReadable => "model_readable",
            AccessLevel::Shared => "shared",
            AccessLevel::Web3Published => "web3_published",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content format of a payload or note item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFormat {
    #[default]
    PlainText,
    Markdown,
    Html,
    Json,
    Image,
    Audio,
    Video,
}

impl ContentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::PlainText => "plain_text",
            ContentFormat::Markdown => "markdown",
            ContentFormat::Html => "html",
            ContentFormat::Json => "json",
            ContentFormat::Image => "image",
            ContentFormat::Audio => "audio",
            ContentFormat::Video => "video",
        }
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The HiNATA core tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HinataCore {
    /// The captured excerpt itself
    pub highlight: String,

    /// User commentary attached to the highlight
    #[serde(default)]
    pub note: String,

    /// Where the capture came from (URL, document path, app identifier)
    pub at: String,

    /// Raw tag names as captured; normalized by the tag store on use
    #[serde(default)]
    pub tags: Vec<String>,

    /// Visibility of this capture
    #[serde(default)]
    pub access: AccessLevel,
}

impl HinataCore {
    /// Create a tuple with the two required fields
    pub fn new(highlight: impl Into<String>, at: impl Into<String>) -> Self {
        Self {
            highlight: highlight.into(),
            note: String::new(),
            at: at.into(),
            tags: Vec::new(),
            access: AccessLevel::default(),
        }
    }

    /// Builder-style: set the note
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Builder-style: set tags
    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Builder-style: set the access level
    #[must_use]
    pub fn with_access(mut self, access: AccessLevel) -> Self {
        self.access = access;
        self
    }
}

/// Attachment carried by a packet payload.
///
/// Checksum and sizes are produced by the capture pipeline; the store only
/// validates counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// SHA-256 hex digest of the attachment content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            size,
            url: None,
            local_path: None,
            checksum: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_level_ranks_widen() {
        assert!(AccessLevel::Private.rank() < AccessLevel::ModelReadable.rank());
        assert!(AccessLevel::ModelReadable.rank() < AccessLevel::Shared.rank());
        assert!(AccessLevel::Shared.rank() < AccessLevel::Web3Published.rank());
    }

    #[test]
    fn test_core_builder() {
        let core = HinataCore::new("a sentence", "https://example.com")
            .with_note("worth keeping")
            .with_tags(vec!["ai".to_string()])
            .with_access(AccessLevel::Shared);

        assert_eq!(core.highlight, "a sentence");
        assert_eq!(core.note, "worth keeping");
        assert_eq!(core.tags.len(), 1);
        assert_eq!(core.access, AccessLevel::Shared);
    }

    #[test]
    fn test_core_serialization_defaults() {
        let json = r#"{"highlight":"h","at":"https://x"}"#;
        let core: HinataCore = serde_json::from_str(json).unwrap();

        assert_eq!(core.note, "");
        assert!(core.tags.is_empty());
        assert_eq!(core.access, AccessLevel::Private);
    }

    #[test]
    fn test_access_level_snake_case_wire_format() {
        let json = serde_json::to_string(&AccessLevel::Web3Published).unwrap();
        assert_eq!(json, "\"web3_published\"");
    }
}
