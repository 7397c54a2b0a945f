//! Knowledge Blocks
//!
//! A knowledge block is a derived, user-curated knowledge unit: a HiNATA
//! tuple anchored to a library item, carrying ordered note items and typed
//! references to other blocks. Backlinks are the auto-maintained reverse
//! direction of those references.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hinata::{AccessLevel, ContentFormat, HinataCore};
use crate::query::{DateRange, Pagination, SortDirection};

/// Position of a block within its library item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub start_offset: u32,
    pub end_offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
}

/// Ordered sub-content of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteItem {
    pub id: Uuid,
    pub content: String,
    #[serde(default)]
    pub content_format: ContentFormat,
    /// Sort key within the block; ties keep insertion order
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NoteItem {
    pub fn new(content: impl Into<String>, order: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            content_format: ContentFormat::default(),
            order,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: ContentFormat) -> Self {
        self.content_format = format;
        self
    }
}

/// Kind of a block-to-block reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Strong,
    Weak,
    Hierarchical,
    Semantic,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Strong => "strong",
            ReferenceType::Weak => "weak",
            ReferenceType::Hierarchical => "hierarchical",
            ReferenceType::Semantic => "semantic",
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directed block-to-block edge, owned by the block store.
///
/// Created only through the store's `add_reference`, which also maintains
/// the target's backlink list; never constructed ad hoc by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReference {
    pub id: Uuid,
    pub source_block_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_note_item_id: Option<Uuid>,
    pub target_block_id: Uuid,
    pub reference_type: ReferenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to create a reference between two existing blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReference {
    pub source_block_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_note_item_id: Option<Uuid>,
    pub target_block_id: Uuid,
    pub reference_type: ReferenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl CreateReference {
    pub fn new(source: Uuid, target: Uuid, reference_type: ReferenceType) -> Self {
        Self {
            source_block_id: source,
            source_note_item_id: None,
            target_block_id: target,
            reference_type,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn from_note_item(mut self, note_item_id: Uuid) -> Self {
        self.source_note_item_id = Some(note_item_id);
        self
    }
}

/// A derived knowledge unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBlock {
    pub id: Uuid,
    pub user_id: String,
    /// Parent library item; integrity is validated by the caller
    pub library_item_id: Uuid,
    pub core: HinataCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionInfo>,
    #[serde(default)]
    pub note_items: Vec<NoteItem>,
    /// Outgoing references, maintained only by the store
    #[serde(default)]
    pub references: Vec<BlockReference>,
    /// Ids of blocks whose references target this block
    #[serde(default)]
    pub backlinks: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeBlock {
    pub fn new(user_id: impl Into<String>, library_item_id: Uuid, core: HinataCore) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            library_item_id,
            core,
            position: None,
            note_items: Vec::new(),
            references: Vec::new(),
            backlinks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: PositionInfo) -> Self {
        self.position = Some(position);
        self
    }

    /// Note items in display order (already kept sorted by the store)
    pub fn note_item(&self, id: Uuid) -> Option<&NoteItem> {
        self.note_items.iter().find(|item| item.id == id)
    }
}

/// Partial update applied field-by-field onto an existing block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionInfo>,
}

impl BlockUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, block: &mut KnowledgeBlock) {
        if let Some(ref highlight) = self.highlight {
            block.core.highlight = highlight.clone();
        }
        if let Some(ref note) = self.note {
            block.core.note = note.clone();
        }
        if let Some(ref at) = self.at {
            block.core.at = at.clone();
        }
        if let Some(ref tags) = self.tags {
            block.core.tags = tags.clone();
        }
        if let Some(access) = self.access {
            block.core.access = access;
        }
        if let Some(ref position) = self.position {
            block.position = Some(position.clone());
        }
    }
}

/// New note item request; id and timestamps are stamped by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNoteItem {
    pub content: String,
    #[serde(default)]
    pub content_format: ContentFormat,
    pub order: i32,
}

/// Content/format update for one note item.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_format: Option<ContentFormat>,
}

/// Sort keys for block search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

/// Search query over the block store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockQuery {
    /// AND-of-terms free text over highlight, note, and note-item content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_item_id: Option<Uuid>,
    /// Every listed tag must be present on the block
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub access_levels: Vec<AccessLevel>,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub sort_by: BlockSortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Aggregate counters over the whole block store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStatistics {
    pub block_count: usize,
    pub note_item_count: usize,
    pub reference_count: usize,
    pub avg_note_items_per_block: f64,
    /// Top 10 tags by frequency, most frequent first
    pub top_tags: Vec<(String, u64)>,
    /// `YYYY-MM-DD` buckets, chronological
    pub daily_created: Vec<(String, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_new_has_no_links() {
        let block = KnowledgeBlock::new("u1", Uuid::new_v4(), HinataCore::new("h", "at"));

        assert!(block.note_items.is_empty());
        assert!(block.references.is_empty());
        assert!(block.backlinks.is_empty());
        assert_eq!(block.created_at, block.updated_at);
    }

    #[test]
    fn test_block_update_merge() {
        let mut block = KnowledgeBlock::new("u1", Uuid::new_v4(), HinataCore::new("h", "at"));
        let update = BlockUpdate {
            note: Some("annotated".to_string()),
            access: Some(AccessLevel::Shared),
            ..Default::default()
        };
        update.apply(&mut block);

        assert_eq!(block.core.highlight, "h");
        assert_eq!(block.core.note, "annotated");
        assert_eq!(block.core.access, AccessLevel::Shared);
    }

    #[test]
    fn test_create_reference_builder() {
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let item = Uuid::new_v4();
        let req = CreateReference::new(source, target, ReferenceType::Strong)
            .with_context("quoted in summary")
            .from_note_item(item);

        assert_eq!(req.source_block_id, source);
        assert_eq!(req.target_block_id, target);
        assert_eq!(req.source_note_item_id, Some(item));
        assert_eq!(req.context.as_deref(), Some("quoted in summary"));
    }

    #[test]
    fn test_note_item_lookup() {
        let mut block = KnowledgeBlock::new("u1", Uuid::new_v4(), HinataCore::new("h", "at"));
        let item = NoteItem::new("first", 0);
        let id = item.id;
        block.note_items.push(item);

        assert!(block.note_item(id).is_some());
        assert!(block.note_item(Uuid::new_v4()).is_none());
    }
}
