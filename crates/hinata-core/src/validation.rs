//! HiNATA Validation
//!
//! Field-path validation applied before any store mutation. Limits follow
//! the capture pipeline's contract; a packet or block that passes here is
//! safe to index.

use crate::block::KnowledgeBlock;
use crate::error::{StoreError, StoreResult};
use crate::hinata::{
    HinataCore, MAX_ATTACHMENTS, MAX_HIGHLIGHT_LEN, MAX_NOTE_ITEMS, MAX_NOTE_LEN, MAX_SOURCE_LEN,
    MAX_TAGS, MAX_TAG_LEN,
};
use crate::packet::Packet;

/// Highest raw attention score the capture pipeline may emit.
pub const MAX_ATTENTION_SCORE: u8 = 100;

/// Validate a HiNATA core tuple under the given field prefix
/// (e.g. `payload.core`).
pub fn validate_core(core: &HinataCore, prefix: &str) -> StoreResult<()> {
    if core.highlight.trim().is_empty() {
        return Err(StoreError::validation(
            format!("{prefix}.highlight"),
            "must not be empty",
        ));
    }
    if core.highlight.chars().count() > MAX_HIGHLIGHT_LEN {
        return Err(StoreError::validation(
            format!("{prefix}.highlight"),
            format!("exceeds {MAX_HIGHLIGHT_LEN} characters"),
        ));
    }
    if core.note.chars().count() > MAX_NOTE_LEN {
        return Err(StoreError::validation(
            format!("{prefix}.note"),
            format!("exceeds {MAX_NOTE_LEN} characters"),
        ));
    }
    if core.at.trim().is_empty() {
        return Err(StoreError::validation(
            format!("{prefix}.at"),
            "must not be empty",
        ));
    }
    if core.at.chars().count() > MAX_SOURCE_LEN {
        return Err(StoreError::validation(
            format!("{prefix}.at"),
            format!("exceeds {MAX_SOURCE_LEN} characters"),
        ));
    }
    validate_tags(&core.tags, &format!("{prefix}.tags"))
}

/// Validate a raw tag list: count and per-tag length.
pub fn validate_tags(tags: &[String], field: &str) -> StoreResult<()> {
    if tags.len() > MAX_TAGS {
        return Err(StoreError::validation(
            field,
            format!("more than {MAX_TAGS} tags"),
        ));
    }
    for (idx, tag) in tags.iter().enumerate() {
        if tag.trim().is_empty() {
            return Err(StoreError::validation(
                format!("{field}[{idx}]"),
                "must not be empty",
            ));
        }
        if tag.chars().count() > MAX_TAG_LEN {
            return Err(StoreError::validation(
                format!("{field}[{idx}]"),
                format!("exceeds {MAX_TAG_LEN} characters"),
            ));
        }
    }
    Ok(())
}

/// Validate a full packet before storing or after a merge-update.
pub fn validate_packet(packet: &Packet) -> StoreResult<()> {
    if packet.metadata.packet_id.is_nil() {
        return Err(StoreError::validation("metadata.packet_id", "must not be nil"));
    }
    if packet.metadata.attention_score_raw > MAX_ATTENTION_SCORE {
        return Err(StoreError::validation(
            "metadata.attention_score_raw",
            format!("exceeds {MAX_ATTENTION_SCORE}"),
        ));
    }
    if packet.payload.user_id.trim().is_empty() {
        return Err(StoreError::validation("payload.user_id", "must not be empty"));
    }
    if packet.payload.attachments.len() > MAX_ATTACHMENTS {
        return Err(StoreError::validation(
            "payload.attachments",
            format!("more than {MAX_ATTACHMENTS} attachments"),
        ));
    }
    validate_core(&packet.payload.core, "payload.core")
}

/// Validate a knowledge block before creation or after a merge-update.
pub fn validate_block(block: &KnowledgeBlock) -> StoreResult<()> {
    if block.id.is_nil() {
        return Err(StoreError::validation("id", "must not be nil"));
    }
    if block.user_id.trim().is_empty() {
        return Err(StoreError::validation("user_id", "must not be empty"));
    }
    if block.library_item_id.is_nil() {
        return Err(StoreError::validation("library_item_id", "must not be nil"));
    }
    if block.note_items.len() > MAX_NOTE_ITEMS {
        return Err(StoreError::validation(
            "note_items",
            format!("more than {MAX_NOTE_ITEMS} note items"),
        ));
    }
    validate_core(&block.core, "core")
}
