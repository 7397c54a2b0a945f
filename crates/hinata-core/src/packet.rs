//! HiNATA Packets
//!
//! A packet is one ingested capture event: metadata describing where, when,
//! and how the capture happened, plus a HiNATA payload. Packets are
//! immutable once validated except via an explicit merge-update.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hinata::{AccessLevel, Attachment, ContentFormat, HinataCore};
use crate::query::{DateRange, Pagination, SortDirection};

/// Where a capture originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    WebClipper,
    IosShare,
    AndroidShare,
    ScreenshotOcr,
    ManualInput,
    WechatForwarder,
    ApiIngest,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureSource::WebClipper => "web_clipper",
            CaptureSource::IosShare => "ios_share",
            CaptureSource::AndroidShare => "android_share",
            CaptureSource::ScreenshotOcr => "screenshot_ocr",
            CaptureSource::ManualInput => "manual_input",
            CaptureSource::WechatForwarder => "wechat_forwarder",
            CaptureSource::ApiIngest => "api_ingest",
        }
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the user did to produce the capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    QuickSave,
    DetailedEdit,
    Highlight,
    Bookmark,
    Share,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::QuickSave => "quick_save",
            UserAction::DetailedEdit => "detailed_edit",
            UserAction::Highlight => "highlight",
            UserAction::Bookmark => "bookmark",
            UserAction::Share => "share",
        }
    }
}

impl fmt::Display for UserAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capture-time device context. A closed struct, not a dynamic map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceContext {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Capture metadata attached to every packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketMetadata {
    pub packet_id: Uuid,
    pub capture_source: CaptureSource,
    pub capture_timestamp: DateTime<Utc>,
    pub user_action: UserAction,
    #[serde(default)]
    pub device_context: DeviceContext,
    /// Raw attention score from the capture pipeline, 0-100
    #[serde(default)]
    pub attention_score_raw: u8,
    #[serde(default)]
    pub processing_flags: Vec<String>,
}

/// Packet payload: the HiNATA tuple plus ownership and attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketPayload {
    pub core: HinataCore,
    pub user_id: String,
    #[serde(default)]
    pub content_format: ContentFormat,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// One ingested capture event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub metadata: PacketMetadata,
    pub payload: PacketPayload,
}

impl Packet {
    /// Create a packet with a fresh id and the current capture timestamp.
    pub fn new(
        capture_source: CaptureSource,
        user_action: UserAction,
        core: HinataCore,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            metadata: PacketMetadata {
                packet_id: Uuid::new_v4(),
                capture_source,
                capture_timestamp: Utc::now(),
                user_action,
                device_context: DeviceContext::default(),
                attention_score_raw: 0,
                processing_flags: Vec::new(),
            },
            payload: PacketPayload {
                core,
                user_id: user_id.into(),
                content_format: ContentFormat::default(),
                attachments: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> Uuid {
        self.metadata.packet_id
    }

    #[must_use]
    pub fn with_attention_score(mut self, score: u8) -> Self {
        self.metadata.attention_score_raw = score;
        self
    }

    #[must_use]
    pub fn with_device_context(mut self, context: DeviceContext) -> Self {
        self.metadata.device_context = context;
        self
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.payload.attachments = attachments;
        self
    }

    #[must_use]
    pub fn with_content_format(mut self, format: ContentFormat) -> Self {
        self.payload.content_format = format;
        self
    }
}

/// A packet as held by the store, with store-stamped timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPacket {
    pub packet: Packet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredPacket {
    pub fn id(&self) -> Uuid {
        self.packet.id()
    }
}

/// Partial update applied field-by-field onto an existing packet.
///
/// Absent fields leave the stored value untouched; the merged result is
/// re-validated before commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketUpdate {
    // metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_action: Option<UserAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_score_raw: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_context: Option<DeviceContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_flags: Option<Vec<String>>,
    // payload
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
    pub content_format: Option<ContentFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl PacketUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge this update into `packet`, field by field.
    pub fn apply(&self, packet: &mut Packet) {
        if let Some(action) = self.user_action {
            packet.metadata.user_action = action;
        }
        if let Some(score) = self.attention_score_raw {
            packet.metadata.attention_score_raw = score;
        }
        if let Some(ref context) = self.device_context {
            packet.metadata.device_context = context.clone();
        }
        if let Some(ref flags) = self.processing_flags {
            packet.metadata.processing_flags = flags.clone();
        }
        if let Some(ref highlight) = self.highlight {
            packet.payload.core.highlight = highlight.clone();
        }
        if let Some(ref note) = self.note {
            packet.payload.core.note = note.clone();
        }
        if let Some(ref at) = self.at {
            packet.payload.core.at = at.clone();
        }
        if let Some(ref tags) = self.tags {
            packet.payload.core.tags = tags.clone();
        }
        if let Some(access) = self.access {
            packet.payload.core.access = access;
        }
        if let Some(format) = self.content_format {
            packet.payload.content_format = format;
        }
        if let Some(ref attachments) = self.attachments {
            packet.payload.attachments = attachments.clone();
        }
    }
}

/// Sort keys for packet search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    CapturedAt,
    AttentionScore,
}

/// Search query over the packet store: filters, free text, sort, page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketQuery {
    /// AND-of-terms free text; each whitespace-separated term must appear
    /// as a substring of the packet's denormalized text blob
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_source: Option<CaptureSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_action: Option<UserAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_attention: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attention: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachments: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub sort_by: PacketSortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Min/max/avg/median of attention scores over a result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttentionStats {
    pub min: u8,
    pub max: u8,
    pub avg: f64,
    pub median: f64,
}

/// Aggregations computed over the filtered, pre-pagination result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketAggregations {
    pub source_counts: HashMap<String, u64>,
    pub action_counts: HashMap<String, u64>,
    pub attention: AttentionStats,
}

/// A packet id scored against a reference packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPacket {
    pub packet_id: Uuid,
    pub score: f64,
}

/// Bucket granularity for the attention trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendGranularity {
    Hour,
    Day,
    Week,
    Month,
}

/// One attention-trend bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendBucket {
    /// Bucket key, e.g. `2026-08-07-14` for hour granularity
    pub bucket: String,
    pub count: u64,
    pub avg_attention: f64,
    pub peak_attention: u8,
    pub source_counts: HashMap<String, u64>,
}

/// Aggregate counters over the whole packet store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketStatistics {
    pub packet_count: usize,
    pub user_count: usize,
    pub source_counts: HashMap<String, u64>,
    pub attachment_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_new_stamps_identity() {
        let packet = Packet::new(
            CaptureSource::WebClipper,
            UserAction::Highlight,
            HinataCore::new("h", "https://x"),
            "u1",
        );

        assert!(!packet.id().is_nil());
        assert_eq!(packet.payload.user_id, "u1");
        assert_eq!(packet.metadata.attention_score_raw, 0);
    }

    #[test]
    fn test_update_merges_field_by_field() {
        let mut packet = Packet::new(
            CaptureSource::ManualInput,
            UserAction::QuickSave,
            HinataCore::new("h", "https://x").with_note("original"),
            "u1",
        );

        let update = PacketUpdate {
            note: Some("revised".to_string()),
            attention_score_raw: Some(80),
            ..Default::default()
        };
        update.apply(&mut packet);

        // untouched fields survive the merge
        assert_eq!(packet.payload.core.highlight, "h");
        assert_eq!(packet.payload.core.note, "revised");
        assert_eq!(packet.metadata.attention_score_raw, 80);
        assert_eq!(packet.metadata.user_action, UserAction::QuickSave);
    }

    #[test]
    fn test_empty_update_detection() {
        assert!(PacketUpdate::default().is_empty());
        let update = PacketUpdate {
            highlight: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_packet_roundtrip() {
        let packet = Packet::new(
            CaptureSource::ApiIngest,
            UserAction::Bookmark,
            HinataCore::new("h", "https://x"),
            "u1",
        )
        .with_attention_score(42);

        let json = serde_json::to_string(&packet).unwrap();
        let back: Packet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, packet);
    }
}
