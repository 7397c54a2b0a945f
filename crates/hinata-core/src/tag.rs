//! Tags
//!
//! Named classifications with hierarchy, synonyms, usage-weighted ranking,
//! and recommendation support. Tag names are normalized once and the
//! normalized form is globally unique; synonyms resolve to the same id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::query::{Pagination, SortDirection};

/// How a tag came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    #[default]
    User,
    System,
    AiExtracted,
    ContentBased,
    Behavioral,
}

impl TagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagType::User => "user",
            TagType::System => "system",
            TagType::AiExtracted => "ai_extracted",
            TagType::ContentBased => "content_based",
            TagType::Behavioral => "behavioral",
        }
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize a raw tag name: trim, lowercase, collapse internal whitespace
/// runs to a single underscore. Idempotent.
pub fn normalize_tag_name(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut in_gap = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            in_gap = true;
            continue;
        }
        if in_gap {
            normalized.push('_');
            in_gap = false;
        }
        for lower in ch.to_lowercase() {
            normalized.push(lower);
        }
    }
    normalized
}

/// A named classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    /// Normalized name, globally unique
    pub name: String,
    /// Name as the user originally typed it
    pub display_name: String,
    pub tag_type: TagType,
    pub category: String,
    #[serde(default)]
    pub usage_count: u64,
    /// Usage-weighted rank, recomputed on every use
    #[serde(default)]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Mutually consistent with each child's `parent_id`
    #[serde(default)]
    pub children: Vec<Uuid>,
    /// Normalized synonyms; each resolves to this tag's id
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Set for auto-extracted tags; expired tags are swept by cleanup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
}

/// How a tag got attached to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagUsageMethod {
    Manual,
    Auto,
    Recommended,
}

/// Immutable record of one tag application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagUsage {
    pub tag_id: Uuid,
    pub item_id: String,
    pub method: TagUsageMethod,
    pub used_at: DateTime<Utc>,
}

/// Request to create a tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTag {
    pub name: String,
    #[serde(default)]
    pub tag_type: TagType,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl CreateTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag_type: TagType::default(),
            category: String::new(),
            parent_id: None,
            synonyms: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_type(mut self, tag_type: TagType) -> Self {
        self.tag_type = tag_type;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    #[must_use]
    pub fn with_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.synonyms = synonyms;
        self
    }
}

/// Partial update for an existing tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Sort keys for tag queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSortField {
    Name,
    #[default]
    UsageCount,
    Weight,
}

/// Filters for tag queries. `name_pattern` is a substring match on the
/// normalized name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_type: Option<TagType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_usage: Option<u64>,
    #[serde(default)]
    pub sort_by: TagSortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Which candidate set a recommendation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    ContentMatch,
    Popularity,
    Related,
}

/// One tag recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecommendation {
    pub tag_id: Uuid,
    pub name: String,
    pub score: f64,
    pub confidence: f64,
    pub source: RecommendationSource,
}

/// Options for `recommend`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecommendOptions {
    pub limit: usize,
    pub min_confidence: f64,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_confidence: 0.0,
        }
    }
}

/// Options for `extract`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExtractOptions {
    pub max_tags: usize,
    pub min_confidence: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_tags: 5,
            min_confidence: 0.0,
        }
    }
}

/// Aggregate counters over the tag store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagStatistics {
    pub tag_count: usize,
    pub type_counts: std::collections::HashMap<String, u64>,
    pub total_usage: u64,
    pub synonym_count: usize,
}
