//! Generic Relations
//!
//! Typed, weighted, optionally bidirectional edges between two opaque
//! knowledge-item ids. Distinct from block-to-block references: the
//! relation store treats its endpoints as untyped keys and never checks
//! them against another store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::query::DateRange;

/// Relation kinds in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    StrongReference,
    WeakReference,
    SemanticSimilarity,
    TemporalAssociation,
    TagAssociation,
    UserDefined,
    Derived,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::StrongReference => "strong_reference",
            RelationType::WeakReference => "weak_reference",
            RelationType::SemanticSimilarity => "semantic_similarity",
            RelationType::TemporalAssociation => "temporal_association",
            RelationType::TagAssociation => "tag_association",
            RelationType::UserDefined => "user_defined",
            RelationType::Derived => "derived",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who created the relation. Only `System` relations are ever auto-expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationOrigin {
    #[default]
    User,
    System,
}

/// Closed metadata union attached to a relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationMetadata {
    #[default]
    None,
    /// Free-form display label
    Label { label: String },
    /// Edge synthesized by a derivation strategy from another relation
    Derived { from_relation: Uuid },
    /// Capture context the edge was observed in
    Context { context: String },
}

/// A typed, weighted edge between two opaque item ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation_type: RelationType,
    /// Edge strength in `[0, 1]`
    pub strength: f64,
    pub bidirectional: bool,
    #[serde(default)]
    pub origin: RelationOrigin,
    #[serde(default)]
    pub metadata: RelationMetadata,
    #[serde(default)]
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Relation {
    /// Whether the relation connects `item_id` to anything, honoring the
    /// bidirectional flag for incoming edges.
    pub fn touches(&self, item_id: Uuid) -> bool {
        self.source_id == item_id || (self.bidirectional && self.target_id == item_id)
    }

    /// The endpoint opposite `item_id`, if the relation touches it.
    pub fn other_end(&self, item_id: Uuid) -> Option<Uuid> {
        if self.source_id == item_id {
            Some(self.target_id)
        } else if self.bidirectional && self.target_id == item_id {
            Some(self.source_id)
        } else {
            None
        }
    }
}

/// Request to create a relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRelation {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation_type: RelationType,
    #[serde(default = "CreateRelation::default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub origin: RelationOrigin,
    #[serde(default)]
    pub metadata: RelationMetadata,
}

impl CreateRelation {
    fn default_strength() -> f64 {
        0.5
    }

    pub fn new(source_id: Uuid, target_id: Uuid, relation_type: RelationType) -> Self {
        Self {
            source_id,
            target_id,
            relation_type,
            strength: Self::default_strength(),
            bidirectional: false,
            origin: RelationOrigin::default(),
            metadata: RelationMetadata::default(),
        }
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    #[must_use]
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: RelationOrigin) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: RelationMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Partial update for an existing relation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidirectional: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RelationMetadata>,
}

/// Filters for `query`; `source_ids`/`target_ids` are used as an
/// index-accelerated prefilter when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationQuery {
    #[serde(default)]
    pub types: Vec<RelationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_strength: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidirectional: Option<bool>,
    #[serde(default)]
    pub created_range: DateRange,
    #[serde(default)]
    pub source_ids: Vec<Uuid>,
    #[serde(default)]
    pub target_ids: Vec<Uuid>,
}

/// Node in a traversal result: item id plus hop distance from the nearest
/// center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub item_id: Uuid,
    pub depth: usize,
}

/// Edge in a traversal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub relation_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub relation_type: RelationType,
    pub strength: f64,
}

/// Result of a breadth-first graph build around a set of center items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// `edges / (n * (n - 1))` for n > 1, else 0
    pub density: f64,
    /// Trivial default `ceil(n / 10)` until a real cluster strategy lands
    pub cluster_count: usize,
}

/// One recommendation: a related item with its propagated score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedItem {
    pub item_id: Uuid,
    pub score: f64,
    /// Intermediate item for second-degree recommendations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<Uuid>,
}

/// Aggregate counters over the relation store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationStatistics {
    pub relation_count: usize,
    pub type_counts: std::collections::HashMap<String, u64>,
    pub avg_strength: f64,
    pub bidirectional_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touches_respects_direction() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Utc::now();
        let mut relation = Relation {
            id: Uuid::new_v4(),
            source_id: a,
            target_id: b,
            relation_type: RelationType::WeakReference,
            strength: 0.5,
            bidirectional: false,
            origin: RelationOrigin::User,
            metadata: RelationMetadata::None,
            access_count: 0,
            last_accessed: now,
            created_at: now,
        };

        assert!(relation.touches(a));
        assert!(!relation.touches(b));
        assert_eq!(relation.other_end(a), Some(b));
        assert_eq!(relation.other_end(b), None);

        relation.bidirectional = true;
        assert!(relation.touches(b));
        assert_eq!(relation.other_end(b), Some(a));
    }

    #[test]
    fn test_create_relation_defaults() {
        let req = CreateRelation::new(Uuid::new_v4(), Uuid::new_v4(), RelationType::UserDefined);
        assert_eq!(req.strength, 0.5);
        assert!(!req.bidirectional);
        assert_eq!(req.origin, RelationOrigin::User);
    }

    #[test]
    fn test_metadata_tagged_wire_format() {
        let metadata = RelationMetadata::Label {
            label: "cites".to_string(),
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"type":"label","label":"cites"}"#);

        let back: RelationMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
