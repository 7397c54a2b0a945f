//! # HiNATA Core
//!
//! Domain types, validation, and storage traits for the HiNATA
//! knowledge-capture engine.
//!
//! Every entity in the system extends the five-field HiNATA tuple
//! (Highlight, Note, At/source, Tag, Access):
//!
//! - [`packet::Packet`]: one ingested capture event with device/source
//!   metadata
//! - [`block::KnowledgeBlock`]: a derived knowledge unit with ordered
//!   note items and typed block-to-block references
//! - [`relation::Relation`]: a generic typed, weighted edge between
//!   opaque item ids
//! - [`tag::Tag`]: a named classification with hierarchy, synonyms, and
//!   usage-weighted ranking
//!
//! The four storage traits live in [`storage`]; `hinata-storage` provides
//! the in-memory implementations. Core defines the abstractions and
//! depends on no backend.

pub mod batch;
pub mod block;
pub mod config;
pub mod error;
pub mod events;
pub mod hinata;
pub mod packet;
pub mod query;
pub mod relation;
pub mod storage;
pub mod tag;
pub mod validation;

// Re-export main types for convenience
pub use batch::{BatchOperation, BatchOutcome, BatchReport};
pub use block::{
    BlockQuery, BlockReference, BlockSortField, BlockStatistics, BlockUpdate, CreateReference,
    KnowledgeBlock, NewNoteItem, NoteItem, NoteItemUpdate, PositionInfo, ReferenceType,
};
pub use config::{MaintenanceConfig, RelationStoreConfig, StorageConfig, TagStoreConfig};
pub use error::{EntityKind, StoreError, StoreResult};
pub use events::{EventBus, StoreEvent};
pub use hinata::{
    AccessLevel, Attachment, ContentFormat, HinataCore, MAX_ATTACHMENTS, MAX_HIGHLIGHT_LEN,
    MAX_NOTE_ITEMS, MAX_NOTE_LEN, MAX_SOURCE_LEN, MAX_TAGS, MAX_TAG_LEN,
};
pub use packet::{
    AttentionStats, CaptureSource, DeviceContext, Packet, PacketAggregations, PacketMetadata,
    PacketPayload, PacketQuery, PacketSortField, PacketStatistics, PacketUpdate, SimilarPacket,
    StoredPacket, TrendBucket, TrendGranularity, UserAction,
};
pub use query::{DateRange, Page, Pagination, SortDirection};
pub use relation::{
    CreateRelation, GraphEdge, GraphNode, KnowledgeGraph, RelatedItem, Relation, RelationMetadata,
    RelationOrigin, RelationQuery, RelationStatistics, RelationType, RelationUpdate,
};
pub use storage::{
    BlockStorage, PacketSearchResults, PacketStorage, RelationStorage, TagStorage,
};
pub use tag::{
    normalize_tag_name, CreateTag, ExtractOptions, RecommendOptions, RecommendationSource, Tag,
    TagQuery, TagRecommendation, TagSortField, TagStatistics, TagType, TagUpdate, TagUsage,
    TagUsageMethod,
};
pub use validation::{validate_block, validate_core, validate_packet, validate_tags};
