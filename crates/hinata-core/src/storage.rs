//! Storage Traits
//!
//! Trait abstractions for the four HiNATA stores. Each trait focuses on a
//! single entity kind so backends can be composed and tested in isolation;
//! `hinata-storage` provides the in-memory implementations.
//!
//! # Thread Safety
//!
//! Implementations must be `Send + Sync`. Multi-map updates (reference
//! dual-maintenance, tag linkage, index pruning) must be atomic with
//! respect to readers: no caller may observe a reference present on the
//! source but absent from the target's backlinks.
//!
//! # Error Handling
//!
//! All operations return [`StoreResult`]. Single-item operations validate
//! before committing and never partially apply; `batch` isolates per-item
//! failures into a [`BatchReport`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::batch::{BatchOperation, BatchReport};
use crate::block::{
    BlockQuery, BlockStatistics, BlockUpdate, CreateReference, BlockReference, KnowledgeBlock,
    NewNoteItem, NoteItem, NoteItemUpdate,
};
use crate::error::StoreResult;
use crate::packet::{
    CaptureSource, Packet, PacketAggregations, PacketQuery, PacketStatistics, PacketUpdate,
    SimilarPacket, StoredPacket, TrendBucket, TrendGranularity,
};
use crate::query::{DateRange, Page};
use crate::relation::{
    CreateRelation, KnowledgeGraph, RelatedItem, Relation, RelationQuery, RelationStatistics,
    RelationUpdate,
};
use crate::tag::{
    CreateTag, ExtractOptions, RecommendOptions, Tag, TagQuery, TagRecommendation, TagStatistics,
    TagUpdate, TagUsage, TagUsageMethod,
};

/// Search results for packets: one page plus aggregations computed over
/// the filtered, pre-pagination set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PacketSearchResults {
    pub page: Page<StoredPacket>,
    pub aggregations: PacketAggregations,
}

/// Storage for ingested capture packets.
#[async_trait]
pub trait PacketStorage: Send + Sync {
    /// Validate and insert a packet.
    ///
    /// # Errors
    ///
    /// `Duplicate` if the packet id is already present, `Validation` if a
    /// required HiNATA field is missing or malformed. Neither touches
    /// state.
    async fn store(&self, packet: Packet) -> StoreResult<StoredPacket>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<StoredPacket>>;

    async fn get_by_user(&self, user_id: &str) -> StoreResult<Vec<StoredPacket>>;

    async fn get_by_source(&self, source: CaptureSource) -> StoreResult<Vec<StoredPacket>>;

    async fn get_by_time_range(&self, range: &DateRange) -> StoreResult<Vec<StoredPacket>>;

    /// Merge a partial update field-by-field and re-validate the result
    /// before commit. `NotFound` if the packet is absent.
    async fn update(&self, id: Uuid, update: PacketUpdate) -> StoreResult<StoredPacket>;

    /// Hard delete; prunes every secondary index.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Filter, free-text match, sort, paginate. Aggregations cover the
    /// filtered set before pagination.
    async fn search(&self, query: PacketQuery) -> StoreResult<PacketSearchResults>;

    /// Score every other packet with the lexical similarity heuristic and
    /// return those at or above `threshold`, best first.
    async fn get_similar(
        &self,
        id: Uuid,
        threshold: f64,
        limit: usize,
    ) -> StoreResult<Vec<SimilarPacket>>;

    /// Attention averages and peaks bucketed at the given granularity.
    async fn get_attention_trend(
        &self,
        granularity: TrendGranularity,
        range: Option<DateRange>,
    ) -> StoreResult<Vec<TrendBucket>>;

    /// Drop and rebuild all secondary indexes from the primary store. The
    /// sole recovery path when indexes are suspected inconsistent.
    async fn rebuild_index(&self) -> StoreResult<()>;

    async fn get_statistics(&self) -> StoreResult<PacketStatistics>;

    /// Apply a heterogeneous operation list best-effort.
    async fn batch(
        &self,
        operations: Vec<BatchOperation<Packet, PacketUpdate>>,
    ) -> StoreResult<BatchReport>;
}

/// Storage for derived knowledge blocks, their note items, and their
/// dual-maintained references/backlinks.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    async fn create(&self, block: KnowledgeBlock) -> StoreResult<KnowledgeBlock>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<KnowledgeBlock>>;

    async fn get_by_user(&self, user_id: &str) -> StoreResult<Vec<KnowledgeBlock>>;

    async fn get_by_library_item(&self, library_item_id: Uuid) -> StoreResult<Vec<KnowledgeBlock>>;

    async fn update(&self, id: Uuid, update: BlockUpdate) -> StoreResult<KnowledgeBlock>;

    /// Hard delete. Also removes every reference the block owns and every
    /// reference targeting it, keeping both sides' link lists consistent.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Append a note item and re-sort the block's items by `order`
    /// (stable for equal order values).
    async fn add_note_item(&self, block_id: Uuid, item: NewNoteItem) -> StoreResult<NoteItem>;

    async fn update_note_item(
        &self,
        block_id: Uuid,
        item_id: Uuid,
        update: NoteItemUpdate,
    ) -> StoreResult<NoteItem>;

    async fn remove_note_item(&self, block_id: Uuid, item_id: Uuid) -> StoreResult<()>;

    /// Rewrite each named item's `order` to its position in `ordered_ids`;
    /// items not named keep their prior order value. Callers should pass
    /// the full ordered set.
    async fn reorder_note_items(
        &self,
        block_id: Uuid,
        ordered_ids: &[Uuid],
    ) -> StoreResult<Vec<NoteItem>>;

    /// Atomically append to the source's `references` and the target's
    /// `backlinks`. `Consistency` on self-reference, `NotFound` if either
    /// endpoint is absent.
    async fn add_reference(&self, request: CreateReference) -> StoreResult<BlockReference>;

    /// Atomically undo both sides of `add_reference`.
    async fn remove_reference(&self, reference_id: Uuid) -> StoreResult<()>;

    async fn get_references(&self, block_id: Uuid) -> StoreResult<Vec<BlockReference>>;

    async fn get_backlinks(&self, block_id: Uuid) -> StoreResult<Vec<Uuid>>;

    async fn search(&self, query: BlockQuery) -> StoreResult<Page<KnowledgeBlock>>;

    async fn get_statistics(&self) -> StoreResult<BlockStatistics>;

    async fn batch(
        &self,
        operations: Vec<BatchOperation<KnowledgeBlock, BlockUpdate>>,
    ) -> StoreResult<BatchReport>;
}

/// Storage for the generic relation graph.
#[async_trait]
pub trait RelationStorage: Send + Sync {
    /// Create a relation, or update the strength of the existing relation
    /// with the same `(source, target, type)` triple (the new strength
    /// wins). `Consistency` on self-loops.
    async fn create(&self, request: CreateRelation) -> StoreResult<Relation>;

    /// Fetch by id, bumping `access_count` and `last_accessed`.
    async fn get(&self, id: Uuid) -> StoreResult<Option<Relation>>;

    async fn update(&self, id: Uuid, update: RelationUpdate) -> StoreResult<Relation>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Filter by type, strength range, bidirectional flag, and creation
    /// date; endpoint id lists prefilter through the indexes.
    async fn query(&self, query: RelationQuery) -> StoreResult<Vec<Relation>>;

    /// All relations touching an item (outgoing, plus incoming where
    /// bidirectional), bumping access stats.
    async fn get_related(&self, item_id: Uuid) -> StoreResult<Vec<Relation>>;

    /// Breadth-first traversal from the center items, visiting each item
    /// once, up to `max_depth` hops, only over edges with
    /// `strength >= min_strength`.
    async fn build_graph(
        &self,
        center_ids: &[Uuid],
        max_depth: usize,
        min_strength: f64,
    ) -> StoreResult<KnowledgeGraph>;

    /// Direct relations scored at raw strength, second-degree at
    /// `s1 * s2 * 0.7`; deduplicated by target keeping the higher score,
    /// strictly descending.
    async fn recommend(
        &self,
        item_id: Uuid,
        limit: usize,
        min_strength: f64,
    ) -> StoreResult<Vec<RelatedItem>>;

    /// Remove system-created relations whose `last_accessed` exceeds the
    /// configured TTL. User-created relations are never expired. Returns
    /// the number removed.
    async fn cleanup(&self) -> StoreResult<usize>;

    async fn get_statistics(&self) -> StoreResult<RelationStatistics>;

    async fn batch(
        &self,
        operations: Vec<BatchOperation<CreateRelation, RelationUpdate>>,
    ) -> StoreResult<BatchReport>;
}

/// Storage for tags: taxonomy, usage accounting, recommendation, and
/// extraction.
#[async_trait]
pub trait TagStorage: Send + Sync {
    /// Create a tag. If the normalized name or any synonym already
    /// resolves to an existing tag, that tag is returned instead of
    /// creating a duplicate.
    async fn create(&self, request: CreateTag) -> StoreResult<Tag>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Tag>>;

    /// Resolve a raw name or synonym to a tag id, after normalization.
    async fn resolve(&self, name: &str) -> StoreResult<Option<Uuid>>;

    async fn update(&self, id: Uuid, update: TagUpdate) -> StoreResult<Tag>;

    async fn query(&self, query: TagQuery) -> StoreResult<Page<Tag>>;

    /// Register a synonym. `Consistency` if it already resolves to a
    /// different tag.
    async fn add_synonym(&self, tag_id: Uuid, synonym: &str) -> StoreResult<Tag>;

    /// Re-parent a tag, keeping both sides of the hierarchy consistent.
    /// `Consistency` if the move would create a cycle.
    async fn set_parent(&self, tag_id: Uuid, parent_id: Option<Uuid>) -> StoreResult<Tag>;

    /// Record a tag application: bumps `usage_count`, stamps `last_used`,
    /// recomputes the usage weight, and appends an immutable usage record.
    async fn use_tag(
        &self,
        tag_id: Uuid,
        item_id: &str,
        method: TagUsageMethod,
    ) -> StoreResult<Tag>;

    async fn get_usage(&self, tag_id: Uuid) -> StoreResult<Vec<TagUsage>>;

    /// Merge content-match, popularity, and co-occurrence candidates into
    /// one ranked list. Never returns a tag in `existing_tags`.
    async fn recommend(
        &self,
        item_id: &str,
        content: &str,
        existing_tags: &[Uuid],
        options: RecommendOptions,
    ) -> StoreResult<Vec<TagRecommendation>>;

    /// Frequency-ranked keyword extraction; materializes missing keywords
    /// as expiring AI tags.
    async fn extract(&self, content: &str, options: ExtractOptions) -> StoreResult<Vec<Tag>>;

    /// Delete a tag; children are re-parented to the deleted tag's parent.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Weight-ranked tags, best first.
    async fn get_popular(&self, limit: usize) -> StoreResult<Vec<Tag>>;

    /// Remove expired AI tags and stale unused system tags. Returns the
    /// number removed.
    async fn cleanup(&self) -> StoreResult<usize>;

    async fn get_statistics(&self) -> StoreResult<TagStatistics>;

    async fn batch(
        &self,
        operations: Vec<BatchOperation<CreateTag, TagUpdate>>,
    ) -> StoreResult<BatchReport>;
}
