//! In-Memory Packet Store
//!
//! Owns ingested capture packets behind a single lock: the primary arena
//! and all five secondary indexes (by-user, by-source, by-time-bucket,
//! free-text tokens, by-tag) live in one interior struct, so every
//! mutation updates them atomically with respect to readers.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use hinata_core::batch::{BatchOperation, BatchOutcome, BatchReport};
use hinata_core::error::{EntityKind, StoreError, StoreResult};
use hinata_core::events::{EventBus, StoreEvent};
use hinata_core::packet::{
    AttentionStats, CaptureSource, Packet, PacketAggregations, PacketQuery, PacketSortField,
    PacketStatistics, PacketUpdate, SimilarPacket, StoredPacket, TrendBucket, TrendGranularity,
};
use hinata_core::query::{DateRange, Page, SortDirection};
use hinata_core::storage::{PacketSearchResults, PacketStorage};
use hinata_core::tag::normalize_tag_name;
use hinata_core::validation::validate_packet;

use crate::arena::{Arena, SlotId};
use crate::keywords;

/// Hour-granularity time-bucket key derived from the capture timestamp.
fn time_bucket(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d-%H").to_string()
}

/// Denormalized lowercase text blob used for free-text matching.
fn search_blob(packet: &Packet) -> String {
    let core = &packet.payload.core;
    let mut blob = String::with_capacity(
        core.highlight.len() + core.note.len() + core.at.len() + 16 * core.tags.len(),
    );
    blob.push_str(&core.highlight.to_lowercase());
    blob.push(' ');
    blob.push_str(&core.note.to_lowercase());
    blob.push(' ');
    blob.push_str(&core.at.to_lowercase());
    for tag in &core.tags {
        blob.push(' ');
        blob.push_str(&tag.to_lowercase());
    }
    blob
}

/// Distinct index tokens for a packet's text fields.
fn index_tokens(packet: &Packet) -> HashSet<String> {
    let core = &packet.payload.core;
    let mut tokens: HashSet<String> = HashSet::new();
    tokens.extend(keywords::tokenize(&core.highlight));
    tokens.extend(keywords::tokenize(&core.note));
    tokens.extend(keywords::tokenize(&core.at));
    for tag in &core.tags {
        tokens.extend(keywords::tokenize(tag));
    }
    tokens
}

/// Primary arena plus every secondary index, guarded together.
#[derive(Default)]
struct PacketIndexes {
    arena: Arena<StoredPacket>,
    by_id: HashMap<Uuid, SlotId>,
    by_user: HashMap<String, Vec<SlotId>>,
    by_source: HashMap<CaptureSource, Vec<SlotId>>,
    by_time_bucket: HashMap<String, Vec<SlotId>>,
    by_token: HashMap<String, Vec<SlotId>>,
    by_tag: HashMap<String, Vec<SlotId>>,
}

impl PacketIndexes {
    fn index(&mut self, slot: SlotId, stored: &StoredPacket) {
        let packet = &stored.packet;
        self.by_user
            .entry(packet.payload.user_id.clone())
            .or_default()
            .push(slot);
        self.by_source
            .entry(packet.metadata.capture_source)
            .or_default()
            .push(slot);
        self.by_time_bucket
            .entry(time_bucket(packet.metadata.capture_timestamp))
            .or_default()
            .push(slot);
        for token in index_tokens(packet) {
            self.by_token.entry(token).or_default().push(slot);
        }
        for tag in &packet.payload.core.tags {
            self.by_tag
                .entry(normalize_tag_name(tag))
                .or_default()
                .push(slot);
        }
    }

    fn unindex(&mut self, slot: SlotId, stored: &StoredPacket) {
        let packet = &stored.packet;
        prune(&mut self.by_user, &packet.payload.user_id, slot);
        prune(&mut self.by_source, &packet.metadata.capture_source, slot);
        prune(
            &mut self.by_time_bucket,
            &time_bucket(packet.metadata.capture_timestamp),
            slot,
        );
        for token in index_tokens(packet) {
            prune(&mut self.by_token, &token, slot);
        }
        for tag in &packet.payload.core.tags {
            prune(&mut self.by_tag, &normalize_tag_name(tag), slot);
        }
    }

    fn rebuild(&mut self) {
        self.by_user.clear();
        self.by_source.clear();
        self.by_time_bucket.clear();
        self.by_token.clear();
        self.by_tag.clear();
        self.by_id.clear();

        let entries: Vec<(SlotId, StoredPacket)> = self
            .arena
            .iter()
            .map(|(slot, stored)| (slot, stored.clone()))
            .collect();
        for (slot, stored) in entries {
            self.by_id.insert(stored.id(), slot);
            self.index(slot, &stored);
        }
    }

    fn resolve(&self, slots: &[SlotId]) -> Vec<StoredPacket> {
        slots
            .iter()
            .filter_map(|slot| self.arena.get(*slot))
            .cloned()
            .collect()
    }
}

fn prune<K: std::hash::Hash + Eq + Clone>(
    index: &mut HashMap<K, Vec<SlotId>>,
    key: &K,
    slot: SlotId,
) {
    if let Some(slots) = index.get_mut(key) {
        slots.retain(|candidate| *candidate != slot);
        if slots.is_empty() {
            index.remove(key);
        }
    }
}

/// In-memory [`PacketStorage`] implementation.
pub struct MemoryPacketStore {
    inner: RwLock<PacketIndexes>,
    events: EventBus,
}

impl MemoryPacketStore {
    pub fn new() -> Self {
        Self::with_event_bus(EventBus::default())
    }

    pub fn with_event_bus(events: EventBus) -> Self {
        Self {
            inner: RwLock::new(PacketIndexes::default()),
            events,
        }
    }

    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    fn sort_packets(packets: &mut [StoredPacket], field: PacketSortField, direction: SortDirection) {
        packets.sort_by(|a, b| {
            let ordering = match field {
                PacketSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                PacketSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                PacketSortField::CapturedAt => a
                    .packet
                    .metadata
                    .capture_timestamp
                    .cmp(&b.packet.metadata.capture_timestamp),
                PacketSortField::AttentionScore => a
                    .packet
                    .metadata
                    .attention_score_raw
                    .cmp(&b.packet.metadata.attention_score_raw),
            };
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
    }

    fn aggregate(packets: &[StoredPacket]) -> PacketAggregations {
        let mut source_counts: HashMap<String, u64> = HashMap::new();
        let mut action_counts: HashMap<String, u64> = HashMap::new();
        let mut scores: Vec<u8> = Vec::with_capacity(packets.len());

        for stored in packets {
            let metadata = &stored.packet.metadata;
            *source_counts
                .entry(metadata.capture_source.as_str().to_string())
                .or_insert(0) += 1;
            *action_counts
                .entry(metadata.user_action.as_str().to_string())
                .or_insert(0) += 1;
            scores.push(metadata.attention_score_raw);
        }

        let attention = if scores.is_empty() {
            AttentionStats::default()
        } else {
            scores.sort_unstable();
            let sum: u64 = scores.iter().map(|s| *s as u64).sum();
            let mid = scores.len() / 2;
            let median = if scores.len() % 2 == 0 {
                (scores[mid - 1] as f64 + scores[mid] as f64) / 2.0
            } else {
                scores[mid] as f64
            };
            AttentionStats {
                min: scores[0],
                max: scores[scores.len() - 1],
                avg: sum as f64 / scores.len() as f64,
                median,
            }
        };

        PacketAggregations {
            source_counts,
            action_counts,
            attention,
        }
    }

    /// Lexical similarity: field equality plus tag overlap. Capped at 1.0
    /// by construction (0.2 + 0.1 + 0.2 + 0.5).
    fn similarity(reference: &Packet, candidate: &Packet) -> f64 {
        let mut score = 0.0;
        if reference.metadata.capture_source == candidate.metadata.capture_source {
            score += 0.2;
        }
        if reference.metadata.user_action == candidate.metadata.user_action {
            score += 0.1;
        }
        if reference.payload.user_id == candidate.payload.user_id {
            score += 0.2;
        }

        let reference_tags: HashSet<String> = reference
            .payload
            .core
            .tags
            .iter()
            .map(|tag| normalize_tag_name(tag))
            .collect();
        let candidate_tags: HashSet<String> = candidate
            .payload
            .core
            .tags
            .iter()
            .map(|tag| normalize_tag_name(tag))
            .collect();
        let union = reference_tags.union(&candidate_tags).count();
        if union > 0 {
            let intersection = reference_tags.intersection(&candidate_tags).count();
            score += 0.5 * intersection as f64 / union as f64;
        }
        score
    }

    fn trend_bucket_key(timestamp: DateTime<Utc>, granularity: TrendGranularity) -> String {
        match granularity {
            TrendGranularity::Hour => timestamp.format("%Y-%m-%d-%H").to_string(),
            TrendGranularity::Day => timestamp.format("%Y-%m-%d").to_string(),
            TrendGranularity::Week => {
                let week = timestamp.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            TrendGranularity::Month => timestamp.format("%Y-%m").to_string(),
        }
    }
}

impl Default for MemoryPacketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PacketStorage for MemoryPacketStore {
    async fn store(&self, packet: Packet) -> StoreResult<StoredPacket> {
        validate_packet(&packet)?;
        let id = packet.id();

        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&id) {
            return Err(StoreError::duplicate(EntityKind::Packet, id));
        }

        let now = Utc::now();
        let stored = StoredPacket {
            packet,
            created_at: now,
            updated_at: now,
        };
        let slot = inner.arena.insert(stored.clone());
        inner.by_id.insert(id, slot);
        inner.index(slot, &stored);
        drop(inner);

        tracing::debug!(packet_id = %id, "packet stored");
        self.events.emit(StoreEvent::PacketStored { packet_id: id });
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<StoredPacket>> {
        let inner = self.inner.read();
        Ok(inner
            .by_id
            .get(&id)
            .and_then(|slot| inner.arena.get(*slot))
            .cloned())
    }

    async fn get_by_user(&self, user_id: &str) -> StoreResult<Vec<StoredPacket>> {
        let inner = self.inner.read();
        Ok(inner
            .by_user
            .get(user_id)
            .map(|slots| inner.resolve(slots))
            .unwrap_or_default())
    }

    async fn get_by_source(&self, source: CaptureSource) -> StoreResult<Vec<StoredPacket>> {
        let inner = self.inner.read();
        Ok(inner
            .by_source
            .get(&source)
            .map(|slots| inner.resolve(slots))
            .unwrap_or_default())
    }

    async fn get_by_time_range(&self, range: &DateRange) -> StoreResult<Vec<StoredPacket>> {
        let inner = self.inner.read();
        Ok(inner
            .arena
            .iter()
            .filter(|(_, stored)| range.contains(stored.packet.metadata.capture_timestamp))
            .map(|(_, stored)| stored.clone())
            .collect())
    }

    async fn update(&self, id: Uuid, update: PacketUpdate) -> StoreResult<StoredPacket> {
        let mut inner = self.inner.write();
        let slot = *inner
            .by_id
            .get(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Packet, id))?;
        let previous = inner
            .arena
            .get(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Packet, id))?
            .clone();

        let mut merged = previous.clone();
        update.apply(&mut merged.packet);
        validate_packet(&merged.packet)?;
        merged.updated_at = Utc::now();

        inner.unindex(slot, &previous);
        inner.index(slot, &merged);
        if let Some(stored) = inner.arena.get_mut(slot) {
            *stored = merged.clone();
        }
        drop(inner);

        tracing::debug!(packet_id = %id, "packet updated");
        self.events.emit(StoreEvent::PacketUpdated { packet_id: id });
        Ok(merged)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let slot = inner
            .by_id
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Packet, id))?;
        if let Some(removed) = inner.arena.remove(slot) {
            inner.unindex(slot, &removed);
        }
        drop(inner);

        tracing::debug!(packet_id = %id, "packet deleted");
        self.events.emit(StoreEvent::PacketDeleted { packet_id: id });
        Ok(())
    }

    async fn search(&self, query: PacketQuery) -> StoreResult<PacketSearchResults> {
        let inner = self.inner.read();
        let mut filtered: Vec<StoredPacket> = inner
            .arena
            .iter()
            .filter(|(_, stored)| {
                let metadata = &stored.packet.metadata;
                let payload = &stored.packet.payload;

                if let Some(ref user_id) = query.user_id {
                    if &payload.user_id != user_id {
                        return false;
                    }
                }
                if let Some(source) = query.capture_source {
                    if metadata.capture_source != source {
                        return false;
                    }
                }
                if let Some(action) = query.user_action {
                    if metadata.user_action != action {
                        return false;
                    }
                }
                if let Some(min) = query.min_attention {
                    if metadata.attention_score_raw < min {
                        return false;
                    }
                }
                if let Some(max) = query.max_attention {
                    if metadata.attention_score_raw > max {
                        return false;
                    }
                }
                if let Some(ref device_id) = query.device_id {
                    if &metadata.device_context.device_id != device_id {
                        return false;
                    }
                }
                if let Some(has_attachments) = query.has_attachments {
                    if payload.attachments.is_empty() == has_attachments {
                        return false;
                    }
                }
                if !query.tags.is_empty() {
                    let packet_tags: HashSet<String> = payload
                        .core
                        .tags
                        .iter()
                        .map(|tag| normalize_tag_name(tag))
                        .collect();
                    if !query
                        .tags
                        .iter()
                        .all(|tag| packet_tags.contains(&normalize_tag_name(tag)))
                    {
                        return false;
                    }
                }
                if !query.date_range.contains(metadata.capture_timestamp) {
                    return false;
                }
                if let Some(ref text) = query.text {
                    if !keywords::matches_all_terms(&search_blob(&stored.packet), text) {
                        return false;
                    }
                }
                true
            })
            .map(|(_, stored)| stored.clone())
            .collect();
        drop(inner);

        // aggregations cover the filtered set before pagination
        let aggregations = Self::aggregate(&filtered);
        Self::sort_packets(&mut filtered, query.sort_by, query.sort_direction);
        let page = Page::slice(filtered, query.pagination);

        Ok(PacketSearchResults { page, aggregations })
    }

    async fn get_similar(
        &self,
        id: Uuid,
        threshold: f64,
        limit: usize,
    ) -> StoreResult<Vec<SimilarPacket>> {
        let inner = self.inner.read();
        let reference = inner
            .by_id
            .get(&id)
            .and_then(|slot| inner.arena.get(*slot))
            .ok_or_else(|| StoreError::not_found(EntityKind::Packet, id))?
            .clone();

        let mut scored: Vec<SimilarPacket> = inner
            .arena
            .iter()
            .filter(|(_, stored)| stored.id() != id)
            .filter_map(|(_, stored)| {
                let score = Self::similarity(&reference.packet, &stored.packet);
                (score >= threshold).then(|| SimilarPacket {
                    packet_id: stored.id(),
                    score,
                })
            })
            .collect();
        drop(inner);

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.packet_id.cmp(&b.packet_id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_attention_trend(
        &self,
        granularity: TrendGranularity,
        range: Option<DateRange>,
    ) -> StoreResult<Vec<TrendBucket>> {
        struct Accumulator {
            count: u64,
            sum: u64,
            peak: u8,
            sources: HashMap<String, u64>,
        }

        let inner = self.inner.read();
        let mut buckets: BTreeMap<String, Accumulator> = BTreeMap::new();
        for (_, stored) in inner.arena.iter() {
            let metadata = &stored.packet.metadata;
            if let Some(ref range) = range {
                if !range.contains(metadata.capture_timestamp) {
                    continue;
                }
            }
            let key = Self::trend_bucket_key(metadata.capture_timestamp, granularity);
            let entry = buckets.entry(key).or_insert_with(|| Accumulator {
                count: 0,
                sum: 0,
                peak: 0,
                sources: HashMap::new(),
            });
            entry.count += 1;
            entry.sum += metadata.attention_score_raw as u64;
            entry.peak = entry.peak.max(metadata.attention_score_raw);
            *entry
                .sources
                .entry(metadata.capture_source.as_str().to_string())
                .or_insert(0) += 1;
        }
        drop(inner);

        Ok(buckets
            .into_iter()
            .map(|(bucket, acc)| TrendBucket {
                bucket,
                count: acc.count,
                avg_attention: acc.sum as f64 / acc.count as f64,
                peak_attention: acc.peak,
                source_counts: acc.sources,
            })
            .collect())
    }

    async fn rebuild_index(&self) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.rebuild();
        let count = inner.arena.len();
        drop(inner);

        tracing::info!(packets = count, "packet indexes rebuilt");
        Ok(())
    }

    async fn get_statistics(&self) -> StoreResult<PacketStatistics> {
        let inner = self.inner.read();
        let mut source_counts: HashMap<String, u64> = HashMap::new();
        let mut attachment_count = 0;
        for (_, stored) in inner.arena.iter() {
            *source_counts
                .entry(stored.packet.metadata.capture_source.as_str().to_string())
                .or_insert(0) += 1;
            attachment_count += stored.packet.payload.attachments.len();
        }
        Ok(PacketStatistics {
            packet_count: inner.arena.len(),
            user_count: inner.by_user.len(),
            source_counts,
            attachment_count,
        })
    }

    async fn batch(
        &self,
        operations: Vec<BatchOperation<Packet, PacketUpdate>>,
    ) -> StoreResult<BatchReport> {
        let mut outcomes = Vec::with_capacity(operations.len());
        for (index, operation) in operations.into_iter().enumerate() {
            let outcome = match operation {
                BatchOperation::Create { payload } => {
                    let id = payload.id();
                    match self.store(payload).await {
                        Ok(stored) => BatchOutcome::ok(index, stored.id()),
                        Err(err) => BatchOutcome::failed(index, Some(id), &err),
                    }
                }
                BatchOperation::Update { id, update } => match self.update(id, update).await {
                    Ok(_) => BatchOutcome::ok(index, id),
                    Err(err) => BatchOutcome::failed(index, Some(id), &err),
                },
                BatchOperation::Delete { id } => match self.delete(id).await {
                    Ok(()) => BatchOutcome::ok(index, id),
                    Err(err) => BatchOutcome::failed(index, Some(id), &err),
                },
            };
            outcomes.push(outcome);
        }
        Ok(BatchReport::from_outcomes(outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hinata_core::hinata::HinataCore;
    use hinata_core::packet::UserAction;
    use hinata_core::query::Pagination;

    fn packet(user: &str, highlight: &str, tags: &[&str]) -> Packet {
        Packet::new(
            CaptureSource::WebClipper,
            UserAction::Highlight,
            HinataCore::new(highlight, "https://example.com")
                .with_tags(tags.iter().map(|t| t.to_string()).collect()),
            user,
        )
    }

    #[tokio::test]
    async fn test_store_then_get_roundtrip() {
        let store = MemoryPacketStore::new();
        let original = packet("u1", "a highlight", &["ai"]);

        let stored = store.store(original.clone()).await.unwrap();
        assert_eq!(stored.created_at, stored.updated_at);

        let fetched = store.get(original.id()).await.unwrap().unwrap();
        assert_eq!(fetched.packet, original);
    }

    #[tokio::test]
    async fn test_duplicate_store_rejected() {
        let store = MemoryPacketStore::new();
        let original = packet("u1", "h", &[]);
        store.store(original.clone()).await.unwrap();

        let err = store.store(original).await.unwrap_err();
        assert_eq!(err.code(), "duplicate");
    }

    #[tokio::test]
    async fn test_invalid_packet_rejected_before_mutation() {
        let store = MemoryPacketStore::new();
        let bad = packet("u1", "", &[]);
        assert_eq!(store.store(bad).await.unwrap_err().code(), "validation_error");
        assert_eq!(store.get_statistics().await.unwrap().packet_count, 0);
    }

    #[tokio::test]
    async fn test_delete_prunes_every_index() {
        let store = MemoryPacketStore::new();
        let original = packet("u1", "unique highlight text", &["rust"]);
        let id = original.id();
        store.store(original).await.unwrap();

        store.delete(id).await.unwrap();

        assert!(store.get(id).await.unwrap().is_none());
        assert!(store.get_by_user("u1").await.unwrap().is_empty());
        assert!(store
            .get_by_source(CaptureSource::WebClipper)
            .await
            .unwrap()
            .is_empty());

        let inner = store.inner.read();
        assert!(inner.by_user.is_empty());
        assert!(inner.by_source.is_empty());
        assert!(inner.by_time_bucket.is_empty());
        assert!(inner.by_token.is_empty());
        assert!(inner.by_tag.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_reindexes() {
        let store = MemoryPacketStore::new();
        let original = packet("u1", "h", &["old"]);
        let id = original.id();
        store.store(original).await.unwrap();

        let update = PacketUpdate {
            tags: Some(vec!["new".to_string()]),
            note: Some("a note".to_string()),
            ..Default::default()
        };
        let updated = store.update(id, update).await.unwrap();

        assert_eq!(updated.packet.payload.core.highlight, "h");
        assert_eq!(updated.packet.payload.core.note, "a note");
        assert!(updated.updated_at > updated.created_at);

        let inner = store.inner.read();
        assert!(inner.by_tag.contains_key("new"));
        assert!(!inner.by_tag.contains_key("old"));
    }

    #[tokio::test]
    async fn test_update_revalidates_merged_result() {
        let store = MemoryPacketStore::new();
        let original = packet("u1", "h", &[]);
        let id = original.id();
        store.store(original).await.unwrap();

        let update = PacketUpdate {
            highlight: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            store.update(id, update).await.unwrap_err().code(),
            "validation_error"
        );

        // failed update leaves the stored packet untouched
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.packet.payload.core.highlight, "h");
    }

    #[tokio::test]
    async fn test_update_missing_packet() {
        let store = MemoryPacketStore::new();
        let err = store
            .update(Uuid::new_v4(), PacketUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_search_filters_text_and_aggregates() {
        let store = MemoryPacketStore::new();
        store
            .store(packet("u1", "rust borrow checker", &["rust"]).with_attention_score(80))
            .await
            .unwrap();
        store
            .store(packet("u1", "rust async runtime", &["rust"]).with_attention_score(40))
            .await
            .unwrap();
        store
            .store(packet("u2", "gardening tips", &["hobby"]).with_attention_score(20))
            .await
            .unwrap();

        let query = PacketQuery {
            text: Some("rust".to_string()),
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let results = store.search(query).await.unwrap();

        assert_eq!(results.page.total, 2);
        assert_eq!(results.aggregations.attention.min, 40);
        assert_eq!(results.aggregations.attention.max, 80);
        assert_eq!(results.aggregations.attention.avg, 60.0);
        assert_eq!(results.aggregations.attention.median, 60.0);
        assert_eq!(
            results.aggregations.source_counts.get("web_clipper"),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn test_search_aggregations_cover_pre_pagination_set() {
        let store = MemoryPacketStore::new();
        for i in 0..5u8 {
            store
                .store(packet("u1", &format!("note {i}"), &[]).with_attention_score(i * 10))
                .await
                .unwrap();
        }

        let query = PacketQuery {
            pagination: Pagination::first(2),
            ..Default::default()
        };
        let results = store.search(query).await.unwrap();

        assert_eq!(results.page.items.len(), 2);
        assert_eq!(results.page.total, 5);
        // aggregation sees all five, not just the page
        assert_eq!(results.aggregations.attention.max, 40);
        assert_eq!(results.aggregations.attention.min, 0);
    }

    #[tokio::test]
    async fn test_search_sorts_by_attention() {
        let store = MemoryPacketStore::new();
        store
            .store(packet("u1", "low", &[]).with_attention_score(10))
            .await
            .unwrap();
        store
            .store(packet("u1", "high", &[]).with_attention_score(90))
            .await
            .unwrap();

        let query = PacketQuery {
            sort_by: PacketSortField::AttentionScore,
            sort_direction: SortDirection::Descending,
            ..Default::default()
        };
        let results = store.search(query).await.unwrap();
        assert_eq!(results.page.items[0].packet.payload.core.highlight, "high");
    }

    #[tokio::test]
    async fn test_similar_packets_scored_and_ordered() {
        let store = MemoryPacketStore::new();
        let reference = packet("u1", "reference", &["ai", "rust"]);
        let close = packet("u1", "close", &["ai", "rust"]);
        let distant = Packet::new(
            CaptureSource::ManualInput,
            UserAction::Bookmark,
            HinataCore::new("far", "https://elsewhere.org"),
            "u9",
        );
        store.store(reference.clone()).await.unwrap();
        store.store(close.clone()).await.unwrap();
        store.store(distant.clone()).await.unwrap();

        let similar = store.get_similar(reference.id(), 0.5, 10).await.unwrap();

        // same source + action + user + full tag overlap = 1.0
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].packet_id, close.id());
        assert!((similar[0].score - 1.0).abs() < 1e-9);

        // lowering the threshold admits the distant packet at score 0.0
        let all = store.get_similar(reference.id(), 0.0, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].score >= all[1].score);
    }

    #[tokio::test]
    async fn test_attention_trend_buckets_by_day() {
        let store = MemoryPacketStore::new();
        let mut early = packet("u1", "early", &[]);
        early.metadata.capture_timestamp = "2026-03-01T08:00:00Z".parse().unwrap();
        early.metadata.attention_score_raw = 30;
        let mut late = packet("u1", "late", &[]);
        late.metadata.capture_timestamp = "2026-03-01T18:00:00Z".parse().unwrap();
        late.metadata.attention_score_raw = 70;
        let mut next_day = packet("u1", "next", &[]);
        next_day.metadata.capture_timestamp = "2026-03-02T09:00:00Z".parse().unwrap();
        next_day.metadata.attention_score_raw = 50;

        store.store(early).await.unwrap();
        store.store(late).await.unwrap();
        store.store(next_day).await.unwrap();

        let trend = store
            .get_attention_trend(TrendGranularity::Day, None)
            .await
            .unwrap();

        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].bucket, "2026-03-01");
        assert_eq!(trend[0].count, 2);
        assert_eq!(trend[0].avg_attention, 50.0);
        assert_eq!(trend[0].peak_attention, 70);
        assert_eq!(trend[1].bucket, "2026-03-02");
        assert_eq!(trend[0].source_counts.get("web_clipper"), Some(&2));
    }

    #[tokio::test]
    async fn test_rebuild_index_restores_lookups() {
        let store = MemoryPacketStore::new();
        let original = packet("u1", "indexed content", &["tagged"]);
        store.store(original).await.unwrap();

        // simulate suspected corruption
        {
            let mut inner = store.inner.write();
            inner.by_user.clear();
            inner.by_tag.clear();
        }
        assert!(store.get_by_user("u1").await.unwrap().is_empty());

        store.rebuild_index().await.unwrap();
        assert_eq!(store.get_by_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_is_best_effort() {
        let store = MemoryPacketStore::new();
        let good = packet("u1", "fine", &[]);
        let bad = packet("u1", "", &[]);
        let missing = Uuid::new_v4();

        let report = store
            .batch(vec![
                BatchOperation::Create {
                    payload: good.clone(),
                },
                BatchOperation::Create { payload: bad },
                BatchOperation::Delete { id: missing },
            ])
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.failed_indexes(), vec![1, 2]);
        assert_eq!(report.outcomes[1].code.as_deref(), Some("validation_error"));
        assert_eq!(report.outcomes[2].code.as_deref(), Some("not_found"));
        // the failing items did not abort the good one
        assert!(store.get(good.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_events_emitted_on_mutations() {
        let store = MemoryPacketStore::new();
        let mut rx = store.event_bus().subscribe();
        let original = packet("u1", "h", &[]);
        let id = original.id();

        store.store(original).await.unwrap();
        store.delete(id).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::PacketStored { packet_id: id }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent::PacketDeleted { packet_id: id }
        );
    }
}
