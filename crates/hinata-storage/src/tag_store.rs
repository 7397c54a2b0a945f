//! In-Memory Tag Store
//!
//! Owns the tag taxonomy: normalized unique names, synonyms, parent/child
//! hierarchy, usage accounting with recency-decayed weights, and the
//! recommendation and extraction heuristics. Standalone by design: the
//! co-occurrence adjacency that feeds recommendations is maintained here
//! from `use_tag` calls, not pulled from the relation store.
//!
//! Parent/child linkage has exactly one link and one unlink function;
//! every code path that re-parents goes through them, so the two sides of
//! the hierarchy cannot drift apart.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use hinata_core::batch::{BatchOperation, BatchOutcome, BatchReport};
use hinata_core::config::TagStoreConfig;
use hinata_core::error::{EntityKind, StoreError, StoreResult};
use hinata_core::events::{EventBus, StoreEvent};
use hinata_core::hinata::MAX_TAG_LEN;
use hinata_core::query::{Page, SortDirection};
use hinata_core::storage::TagStorage;
use hinata_core::tag::{
    normalize_tag_name, CreateTag, ExtractOptions, RecommendOptions, RecommendationSource, Tag,
    TagQuery, TagRecommendation, TagSortField, TagStatistics, TagType, TagUpdate, TagUsage,
    TagUsageMethod,
};

use crate::arena::{Arena, SlotId};
use crate::keywords;

/// Recency decay half-scale: one week in milliseconds.
const SEVEN_DAYS_MS: f64 = 7.0 * 24.0 * 60.0 * 60.0 * 1000.0;

/// Scores and confidences of the three recommendation candidate sets.
const CONTENT_MATCH_SCORE: f64 = 0.8;
const CONTENT_MATCH_CONFIDENCE: f64 = 0.7;
const POPULARITY_CONFIDENCE: f64 = 0.5;
const RELATED_SCORE: f64 = 0.6;
const RELATED_CONFIDENCE: f64 = 0.6;

/// The five fixed tags seeded at startup.
const SEED_TAGS: [(&str, &str); 5] = [
    ("important", "priority"),
    ("todo", "status"),
    ("done", "status"),
    ("draft", "status"),
    ("archived", "status"),
];

#[derive(Default)]
struct TagIndexes {
    arena: Arena<Tag>,
    by_id: HashMap<Uuid, SlotId>,
    /// Normalized names AND synonyms, all resolving to a tag id
    by_name: HashMap<String, Uuid>,
    usages: Vec<TagUsage>,
    usage_by_tag: HashMap<Uuid, Vec<usize>>,
    /// Tags applied to each item, in application order
    item_tags: HashMap<String, Vec<Uuid>>,
    /// Co-usage adjacency feeding the "related" recommendation set
    co_occurrence: HashMap<Uuid, HashMap<Uuid, u64>>,
    /// Seeded system tags, exempt from cleanup
    seeded: HashSet<Uuid>,
}

impl TagIndexes {
    fn slot_of(&self, id: Uuid) -> StoreResult<SlotId> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or_else(|| StoreError::not_found(EntityKind::Tag, id))
    }

    fn tag(&self, id: Uuid) -> StoreResult<Tag> {
        let slot = self.slot_of(id)?;
        self.arena
            .get(slot)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Tag, id))
    }

    /// The only path that attaches a child to a parent.
    fn link_parent(&mut self, child_id: Uuid, parent_id: Uuid) -> StoreResult<()> {
        let child_slot = self.slot_of(child_id)?;
        let parent_slot = self.slot_of(parent_id)?;
        if let Some(child) = self.arena.get_mut(child_slot) {
            child.parent_id = Some(parent_id);
        }
        if let Some(parent) = self.arena.get_mut(parent_slot) {
            if !parent.children.contains(&child_id) {
                parent.children.push(child_id);
            }
        }
        Ok(())
    }

    /// The only path that detaches a child from its parent.
    fn unlink_parent(&mut self, child_id: Uuid) -> StoreResult<()> {
        let child_slot = self.slot_of(child_id)?;
        let parent_id = match self.arena.get_mut(child_slot) {
            Some(child) => child.parent_id.take(),
            None => None,
        };
        if let Some(parent_id) = parent_id {
            if let Ok(parent_slot) = self.slot_of(parent_id) {
                if let Some(parent) = self.arena.get_mut(parent_slot) {
                    parent.children.retain(|id| *id != child_id);
                }
            }
        }
        Ok(())
    }

    /// Walk ancestors from `start`; true if `needle` appears.
    fn is_ancestor(&self, needle: Uuid, start: Uuid) -> bool {
        let mut current = Some(start);
        while let Some(id) = current {
            if id == needle {
                return true;
            }
            current = self
                .slot_of(id)
                .ok()
                .and_then(|slot| self.arena.get(slot))
                .and_then(|tag| tag.parent_id);
        }
        false
    }

    /// Create a tag or resolve to the existing one. Returns the tag and
    /// whether it was newly created.
    fn create_or_resolve(&mut self, request: CreateTag) -> StoreResult<(Tag, bool)> {
        let normalized = normalize_tag_name(&request.name);
        if normalized.is_empty() {
            return Err(StoreError::validation("name", "must not be empty"));
        }
        if normalized.chars().count() > MAX_TAG_LEN {
            return Err(StoreError::validation(
                "name",
                format!("exceeds {MAX_TAG_LEN} characters"),
            ));
        }

        // an existing name or synonym resolves instead of duplicating
        if let Some(existing_id) = self.by_name.get(&normalized).copied() {
            return Ok((self.tag(existing_id)?, false));
        }

        let mut synonyms: Vec<String> = Vec::new();
        for raw in &request.synonyms {
            let synonym = normalize_tag_name(raw);
            if synonym.is_empty() || synonym == normalized || synonyms.contains(&synonym) {
                continue;
            }
            if self.by_name.contains_key(&synonym) {
                return Err(StoreError::consistency(format!(
                    "synonym '{synonym}' already resolves to another tag"
                )));
            }
            synonyms.push(synonym);
        }

        if let Some(parent_id) = request.parent_id {
            // resolved before insertion so a bad parent leaves no trace
            self.slot_of(parent_id)?;
        }

        let tag = Tag {
            id: Uuid::new_v4(),
            name: normalized.clone(),
            display_name: request.name.trim().to_string(),
            tag_type: request.tag_type,
            category: request.category,
            usage_count: 0,
            weight: 0.0,
            parent_id: None,
            children: Vec::new(),
            synonyms: synonyms.clone(),
            expires_at: None,
            created_at: Utc::now(),
            last_used: None,
        };
        let id = tag.id;
        let slot = self.arena.insert(tag.clone());
        self.by_id.insert(id, slot);
        self.by_name.insert(normalized, id);
        for synonym in synonyms {
            self.by_name.insert(synonym, id);
        }
        if let Some(parent_id) = request.parent_id {
            self.link_parent(id, parent_id)?;
        }
        self.tag(id).map(|tag| (tag, true))
    }

    /// Fully detach and remove a tag: name table, hierarchy (children are
    /// re-parented to the removed tag's parent), item lists, and the
    /// co-occurrence adjacency. Usage records stay; they are history.
    fn remove_tag(&mut self, id: Uuid) -> StoreResult<Tag> {
        let tag = self.tag(id)?;

        self.by_name.remove(&tag.name);
        for synonym in &tag.synonyms {
            self.by_name.remove(synonym);
        }

        let grandparent = tag.parent_id;
        self.unlink_parent(id)?;
        for child_id in tag.children.clone() {
            self.unlink_parent(child_id)?;
            if let Some(grandparent) = grandparent {
                self.link_parent(child_id, grandparent)?;
            }
        }

        for tags in self.item_tags.values_mut() {
            tags.retain(|tag_id| *tag_id != id);
        }
        self.item_tags.retain(|_, tags| !tags.is_empty());
        self.co_occurrence.remove(&id);
        for neighbors in self.co_occurrence.values_mut() {
            neighbors.remove(&id);
        }

        let slot = self.slot_of(id)?;
        self.by_id.remove(&id);
        self.seeded.remove(&id);
        self.arena
            .remove(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Tag, id))
    }
}

/// In-memory [`TagStorage`] implementation.
pub struct MemoryTagStore {
    inner: RwLock<TagIndexes>,
    config: TagStoreConfig,
    events: EventBus,
}

impl MemoryTagStore {
    pub fn new(config: TagStoreConfig) -> Self {
        Self::with_event_bus(config, EventBus::default())
    }

    pub fn with_event_bus(config: TagStoreConfig, events: EventBus) -> Self {
        let store = Self {
            inner: RwLock::new(TagIndexes::default()),
            config,
            events,
        };
        if store.config.seed_system_tags {
            store.seed();
        }
        store
    }

    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    /// Idempotently seed the fixed status/priority tags.
    fn seed(&self) {
        let mut inner = self.inner.write();
        for (name, category) in SEED_TAGS {
            let request = CreateTag::new(name)
                .with_type(TagType::System)
                .with_category(category);
            match inner.create_or_resolve(request) {
                Ok((tag, created)) => {
                    inner.seeded.insert(tag.id);
                    if created {
                        tracing::debug!(tag = name, "system tag seeded");
                    }
                }
                Err(err) => tracing::warn!(tag = name, %err, "system tag seeding failed"),
            }
        }
    }

    /// `ln(usage + 1) / 10`, decayed by time since the previous use.
    fn weight(usage_count: u64, age_ms: f64) -> f64 {
        let base = ((usage_count + 1) as f64).ln() / 10.0;
        let recency_decay = 1.0 / (1.0 + age_ms / SEVEN_DAYS_MS);
        base * recency_decay
    }
}

impl Default for MemoryTagStore {
    fn default() -> Self {
        Self::new(TagStoreConfig::default())
    }
}

#[async_trait]
impl TagStorage for MemoryTagStore {
    async fn create(&self, request: CreateTag) -> StoreResult<Tag> {
        let mut inner = self.inner.write();
        let (tag, created) = inner.create_or_resolve(request)?;
        drop(inner);

        if created {
            tracing::debug!(tag_id = %tag.id, name = %tag.name, "tag created");
            self.events.emit(StoreEvent::TagCreated {
                tag_id: tag.id,
                name: tag.name.clone(),
            });
        }
        Ok(tag)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Tag>> {
        let inner = self.inner.read();
        Ok(inner.tag(id).ok())
    }

    async fn resolve(&self, name: &str) -> StoreResult<Option<Uuid>> {
        let inner = self.inner.read();
        Ok(inner.by_name.get(&normalize_tag_name(name)).copied())
    }

    async fn update(&self, id: Uuid, update: TagUpdate) -> StoreResult<Tag> {
        let mut inner = self.inner.write();
        let slot = inner.slot_of(id)?;
        let tag = inner
            .arena
            .get_mut(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Tag, id))?;

        if let Some(display_name) = update.display_name {
            tag.display_name = display_name;
        }
        if let Some(category) = update.category {
            tag.category = category;
        }
        Ok(tag.clone())
    }

    async fn query(&self, query: TagQuery) -> StoreResult<Page<Tag>> {
        let inner = self.inner.read();
        let pattern = query.name_pattern.as_deref().map(normalize_tag_name);
        let mut matched: Vec<Tag> = inner
            .arena
            .iter()
            .filter(|(_, tag)| {
                if let Some(ref pattern) = pattern {
                    if !tag.name.contains(pattern.as_str()) {
                        return false;
                    }
                }
                if let Some(tag_type) = query.tag_type {
                    if tag.tag_type != tag_type {
                        return false;
                    }
                }
                if let Some(ref category) = query.category {
                    if &tag.category != category {
                        return false;
                    }
                }
                if let Some(parent_id) = query.parent_id {
                    if tag.parent_id != Some(parent_id) {
                        return false;
                    }
                }
                if let Some(min_usage) = query.min_usage {
                    if tag.usage_count < min_usage {
                        return false;
                    }
                }
                true
            })
            .map(|(_, tag)| tag.clone())
            .collect();
        drop(inner);

        matched.sort_by(|a, b| {
            let ordering = match query.sort_by {
                TagSortField::Name => a.name.cmp(&b.name),
                TagSortField::UsageCount => a.usage_count.cmp(&b.usage_count),
                TagSortField::Weight => a
                    .weight
                    .partial_cmp(&b.weight)
                    .unwrap_or(std::cmp::Ordering::Equal),
            };
            let ordering = match query.sort_direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            };
            ordering.then_with(|| a.name.cmp(&b.name))
        });
        Ok(Page::slice(matched, query.pagination))
    }

    async fn add_synonym(&self, tag_id: Uuid, synonym: &str) -> StoreResult<Tag> {
        let normalized = normalize_tag_name(synonym);
        if normalized.is_empty() {
            return Err(StoreError::validation("synonym", "must not be empty"));
        }

        let mut inner = self.inner.write();
        let slot = inner.slot_of(tag_id)?;
        match inner.by_name.get(&normalized) {
            Some(existing) if *existing == tag_id => {
                // already resolves here; nothing to do
                return inner.tag(tag_id);
            }
            Some(_) => {
                return Err(StoreError::consistency(format!(
                    "synonym '{normalized}' already resolves to another tag"
                )));
            }
            None => {}
        }

        inner.by_name.insert(normalized.clone(), tag_id);
        let tag = inner
            .arena
            .get_mut(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Tag, tag_id))?;
        tag.synonyms.push(normalized);
        Ok(tag.clone())
    }

    async fn set_parent(&self, tag_id: Uuid, parent_id: Option<Uuid>) -> StoreResult<Tag> {
        let mut inner = self.inner.write();
        inner.slot_of(tag_id)?;

        if let Some(parent_id) = parent_id {
            if parent_id == tag_id || inner.is_ancestor(tag_id, parent_id) {
                return Err(StoreError::consistency(
                    "re-parenting would create a hierarchy cycle",
                ));
            }
            inner.slot_of(parent_id)?;
        }

        inner.unlink_parent(tag_id)?;
        if let Some(parent_id) = parent_id {
            inner.link_parent(tag_id, parent_id)?;
        }
        inner.tag(tag_id)
    }

    async fn use_tag(
        &self,
        tag_id: Uuid,
        item_id: &str,
        method: TagUsageMethod,
    ) -> StoreResult<Tag> {
        let mut inner = self.inner.write();
        let slot = inner.slot_of(tag_id)?;
        let now = Utc::now();

        let updated = {
            let tag = inner
                .arena
                .get_mut(slot)
                .ok_or_else(|| StoreError::not_found(EntityKind::Tag, tag_id))?;
            // decay measures from the previous use; first use from creation
            let age_ms = (now - tag.last_used.unwrap_or(tag.created_at))
                .num_milliseconds()
                .max(0) as f64;
            tag.usage_count += 1;
            tag.last_used = Some(now);
            tag.weight = Self::weight(tag.usage_count, age_ms);
            tag.clone()
        };

        let usage_index = inner.usages.len();
        inner.usages.push(TagUsage {
            tag_id,
            item_id: item_id.to_string(),
            method,
            used_at: now,
        });
        inner
            .usage_by_tag
            .entry(tag_id)
            .or_default()
            .push(usage_index);

        // first application to this item feeds the co-occurrence adjacency
        let applied = inner.item_tags.entry(item_id.to_string()).or_default();
        if !applied.contains(&tag_id) {
            let others: Vec<Uuid> = applied.clone();
            applied.push(tag_id);
            for other in others {
                *inner
                    .co_occurrence
                    .entry(tag_id)
                    .or_default()
                    .entry(other)
                    .or_insert(0) += 1;
                *inner
                    .co_occurrence
                    .entry(other)
                    .or_default()
                    .entry(tag_id)
                    .or_insert(0) += 1;
            }
        }
        drop(inner);

        self.events.emit(StoreEvent::TagUsed {
            tag_id,
            item_id: item_id.to_string(),
        });
        Ok(updated)
    }

    async fn get_usage(&self, tag_id: Uuid) -> StoreResult<Vec<TagUsage>> {
        let inner = self.inner.read();
        inner.slot_of(tag_id)?;
        Ok(inner
            .usage_by_tag
            .get(&tag_id)
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|index| inner.usages.get(*index))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recommend(
        &self,
        item_id: &str,
        content: &str,
        existing_tags: &[Uuid],
        options: RecommendOptions,
    ) -> StoreResult<Vec<TagRecommendation>> {
        let inner = self.inner.read();

        let mut excluded: HashSet<Uuid> = existing_tags.iter().copied().collect();
        if let Some(applied) = inner.item_tags.get(item_id) {
            excluded.extend(applied.iter().copied());
        }

        let mut best: HashMap<Uuid, TagRecommendation> = HashMap::new();
        let mut consider = |candidate: TagRecommendation,
                            best: &mut HashMap<Uuid, TagRecommendation>| {
            best.entry(candidate.tag_id)
                .and_modify(|current| {
                    if candidate.score > current.score {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate);
        };

        // 1. content keyword match
        for (term, _) in keywords::extract_terms(content) {
            if let Some(tag_id) = inner.by_name.get(&term).copied() {
                if excluded.contains(&tag_id) {
                    continue;
                }
                if let Ok(tag) = inner.tag(tag_id) {
                    consider(
                        TagRecommendation {
                            tag_id,
                            name: tag.name,
                            score: CONTENT_MATCH_SCORE,
                            confidence: CONTENT_MATCH_CONFIDENCE,
                            source: RecommendationSource::ContentMatch,
                        },
                        &mut best,
                    );
                }
            }
        }

        // 2. co-occurrence neighbors of the existing tags
        for existing in &excluded {
            if let Some(neighbors) = inner.co_occurrence.get(existing) {
                for neighbor in neighbors.keys() {
                    if excluded.contains(neighbor) {
                        continue;
                    }
                    if let Ok(tag) = inner.tag(*neighbor) {
                        consider(
                            TagRecommendation {
                                tag_id: *neighbor,
                                name: tag.name,
                                score: RELATED_SCORE,
                                confidence: RELATED_CONFIDENCE,
                                source: RecommendationSource::Related,
                            },
                            &mut best,
                        );
                    }
                }
            }
        }

        // 3. global popularity among tags not already applied
        for (_, tag) in inner.arena.iter() {
            if excluded.contains(&tag.id) {
                continue;
            }
            consider(
                TagRecommendation {
                    tag_id: tag.id,
                    name: tag.name.clone(),
                    score: tag.weight,
                    confidence: POPULARITY_CONFIDENCE,
                    source: RecommendationSource::Popularity,
                },
                &mut best,
            );
        }
        drop(inner);

        let mut ranked: Vec<TagRecommendation> = best
            .into_values()
            .filter(|candidate| candidate.confidence >= options.min_confidence)
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        ranked.truncate(options.limit);
        Ok(ranked)
    }

    async fn extract(&self, content: &str, options: ExtractOptions) -> StoreResult<Vec<Tag>> {
        let expiry = Utc::now() + Duration::seconds(self.config.ai_tag_expiry_secs as i64);
        let mut extracted: Vec<Tag> = Vec::new();
        let mut created_events: Vec<(Uuid, String)> = Vec::new();

        let mut inner = self.inner.write();
        for (term, frequency) in keywords::extract_terms(content) {
            if extracted.len() >= options.max_tags {
                break;
            }
            if term.chars().count() > MAX_TAG_LEN {
                continue;
            }
            let confidence = (0.3 + 0.1 * frequency as f64).min(0.9);
            if confidence < options.min_confidence {
                continue;
            }

            if let Some(existing_id) = inner.by_name.get(&term).copied() {
                extracted.push(inner.tag(existing_id)?);
                continue;
            }

            let request = CreateTag::new(&term)
                .with_type(TagType::AiExtracted)
                .with_category("auto");
            let (tag, created) = inner.create_or_resolve(request)?;
            if created {
                let slot = inner.slot_of(tag.id)?;
                if let Some(stored) = inner.arena.get_mut(slot) {
                    stored.expires_at = Some(expiry);
                }
                created_events.push((tag.id, tag.name.clone()));
            }
            extracted.push(inner.tag(tag.id)?);
        }
        drop(inner);

        for (tag_id, name) in created_events {
            tracing::debug!(tag_id = %tag_id, name = %name, "ai tag extracted");
            self.events.emit(StoreEvent::TagCreated { tag_id, name });
        }
        Ok(extracted)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.remove_tag(id)?;
        drop(inner);

        tracing::debug!(tag_id = %id, "tag deleted");
        self.events.emit(StoreEvent::TagDeleted { tag_id: id });
        Ok(())
    }

    async fn get_popular(&self, limit: usize) -> StoreResult<Vec<Tag>> {
        let inner = self.inner.read();
        let mut tags: Vec<Tag> = inner.arena.iter().map(|(_, tag)| tag.clone()).collect();
        drop(inner);

        tags.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.usage_count.cmp(&a.usage_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        tags.truncate(limit);
        Ok(tags)
    }

    async fn cleanup(&self) -> StoreResult<usize> {
        let now = Utc::now();
        let system_cutoff = now - Duration::seconds(self.config.unused_system_tag_ttl_secs as i64);

        let is_expired = |tag: &Tag, seeded: &HashSet<Uuid>| -> bool {
            match tag.tag_type {
                TagType::AiExtracted => tag
                    .expires_at
                    .map(|expires_at| expires_at < now)
                    .unwrap_or(false),
                TagType::System => {
                    !seeded.contains(&tag.id)
                        && tag.usage_count == 0
                        && tag.created_at < system_cutoff
                }
                _ => false,
            }
        };

        // snapshot candidates under a short read lock
        let candidates: Vec<Uuid> = {
            let inner = self.inner.read();
            inner
                .arena
                .iter()
                .filter(|(_, tag)| is_expired(tag, &inner.seeded))
                .map(|(_, tag)| tag.id)
                .collect()
        };

        // remove one at a time, re-checking eligibility under the write lock
        let mut removed = 0;
        for id in candidates {
            let mut inner = self.inner.write();
            let still_expired = inner
                .tag(id)
                .map(|tag| is_expired(&tag, &inner.seeded))
                .unwrap_or(false);
            if !still_expired {
                continue;
            }
            if inner.remove_tag(id).is_ok() {
                removed += 1;
                drop(inner);
                self.events.emit(StoreEvent::TagDeleted { tag_id: id });
            }
        }

        if removed > 0 {
            tracing::info!(removed, "expired tags swept");
        }
        Ok(removed)
    }

    async fn get_statistics(&self) -> StoreResult<TagStatistics> {
        let inner = self.inner.read();
        let mut type_counts: HashMap<String, u64> = HashMap::new();
        let mut total_usage = 0;
        let mut synonym_count = 0;
        for (_, tag) in inner.arena.iter() {
            *type_counts
                .entry(tag.tag_type.as_str().to_string())
                .or_insert(0) += 1;
            total_usage += tag.usage_count;
            synonym_count += tag.synonyms.len();
        }
        Ok(TagStatistics {
            tag_count: inner.arena.len(),
            type_counts,
            total_usage,
            synonym_count,
        })
    }

    async fn batch(
        &self,
        operations: Vec<BatchOperation<CreateTag, TagUpdate>>,
    ) -> StoreResult<BatchReport> {
        let mut outcomes = Vec::with_capacity(operations.len());
        for (index, operation) in operations.into_iter().enumerate() {
            let outcome = match operation {
                BatchOperation::Create { payload } => match self.create(payload).await {
                    Ok(tag) => BatchOutcome::ok(index, tag.id),
                    Err(err) => BatchOutcome::failed(index, None, &err),
                },
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

    fn bare_store() -> MemoryTagStore {
        MemoryTagStore::new(TagStoreConfig {
            seed_system_tags: false,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_create_normalizes_and_dedupes() {
        let store = bare_store();
        let first = store.create(CreateTag::new("Foo Bar")).await.unwrap();
        let second = store.create(CreateTag::new("foo_bar")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "foo_bar");
        assert_eq!(first.display_name, "Foo Bar");
        assert_eq!(store.get_statistics().await.unwrap().tag_count, 1);
    }

    #[tokio::test]
    async fn test_synonym_resolves_to_same_tag() {
        let store = bare_store();
        let tag = store
            .create(CreateTag::new("machine learning").with_synonyms(vec!["ML".to_string()]))
            .await
            .unwrap();

        assert_eq!(store.resolve("ml").await.unwrap(), Some(tag.id));
        assert_eq!(store.resolve("Machine  Learning").await.unwrap(), Some(tag.id));

        // creating by the synonym resolves instead of duplicating
        let via_synonym = store.create(CreateTag::new("ML")).await.unwrap();
        assert_eq!(via_synonym.id, tag.id);
    }

    #[tokio::test]
    async fn test_synonym_conflict_rejected() {
        let store = bare_store();
        let first = store.create(CreateTag::new("alpha")).await.unwrap();
        store.create(CreateTag::new("beta")).await.unwrap();

        let err = store.add_synonym(first.id, "beta").await.unwrap_err();
        assert_eq!(err.code(), "consistency_error");
    }

    #[tokio::test]
    async fn test_hierarchy_stays_consistent() {
        let store = bare_store();
        let parent = store.create(CreateTag::new("parent")).await.unwrap();
        let child = store
            .create(CreateTag::new("child").with_parent(parent.id))
            .await
            .unwrap();

        assert_eq!(child.parent_id, Some(parent.id));
        let parent = store.get(parent.id).await.unwrap().unwrap();
        assert_eq!(parent.children, vec![child.id]);

        // re-parent to root
        let child = store.set_parent(child.id, None).await.unwrap();
        assert_eq!(child.parent_id, None);
        let parent = store.get(parent.id).await.unwrap().unwrap();
        assert!(parent.children.is_empty());
    }

    #[tokio::test]
    async fn test_reparent_cycle_rejected() {
        let store = bare_store();
        let a = store.create(CreateTag::new("a")).await.unwrap();
        let b = store
            .create(CreateTag::new("b").with_parent(a.id))
            .await
            .unwrap();

        let err = store.set_parent(a.id, Some(b.id)).await.unwrap_err();
        assert_eq!(err.code(), "consistency_error");

        let err = store.set_parent(a.id, Some(a.id)).await.unwrap_err();
        assert_eq!(err.code(), "consistency_error");
    }

    #[tokio::test]
    async fn test_use_tag_updates_usage_and_weight() {
        let store = bare_store();
        let tag = store.create(CreateTag::new("rust")).await.unwrap();
        assert_eq!(tag.usage_count, 0);
        assert_eq!(tag.weight, 0.0);

        let used = store
            .use_tag(tag.id, "item-1", TagUsageMethod::Manual)
            .await
            .unwrap();

        assert_eq!(used.usage_count, 1);
        assert!(used.last_used.is_some());
        // fresh use: decay ~1, weight ~ ln(2) / 10
        assert!((used.weight - (2.0f64).ln() / 10.0).abs() < 0.01);

        let usage = store.get_usage(tag.id).await.unwrap();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].item_id, "item-1");
        assert_eq!(usage[0].method, TagUsageMethod::Manual);
    }

    #[tokio::test]
    async fn test_shared_usage_count_across_aliases() {
        let store = bare_store();
        let first = store.create(CreateTag::new("project")).await.unwrap();
        let second = store.create(CreateTag::new("Project ")).await.unwrap();
        assert_eq!(first.id, second.id);

        store
            .use_tag(first.id, "item-1", TagUsageMethod::Manual)
            .await
            .unwrap();
        store
            .use_tag(second.id, "item-2", TagUsageMethod::Manual)
            .await
            .unwrap();

        let page = store
            .query(TagQuery {
                name_pattern: Some("project".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].usage_count, 2);
    }

    #[tokio::test]
    async fn test_recommend_merges_three_sources() {
        let store = bare_store();
        let rust = store.create(CreateTag::new("rust")).await.unwrap();
        let async_tag = store.create(CreateTag::new("asynchronous")).await.unwrap();
        let tokio_tag = store.create(CreateTag::new("tokio")).await.unwrap();

        // co-usage links rust <-> tokio
        store
            .use_tag(rust.id, "shared-item", TagUsageMethod::Manual)
            .await
            .unwrap();
        store
            .use_tag(tokio_tag.id, "shared-item", TagUsageMethod::Manual)
            .await
            .unwrap();

        let recommendations = store
            .recommend(
                "new-item",
                "notes about asynchronous runtimes",
                &[rust.id],
                RecommendOptions::default(),
            )
            .await
            .unwrap();

        // content match outranks the related candidate
        assert_eq!(recommendations[0].tag_id, async_tag.id);
        assert_eq!(recommendations[0].score, CONTENT_MATCH_SCORE);
        assert_eq!(recommendations[0].source, RecommendationSource::ContentMatch);

        let tokio_rec = recommendations
            .iter()
            .find(|r| r.tag_id == tokio_tag.id)
            .unwrap();
        assert_eq!(tokio_rec.source, RecommendationSource::Related);
        assert_eq!(tokio_rec.score, RELATED_SCORE);

        // the excluded tag never appears
        assert!(recommendations.iter().all(|r| r.tag_id != rust.id));
        // strictly descending
        for pair in recommendations.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_recommend_min_confidence_filters_popularity() {
        let store = bare_store();
        store.create(CreateTag::new("quiet")).await.unwrap();

        let recommendations = store
            .recommend(
                "item",
                "",
                &[],
                RecommendOptions {
                    limit: 10,
                    min_confidence: 0.6,
                },
            )
            .await
            .unwrap();
        // popularity candidates carry confidence 0.5 and are filtered out
        assert!(recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_extract_materializes_expiring_ai_tags() {
        let store = bare_store();
        let extracted = store
            .extract(
                "borrow checker borrow checker lifetimes",
                ExtractOptions::default(),
            )
            .await
            .unwrap();

        // "borrow" and "checker" (2x) rank before "lifetimes" (1x)
        assert_eq!(extracted.len(), 3);
        assert_eq!(extracted[0].name, "borrow");
        assert_eq!(extracted[0].tag_type, TagType::AiExtracted);
        assert!(extracted[0].expires_at.is_some());

        // extraction is idempotent: existing tags are reused
        let again = store
            .extract("borrow checker", ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(again[0].id, extracted[0].id);
        assert_eq!(store.get_statistics().await.unwrap().tag_count, 3);
    }

    #[tokio::test]
    async fn test_extract_respects_limits() {
        let store = bare_store();
        let extracted = store
            .extract(
                "alpha beta gamma delta epsilon",
                ExtractOptions {
                    max_tags: 2,
                    min_confidence: 0.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(extracted.len(), 2);

        let none = store
            .extract(
                "solo",
                ExtractOptions {
                    max_tags: 5,
                    min_confidence: 0.95,
                },
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_seeded_tags_idempotent_and_exempt_from_cleanup() {
        let config = TagStoreConfig {
            unused_system_tag_ttl_secs: 0,
            ..Default::default()
        };
        let store = MemoryTagStore::new(config.clone());
        assert_eq!(store.get_statistics().await.unwrap().tag_count, 5);
        assert!(store.resolve("important").await.unwrap().is_some());
        assert!(store.resolve("archived").await.unwrap().is_some());

        // seeding again creates nothing new
        store.seed();
        assert_eq!(store.get_statistics().await.unwrap().tag_count, 5);

        // zero TTL would expire any unseeded system tag, but seeds survive
        let removed = store.cleanup().await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.get_statistics().await.unwrap().tag_count, 5);
    }

    #[tokio::test]
    async fn test_cleanup_removes_expired_ai_and_stale_system_tags() {
        let store = MemoryTagStore::new(TagStoreConfig {
            seed_system_tags: false,
            unused_system_tag_ttl_secs: 60,
            ..Default::default()
        });
        let ai = store
            .create(CreateTag::new("ephemeral").with_type(TagType::AiExtracted))
            .await
            .unwrap();
        let stale_system = store
            .create(CreateTag::new("stale").with_type(TagType::System))
            .await
            .unwrap();
        let user = store.create(CreateTag::new("keeper")).await.unwrap();

        {
            let mut inner = store.inner.write();
            let past = Utc::now() - Duration::seconds(120);
            let slots: Vec<SlotId> = inner.arena.iter().map(|(slot, _)| slot).collect();
            for slot in slots {
                if let Some(tag) = inner.arena.get_mut(slot) {
                    tag.created_at = past;
                    if tag.tag_type == TagType::AiExtracted {
                        tag.expires_at = Some(past);
                    }
                }
            }
        }

        let removed = store.cleanup().await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get(ai.id).await.unwrap().is_none());
        assert!(store.get(stale_system.id).await.unwrap().is_none());
        assert!(store.get(user.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_reparents_children_and_clears_names() {
        let store = bare_store();
        let root = store.create(CreateTag::new("root")).await.unwrap();
        let middle = store
            .create(
                CreateTag::new("middle")
                    .with_parent(root.id)
                    .with_synonyms(vec!["mid".to_string()]),
            )
            .await
            .unwrap();
        let leaf = store
            .create(CreateTag::new("leaf").with_parent(middle.id))
            .await
            .unwrap();

        store.delete(middle.id).await.unwrap();

        // child climbed to the grandparent
        let leaf = store.get(leaf.id).await.unwrap().unwrap();
        assert_eq!(leaf.parent_id, Some(root.id));
        let root = store.get(root.id).await.unwrap().unwrap();
        assert_eq!(root.children, vec![leaf.id]);

        // name and synonym are free again
        assert!(store.resolve("middle").await.unwrap().is_none());
        assert!(store.resolve("mid").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_popular_ranks_by_weight() {
        let store = bare_store();
        let busy = store.create(CreateTag::new("busy")).await.unwrap();
        let idle = store.create(CreateTag::new("idle")).await.unwrap();
        for i in 0..5 {
            store
                .use_tag(busy.id, &format!("item-{i}"), TagUsageMethod::Manual)
                .await
                .unwrap();
        }

        let popular = store.get_popular(10).await.unwrap();
        assert_eq!(popular[0].id, busy.id);
        assert_eq!(popular[1].id, idle.id);
        assert!(popular[0].weight > popular[1].weight);
    }
}
