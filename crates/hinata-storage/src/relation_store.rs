//! In-Memory Relation Store
//!
//! Owns the generic relation graph: typed, weighted, optionally
//! bidirectional edges between opaque item ids. Endpoints are untyped
//! keys; the store never checks them against the packet or block stores.
//!
//! Creating a relation that already exists as a `(source, target, type)`
//! triple updates the stored strength instead of inserting a duplicate.
//! Derivation of additional lower-confidence edges is a pluggable
//! strategy; the default derives nothing.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use hinata_core::batch::{BatchOperation, BatchOutcome, BatchReport};
use hinata_core::config::RelationStoreConfig;
use hinata_core::error::{EntityKind, StoreError, StoreResult};
use hinata_core::events::{EventBus, StoreEvent};
use hinata_core::relation::{
    CreateRelation, GraphEdge, GraphNode, KnowledgeGraph, RelatedItem, Relation, RelationOrigin,
    RelationQuery, RelationStatistics, RelationType, RelationUpdate,
};
use hinata_core::storage::RelationStorage;

use crate::arena::{Arena, SlotId};

/// Fixed decay applied to second-degree recommendation scores.
const SECOND_DEGREE_DECAY: f64 = 0.7;

/// Hook invoked after each created relation to synthesize additional
/// lower-confidence edges. Derived relations are forced to
/// [`RelationOrigin::System`] and do not trigger further derivation.
pub trait DerivationStrategy: Send + Sync {
    fn derive(&self, relation: &Relation) -> Vec<CreateRelation>;
}

/// Default strategy: derive nothing.
pub struct NoDerivation;

impl DerivationStrategy for NoDerivation {
    fn derive(&self, _relation: &Relation) -> Vec<CreateRelation> {
        Vec::new()
    }
}

#[derive(Default)]
struct RelationIndexes {
    arena: Arena<Relation>,
    by_id: HashMap<Uuid, SlotId>,
    by_source: HashMap<Uuid, Vec<SlotId>>,
    by_target: HashMap<Uuid, Vec<SlotId>>,
    by_type: HashMap<RelationType, Vec<SlotId>>,
    by_triple: HashMap<(Uuid, Uuid, RelationType), SlotId>,
}

impl RelationIndexes {
    fn index(&mut self, slot: SlotId, relation: &Relation) {
        self.by_id.insert(relation.id, slot);
        self.by_source
            .entry(relation.source_id)
            .or_default()
            .push(slot);
        self.by_target
            .entry(relation.target_id)
            .or_default()
            .push(slot);
        self.by_type
            .entry(relation.relation_type)
            .or_default()
            .push(slot);
        self.by_triple.insert(
            (relation.source_id, relation.target_id, relation.relation_type),
            slot,
        );
    }

    fn unindex(&mut self, slot: SlotId, relation: &Relation) {
        self.by_id.remove(&relation.id);
        prune(&mut self.by_source, &relation.source_id, slot);
        prune(&mut self.by_target, &relation.target_id, slot);
        prune(&mut self.by_type, &relation.relation_type, slot);
        self.by_triple.remove(&(
            relation.source_id,
            relation.target_id,
            relation.relation_type,
        ));
    }

    /// Edges usable from `item`'s perspective: outgoing, plus incoming
    /// where bidirectional.
    fn edges_of(&self, item: Uuid) -> Vec<(SlotId, Relation)> {
        let mut edges: Vec<(SlotId, Relation)> = Vec::new();
        if let Some(slots) = self.by_source.get(&item) {
            for slot in slots {
                if let Some(relation) = self.arena.get(*slot) {
                    edges.push((*slot, relation.clone()));
                }
            }
        }
        if let Some(slots) = self.by_target.get(&item) {
            for slot in slots {
                if let Some(relation) = self.arena.get(*slot) {
                    if relation.bidirectional {
                        edges.push((*slot, relation.clone()));
                    }
                }
            }
        }
        edges
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

fn validate_strength(strength: f64) -> StoreResult<()> {
    if !strength.is_finite() || !(0.0..=1.0).contains(&strength) {
        return Err(StoreError::validation(
            "strength",
            "must be a finite value in [0, 1]",
        ));
    }
    Ok(())
}

/// In-memory [`RelationStorage`] implementation.
pub struct MemoryRelationStore {
    inner: RwLock<RelationIndexes>,
    config: RelationStoreConfig,
    derivation: Box<dyn DerivationStrategy>,
    events: EventBus,
}

impl MemoryRelationStore {
    pub fn new(config: RelationStoreConfig) -> Self {
        Self::with_event_bus(config, EventBus::default())
    }

    pub fn with_event_bus(config: RelationStoreConfig, events: EventBus) -> Self {
        Self {
            inner: RwLock::new(RelationIndexes::default()),
            config,
            derivation: Box::new(NoDerivation),
            events,
        }
    }

    /// Replace the derivation hook. Only consulted when
    /// `derivation_enabled` is set in the config.
    #[must_use]
    pub fn with_derivation(mut self, strategy: Box<dyn DerivationStrategy>) -> Self {
        self.derivation = strategy;
        self
    }

    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    /// Insert one relation, assuming validation already ran. Returns the
    /// stored relation and whether it replaced an existing triple.
    fn insert_or_merge(
        inner: &mut RelationIndexes,
        request: CreateRelation,
    ) -> (Relation, bool) {
        let triple = (request.source_id, request.target_id, request.relation_type);
        if let Some(slot) = inner.by_triple.get(&triple).copied() {
            if let Some(existing) = inner.arena.get_mut(slot) {
                // the new strength wins; everything else keeps its history
                existing.strength = request.strength;
                existing.metadata = request.metadata;
                return (existing.clone(), true);
            }
        }

        let now = Utc::now();
        let relation = Relation {
            id: Uuid::new_v4(),
            source_id: request.source_id,
            target_id: request.target_id,
            relation_type: request.relation_type,
            strength: request.strength,
            bidirectional: request.bidirectional,
            origin: request.origin,
            metadata: request.metadata,
            access_count: 0,
            last_accessed: now,
            created_at: now,
        };
        let slot = inner.arena.insert(relation.clone());
        inner.index(slot, &relation);
        (relation, false)
    }
}

impl Default for MemoryRelationStore {
    fn default() -> Self {
        Self::new(RelationStoreConfig::default())
    }
}

#[async_trait]
impl RelationStorage for MemoryRelationStore {
    async fn create(&self, request: CreateRelation) -> StoreResult<Relation> {
        if request.source_id == request.target_id {
            return Err(StoreError::consistency(
                "relation source and target must differ",
            ));
        }
        validate_strength(request.strength)?;

        let mut inner = self.inner.write();
        let (relation, merged) = Self::insert_or_merge(&mut inner, request);

        let mut derived_count = 0;
        if !merged && self.config.derivation_enabled {
            for mut derived in self.derivation.derive(&relation) {
                if derived.source_id == derived.target_id
                    || validate_strength(derived.strength).is_err()
                {
                    continue;
                }
                derived.origin = RelationOrigin::System;
                Self::insert_or_merge(&mut inner, derived);
                derived_count += 1;
            }
        }
        drop(inner);

        if merged {
            tracing::debug!(relation_id = %relation.id, strength = relation.strength,
                "existing relation strength updated");
            self.events.emit(StoreEvent::RelationUpdated {
                relation_id: relation.id,
            });
        } else {
            tracing::debug!(relation_id = %relation.id, derived = derived_count, "relation created");
            self.events.emit(StoreEvent::RelationCreated {
                relation_id: relation.id,
            });
        }
        Ok(relation)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Relation>> {
        let mut inner = self.inner.write();
        let Some(slot) = inner.by_id.get(&id).copied() else {
            return Ok(None);
        };
        Ok(inner.arena.get_mut(slot).map(|relation| {
            relation.access_count += 1;
            relation.last_accessed = Utc::now();
            relation.clone()
        }))
    }

    async fn update(&self, id: Uuid, update: RelationUpdate) -> StoreResult<Relation> {
        if let Some(strength) = update.strength {
            validate_strength(strength)?;
        }

        let mut inner = self.inner.write();
        let slot = *inner
            .by_id
            .get(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Relation, id))?;
        let relation = inner
            .arena
            .get_mut(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Relation, id))?;

        if let Some(strength) = update.strength {
            relation.strength = strength;
        }
        if let Some(bidirectional) = update.bidirectional {
            relation.bidirectional = bidirectional;
        }
        if let Some(metadata) = update.metadata {
            relation.metadata = metadata;
        }
        let updated = relation.clone();
        drop(inner);

        self.events
            .emit(StoreEvent::RelationUpdated { relation_id: id });
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let slot = *inner
            .by_id
            .get(&id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Relation, id))?;
        if let Some(removed) = inner.arena.remove(slot) {
            inner.unindex(slot, &removed);
        }
        drop(inner);

        self.events
            .emit(StoreEvent::RelationDeleted { relation_id: id });
        Ok(())
    }

    async fn query(&self, query: RelationQuery) -> StoreResult<Vec<Relation>> {
        let inner = self.inner.read();

        // endpoint lists, when present, prefilter through the indexes
        let candidates: Vec<Relation> =
            if !query.source_ids.is_empty() || !query.target_ids.is_empty() {
                let mut slots: HashSet<SlotId> = HashSet::new();
                for source in &query.source_ids {
                    if let Some(indexed) = inner.by_source.get(source) {
                        slots.extend(indexed.iter().copied());
                    }
                }
                for target in &query.target_ids {
                    if let Some(indexed) = inner.by_target.get(target) {
                        slots.extend(indexed.iter().copied());
                    }
                }
                slots
                    .into_iter()
                    .filter_map(|slot| inner.arena.get(slot))
                    .cloned()
                    .collect()
            } else {
                inner.arena.iter().map(|(_, r)| r.clone()).collect()
            };
        drop(inner);

        let mut matched: Vec<Relation> = candidates
            .into_iter()
            .filter(|relation| {
                if !query.types.is_empty() && !query.types.contains(&relation.relation_type) {
                    return false;
                }
                if let Some(min) = query.min_strength {
                    if relation.strength < min {
                        return false;
                    }
                }
                if let Some(max) = query.max_strength {
                    if relation.strength > max {
                        return false;
                    }
                }
                if let Some(bidirectional) = query.bidirectional {
                    if relation.bidirectional != bidirectional {
                        return false;
                    }
                }
                query.created_range.contains(relation.created_at)
            })
            .collect();

        // newest first, deterministic for equal timestamps
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn get_related(&self, item_id: Uuid) -> StoreResult<Vec<Relation>> {
        let mut inner = self.inner.write();
        let slots: Vec<SlotId> = inner
            .edges_of(item_id)
            .into_iter()
            .map(|(slot, _)| slot)
            .collect();

        let now = Utc::now();
        let mut related = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(relation) = inner.arena.get_mut(slot) {
                relation.access_count += 1;
                relation.last_accessed = now;
                related.push(relation.clone());
            }
        }
        Ok(related)
    }

    async fn build_graph(
        &self,
        center_ids: &[Uuid],
        max_depth: usize,
        min_strength: f64,
    ) -> StoreResult<KnowledgeGraph> {
        let inner = self.inner.read();

        let mut visited: HashMap<Uuid, usize> = HashMap::new();
        let mut queue: VecDeque<(Uuid, usize)> = VecDeque::new();
        let mut edges: HashMap<Uuid, GraphEdge> = HashMap::new();

        for center in center_ids {
            if visited.insert(*center, 0).is_none() {
                queue.push_back((*center, 0));
            }
        }

        while let Some((item, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (_, relation) in inner.edges_of(item) {
                if relation.strength < min_strength {
                    continue;
                }
                let Some(other) = relation.other_end(item) else {
                    continue;
                };
                edges.entry(relation.id).or_insert_with(|| GraphEdge {
                    relation_id: relation.id,
                    source_id: relation.source_id,
                    target_id: relation.target_id,
                    relation_type: relation.relation_type,
                    strength: relation.strength,
                });
                if !visited.contains_key(&other) {
                    visited.insert(other, depth + 1);
                    queue.push_back((other, depth + 1));
                }
            }
        }
        drop(inner);

        let mut nodes: Vec<GraphNode> = visited
            .into_iter()
            .map(|(item_id, depth)| GraphNode { item_id, depth })
            .collect();
        nodes.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.item_id.cmp(&b.item_id)));

        let node_count = nodes.len();
        let edge_count = edges.len();
        let density = if node_count > 1 {
            edge_count as f64 / (node_count * (node_count - 1)) as f64
        } else {
            0.0
        };
        // trivial default until a real cluster strategy lands
        let cluster_count = node_count.div_ceil(10);

        let mut edge_list: Vec<GraphEdge> = edges.into_values().collect();
        edge_list.sort_by(|a, b| a.relation_id.cmp(&b.relation_id));

        Ok(KnowledgeGraph {
            nodes,
            edges: edge_list,
            density,
            cluster_count,
        })
    }

    async fn recommend(
        &self,
        item_id: Uuid,
        limit: usize,
        min_strength: f64,
    ) -> StoreResult<Vec<RelatedItem>> {
        let inner = self.inner.read();

        let mut best: HashMap<Uuid, RelatedItem> = HashMap::new();
        let mut consider = |candidate: RelatedItem, best: &mut HashMap<Uuid, RelatedItem>| {
            best.entry(candidate.item_id)
                .and_modify(|current| {
                    if candidate.score > current.score {
                        *current = candidate.clone();
                    }
                })
                .or_insert(candidate);
        };

        // direct relations score at their raw strength
        let direct: Vec<(Uuid, f64)> = inner
            .edges_of(item_id)
            .into_iter()
            .filter_map(|(_, relation)| {
                relation
                    .other_end(item_id)
                    .map(|other| (other, relation.strength))
            })
            .collect();
        for (other, strength) in &direct {
            consider(
                RelatedItem {
                    item_id: *other,
                    score: *strength,
                    via: None,
                },
                &mut best,
            );
        }

        // second degree decays through the intermediate strength
        for (intermediate, first_strength) in &direct {
            for (_, relation) in inner.edges_of(*intermediate) {
                let Some(other) = relation.other_end(*intermediate) else {
                    continue;
                };
                if other == item_id {
                    continue;
                }
                consider(
                    RelatedItem {
                        item_id: other,
                        score: first_strength * relation.strength * SECOND_DEGREE_DECAY,
                        via: Some(*intermediate),
                    },
                    &mut best,
                );
            }
        }
        drop(inner);

        let mut ranked: Vec<RelatedItem> = best
            .into_values()
            .filter(|candidate| candidate.score >= min_strength)
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn cleanup(&self) -> StoreResult<usize> {
        let ttl = Duration::seconds(self.config.system_relation_ttl_secs as i64);
        let cutoff = Utc::now() - ttl;

        // snapshot candidates under a short read lock
        let candidates: Vec<Uuid> = {
            let inner = self.inner.read();
            inner
                .arena
                .iter()
                .filter(|(_, relation)| {
                    relation.origin == RelationOrigin::System && relation.last_accessed < cutoff
                })
                .map(|(_, relation)| relation.id)
                .collect()
        };

        // remove one at a time, re-checking eligibility under the write lock
        let mut removed = 0;
        for id in candidates {
            let mut inner = self.inner.write();
            let Some(slot) = inner.by_id.get(&id).copied() else {
                continue;
            };
            let still_expired = inner
                .arena
                .get(slot)
                .map(|relation| {
                    relation.origin == RelationOrigin::System && relation.last_accessed < cutoff
                })
                .unwrap_or(false);
            if !still_expired {
                continue;
            }
            if let Some(expired) = inner.arena.remove(slot) {
                inner.unindex(slot, &expired);
                removed += 1;
                drop(inner);
                self.events
                    .emit(StoreEvent::RelationDeleted { relation_id: id });
            }
        }

        if removed > 0 {
            tracing::info!(removed, "expired system relations swept");
        }
        Ok(removed)
    }

    async fn get_statistics(&self) -> StoreResult<RelationStatistics> {
        let inner = self.inner.read();
        let mut type_counts: HashMap<String, u64> = HashMap::new();
        let mut strength_sum = 0.0;
        let mut bidirectional_count = 0;
        for (_, relation) in inner.arena.iter() {
            *type_counts
                .entry(relation.relation_type.as_str().to_string())
                .or_insert(0) += 1;
            strength_sum += relation.strength;
            if relation.bidirectional {
                bidirectional_count += 1;
            }
        }
        let relation_count = inner.arena.len();
        Ok(RelationStatistics {
            relation_count,
            type_counts,
            avg_strength: if relation_count > 0 {
                strength_sum / relation_count as f64
            } else {
                0.0
            },
            bidirectional_count,
        })
    }

    async fn batch(
        &self,
        operations: Vec<BatchOperation<CreateRelation, RelationUpdate>>,
    ) -> StoreResult<BatchReport> {
        let mut outcomes = Vec::with_capacity(operations.len());
        for (index, operation) in operations.into_iter().enumerate() {
            let outcome = match operation {
                BatchOperation::Create { payload } => match self.create(payload).await {
                    Ok(relation) => BatchOutcome::ok(index, relation.id),
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
