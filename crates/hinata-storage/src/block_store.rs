//! In-Memory Knowledge Block Store
//!
//! Owns derived knowledge blocks, their ordered note items, and the
//! block-to-block reference edges. References and backlinks are dual
//! lists kept consistent by a single pair of link/unlink functions, the
//! only code paths allowed to touch either side, executed under the
//! store's one write lock, so no reader ever observes a reference present
//! on the source but absent from the target's backlinks.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use hinata_core::batch::{BatchOperation, BatchOutcome, BatchReport};
use hinata_core::block::{
    BlockQuery, BlockReference, BlockSortField, BlockStatistics, BlockUpdate, CreateReference,
    KnowledgeBlock, NewNoteItem, NoteItem, NoteItemUpdate,
};
use hinata_core::error::{EntityKind, StoreError, StoreResult};
use hinata_core::events::{EventBus, StoreEvent};
use hinata_core::hinata::{MAX_NOTE_ITEMS, MAX_NOTE_LEN};
use hinata_core::query::{Page, SortDirection};
use hinata_core::storage::BlockStorage;
use hinata_core::tag::normalize_tag_name;
use hinata_core::validation::validate_block;

use crate::arena::{Arena, SlotId};
use crate::keywords;

/// Primary arena plus secondary indexes and the reference endpoint map,
/// guarded together.
#[derive(Default)]
struct BlockIndexes {
    arena: Arena<KnowledgeBlock>,
    by_id: HashMap<Uuid, SlotId>,
    by_user: HashMap<String, Vec<SlotId>>,
    by_library_item: HashMap<Uuid, Vec<SlotId>>,
    by_tag: HashMap<String, Vec<SlotId>>,
    /// reference id -> (source block id, target block id)
    reference_endpoints: HashMap<Uuid, (Uuid, Uuid)>,
}

impl BlockIndexes {
    fn slot_of(&self, id: Uuid) -> StoreResult<SlotId> {
        self.by_id
            .get(&id)
            .copied()
            .ok_or_else(|| StoreError::not_found(EntityKind::Block, id))
    }

    fn index(&mut self, slot: SlotId, block: &KnowledgeBlock) {
        self.by_user
            .entry(block.user_id.clone())
            .or_default()
            .push(slot);
        self.by_library_item
            .entry(block.library_item_id)
            .or_default()
            .push(slot);
        for tag in &block.core.tags {
            self.by_tag
                .entry(normalize_tag_name(tag))
                .or_default()
                .push(slot);
        }
    }

    fn unindex(&mut self, slot: SlotId, block: &KnowledgeBlock) {
        prune(&mut self.by_user, &block.user_id, slot);
        prune(&mut self.by_library_item, &block.library_item_id, slot);
        for tag in &block.core.tags {
            prune(&mut self.by_tag, &normalize_tag_name(tag), slot);
        }
    }

    /// The only path that creates a reference: appends to the source's
    /// `references` AND the target's `backlinks`, one backlink entry per
    /// edge so removal stays a bijection.
    fn link_reference(&mut self, reference: BlockReference) -> StoreResult<BlockReference> {
        let source_slot = self.slot_of(reference.source_block_id)?;
        let target_slot = self.slot_of(reference.target_block_id)?;

        // both slots were resolved under this same borrow, so the two
        // mutations below cannot observe a missing endpoint
        let now = Utc::now();
        match self.arena.get_mut(source_slot) {
            Some(source) => {
                source.references.push(reference.clone());
                source.updated_at = now;
            }
            None => {
                return Err(StoreError::not_found(
                    EntityKind::Block,
                    reference.source_block_id,
                ))
            }
        }
        match self.arena.get_mut(target_slot) {
            Some(target) => {
                target.backlinks.push(reference.source_block_id);
                target.updated_at = now;
            }
            None => {
                return Err(StoreError::not_found(
                    EntityKind::Block,
                    reference.target_block_id,
                ))
            }
        }
        self.reference_endpoints.insert(
            reference.id,
            (reference.source_block_id, reference.target_block_id),
        );
        Ok(reference)
    }

    /// The only path that removes a reference: undoes both sides.
    fn unlink_reference(&mut self, reference_id: Uuid) -> StoreResult<(Uuid, Uuid)> {
        let (source_id, target_id) = self
            .reference_endpoints
            .remove(&reference_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Reference, reference_id))?;

        let now = Utc::now();
        if let Ok(source_slot) = self.slot_of(source_id) {
            if let Some(source) = self.arena.get_mut(source_slot) {
                source.references.retain(|r| r.id != reference_id);
                source.updated_at = now;
            }
        }
        if let Ok(target_slot) = self.slot_of(target_id) {
            if let Some(target) = self.arena.get_mut(target_slot) {
                if let Some(pos) = target.backlinks.iter().position(|b| *b == source_id) {
                    target.backlinks.remove(pos);
                }
                target.updated_at = now;
            }
        }
        Ok((source_id, target_id))
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

fn validate_note_item_content(content: &str) -> StoreResult<()> {
    if content.trim().is_empty() {
        return Err(StoreError::validation("note_item.content", "must not be empty"));
    }
    if content.chars().count() > MAX_NOTE_LEN {
        return Err(StoreError::validation(
            "note_item.content",
            format!("exceeds {MAX_NOTE_LEN} characters"),
        ));
    }
    Ok(())
}

/// In-memory [`BlockStorage`] implementation.
pub struct MemoryBlockStore {
    inner: RwLock<BlockIndexes>,
    events: EventBus,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::with_event_bus(EventBus::default())
    }

    pub fn with_event_bus(events: EventBus) -> Self {
        Self {
            inner: RwLock::new(BlockIndexes::default()),
            events,
        }
    }

    pub fn event_bus(&self) -> EventBus {
        self.events.clone()
    }

    fn block_blob(block: &KnowledgeBlock) -> String {
        let mut blob = block.core.highlight.to_lowercase();
        blob.push(' ');
        blob.push_str(&block.core.note.to_lowercase());
        for item in &block.note_items {
            blob.push(' ');
            blob.push_str(&item.content.to_lowercase());
        }
        blob
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStorage for MemoryBlockStore {
    async fn create(&self, mut block: KnowledgeBlock) -> StoreResult<KnowledgeBlock> {
        validate_block(&block)?;
        if !block.references.is_empty() || !block.backlinks.is_empty() {
            return Err(StoreError::validation(
                "references",
                "references are created via add_reference, not at block creation",
            ));
        }

        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&block.id) {
            return Err(StoreError::duplicate(EntityKind::Block, block.id));
        }

        let now = Utc::now();
        block.created_at = now;
        block.updated_at = now;
        block.note_items.sort_by_key(|item| item.order);

        let id = block.id;
        let slot = inner.arena.insert(block.clone());
        inner.by_id.insert(id, slot);
        inner.index(slot, &block);
        drop(inner);

        tracing::debug!(block_id = %id, "knowledge block created");
        self.events.emit(StoreEvent::BlockCreated { block_id: id });
        Ok(block)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<KnowledgeBlock>> {
        let inner = self.inner.read();
        Ok(inner
            .by_id
            .get(&id)
            .and_then(|slot| inner.arena.get(*slot))
            .cloned())
    }

    async fn get_by_user(&self, user_id: &str) -> StoreResult<Vec<KnowledgeBlock>> {
        let inner = self.inner.read();
        Ok(inner
            .by_user
            .get(user_id)
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|slot| inner.arena.get(*slot))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_by_library_item(&self, library_item_id: Uuid) -> StoreResult<Vec<KnowledgeBlock>> {
        let inner = self.inner.read();
        Ok(inner
            .by_library_item
            .get(&library_item_id)
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|slot| inner.arena.get(*slot))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, id: Uuid, update: BlockUpdate) -> StoreResult<KnowledgeBlock> {
        let mut inner = self.inner.write();
        let slot = inner.slot_of(id)?;
        let previous = inner
            .arena
            .get(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Block, id))?
            .clone();

        let mut merged = previous.clone();
        update.apply(&mut merged);
        validate_block(&merged)?;
        merged.updated_at = Utc::now();

        inner.unindex(slot, &previous);
        inner.index(slot, &merged);
        if let Some(block) = inner.arena.get_mut(slot) {
            *block = merged.clone();
        }
        drop(inner);

        tracing::debug!(block_id = %id, "knowledge block updated");
        self.events.emit(StoreEvent::BlockUpdated { block_id: id });
        Ok(merged)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let slot = inner.slot_of(id)?;
        let block = inner
            .arena
            .get(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Block, id))?
            .clone();

        // outgoing references: drop the backlink entry on each target
        let outgoing: Vec<Uuid> = block.references.iter().map(|r| r.id).collect();
        for reference_id in outgoing {
            let _ = inner.unlink_reference(reference_id);
        }

        // incoming references: every edge targeting this block goes too
        let incoming: Vec<Uuid> = inner
            .reference_endpoints
            .iter()
            .filter(|(_, (_, target))| *target == id)
            .map(|(reference_id, _)| *reference_id)
            .collect();
        for reference_id in incoming {
            let _ = inner.unlink_reference(reference_id);
        }

        inner.by_id.remove(&id);
        if let Some(removed) = inner.arena.remove(slot) {
            inner.unindex(slot, &removed);
        }
        drop(inner);

        tracing::debug!(block_id = %id, "knowledge block deleted");
        self.events.emit(StoreEvent::BlockDeleted { block_id: id });
        Ok(())
    }

    async fn add_note_item(&self, block_id: Uuid, item: NewNoteItem) -> StoreResult<NoteItem> {
        validate_note_item_content(&item.content)?;

        let mut inner = self.inner.write();
        let slot = inner.slot_of(block_id)?;
        let block = inner
            .arena
            .get_mut(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Block, block_id))?;

        if block.note_items.len() >= MAX_NOTE_ITEMS {
            return Err(StoreError::validation(
                "note_items",
                format!("more than {MAX_NOTE_ITEMS} note items"),
            ));
        }

        let note_item = NoteItem::new(item.content, item.order).with_format(item.content_format);
        block.note_items.push(note_item.clone());
        // stable: equal orders keep insertion sequence
        block.note_items.sort_by_key(|existing| existing.order);
        block.updated_at = Utc::now();
        drop(inner);

        tracing::debug!(block_id = %block_id, note_item_id = %note_item.id, "note item added");
        self.events.emit(StoreEvent::BlockUpdated { block_id });
        Ok(note_item)
    }

    async fn update_note_item(
        &self,
        block_id: Uuid,
        item_id: Uuid,
        update: NoteItemUpdate,
    ) -> StoreResult<NoteItem> {
        if let Some(ref content) = update.content {
            validate_note_item_content(content)?;
        }

        let mut inner = self.inner.write();
        let slot = inner.slot_of(block_id)?;
        let block = inner
            .arena
            .get_mut(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Block, block_id))?;
        let item = block
            .note_items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::NoteItem, item_id))?;

        if let Some(content) = update.content {
            item.content = content;
        }
        if let Some(format) = update.content_format {
            item.content_format = format;
        }
        item.updated_at = Utc::now();
        let updated = item.clone();
        block.updated_at = updated.updated_at;
        drop(inner);

        self.events.emit(StoreEvent::BlockUpdated { block_id });
        Ok(updated)
    }

    async fn remove_note_item(&self, block_id: Uuid, item_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let slot = inner.slot_of(block_id)?;
        let block = inner
            .arena
            .get_mut(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Block, block_id))?;

        let before = block.note_items.len();
        block.note_items.retain(|item| item.id != item_id);
        if block.note_items.len() == before {
            return Err(StoreError::not_found(EntityKind::NoteItem, item_id));
        }
        block.updated_at = Utc::now();
        drop(inner);

        self.events.emit(StoreEvent::BlockUpdated { block_id });
        Ok(())
    }

    async fn reorder_note_items(
        &self,
        block_id: Uuid,
        ordered_ids: &[Uuid],
    ) -> StoreResult<Vec<NoteItem>> {
        let mut inner = self.inner.write();
        let slot = inner.slot_of(block_id)?;
        let block = inner
            .arena
            .get_mut(slot)
            .ok_or_else(|| StoreError::not_found(EntityKind::Block, block_id))?;

        let positions: HashMap<Uuid, i32> = ordered_ids
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position as i32))
            .collect();

        // items not named keep their prior order value
        for item in &mut block.note_items {
            if let Some(order) = positions.get(&item.id) {
                item.order = *order;
            }
        }
        block.note_items.sort_by_key(|item| item.order);
        block.updated_at = Utc::now();
        let items = block.note_items.clone();
        drop(inner);

        self.events.emit(StoreEvent::BlockUpdated { block_id });
        Ok(items)
    }

    async fn add_reference(&self, request: CreateReference) -> StoreResult<BlockReference> {
        if request.source_block_id == request.target_block_id {
            return Err(StoreError::consistency(
                "a block cannot reference itself",
            ));
        }

        let mut inner = self.inner.write();
        // both endpoints must exist before either side is touched
        let source_slot = inner.slot_of(request.source_block_id)?;
        inner.slot_of(request.target_block_id)?;

        if let Some(ref note_item_id) = request.source_note_item_id {
            let source = inner
                .arena
                .get(source_slot)
                .ok_or_else(|| StoreError::not_found(EntityKind::Block, request.source_block_id))?;
            if source.note_item(*note_item_id).is_none() {
                return Err(StoreError::not_found(EntityKind::NoteItem, *note_item_id));
            }
        }

        let reference = BlockReference {
            id: Uuid::new_v4(),
            source_block_id: request.source_block_id,
            source_note_item_id: request.source_note_item_id,
            target_block_id: request.target_block_id,
            reference_type: request.reference_type,
            context: request.context,
            created_at: Utc::now(),
        };
        let reference = inner.link_reference(reference)?;
        drop(inner);

        tracing::debug!(
            reference_id = %reference.id,
            source = %reference.source_block_id,
            target = %reference.target_block_id,
            "block reference added"
        );
        self.events.emit(StoreEvent::ReferenceAdded {
            reference_id: reference.id,
            source_block_id: reference.source_block_id,
            target_block_id: reference.target_block_id,
        });
        Ok(reference)
    }

    async fn remove_reference(&self, reference_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let (source_block_id, target_block_id) = inner.unlink_reference(reference_id)?;
        drop(inner);

        tracing::debug!(reference_id = %reference_id, "block reference removed");
        self.events.emit(StoreEvent::ReferenceRemoved {
            reference_id,
            source_block_id,
            target_block_id,
        });
        Ok(())
    }

    async fn get_references(&self, block_id: Uuid) -> StoreResult<Vec<BlockReference>> {
        let inner = self.inner.read();
        let slot = inner.slot_of(block_id)?;
        Ok(inner
            .arena
            .get(slot)
            .map(|block| block.references.clone())
            .unwrap_or_default())
    }

    async fn get_backlinks(&self, block_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let inner = self.inner.read();
        let slot = inner.slot_of(block_id)?;
        Ok(inner
            .arena
            .get(slot)
            .map(|block| block.backlinks.clone())
            .unwrap_or_default())
    }

    async fn search(&self, query: BlockQuery) -> StoreResult<Page<KnowledgeBlock>> {
        let inner = self.inner.read();
        let mut filtered: Vec<KnowledgeBlock> = inner
            .arena
            .iter()
            .filter(|(_, block)| {
                if let Some(ref user_id) = query.user_id {
                    if &block.user_id != user_id {
                        return false;
                    }
                }
                if let Some(library_item_id) = query.library_item_id {
                    if block.library_item_id != library_item_id {
                        return false;
                    }
                }
                if !query.access_levels.is_empty()
                    && !query.access_levels.contains(&block.core.access)
                {
                    return false;
                }
                if !query.tags.is_empty() {
                    let block_tags: HashSet<String> = block
                        .core
                        .tags
                        .iter()
                        .map(|tag| normalize_tag_name(tag))
                        .collect();
                    if !query
                        .tags
                        .iter()
                        .all(|tag| block_tags.contains(&normalize_tag_name(tag)))
                    {
                        return false;
                    }
                }
                if !query.date_range.contains(block.created_at) {
                    return false;
                }
                if let Some(ref text) = query.text {
                    if !keywords::matches_all_terms(&Self::block_blob(block), text) {
                        return false;
                    }
                }
                true
            })
            .map(|(_, block)| block.clone())
            .collect();
        drop(inner);

        filtered.sort_by(|a, b| {
            let ordering = match query.sort_by {
                BlockSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                BlockSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            match query.sort_direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
        Ok(Page::slice(filtered, query.pagination))
    }

    async fn get_statistics(&self) -> StoreResult<BlockStatistics> {
        let inner = self.inner.read();
        let block_count = inner.arena.len();
        let mut note_item_count = 0;
        let mut tag_counts: HashMap<String, u64> = HashMap::new();
        let mut daily: BTreeMap<String, u64> = BTreeMap::new();

        for (_, block) in inner.arena.iter() {
            note_item_count += block.note_items.len();
            for tag in &block.core.tags {
                *tag_counts.entry(normalize_tag_name(tag)).or_insert(0) += 1;
            }
            *daily
                .entry(block.created_at.format("%Y-%m-%d").to_string())
                .or_insert(0) += 1;
        }
        let reference_count = inner.reference_endpoints.len();
        drop(inner);

        let mut top_tags: Vec<(String, u64)> = tag_counts.into_iter().collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(10);

        Ok(BlockStatistics {
            block_count,
            note_item_count,
            reference_count,
            avg_note_items_per_block: if block_count > 0 {
                note_item_count as f64 / block_count as f64
            } else {
                0.0
            },
            top_tags,
            daily_created: daily.into_iter().collect(),
        })
    }

    async fn batch(
        &self,
        operations: Vec<BatchOperation<KnowledgeBlock, BlockUpdate>>,
    ) -> StoreResult<BatchReport> {
        let mut outcomes = Vec::with_capacity(operations.len());
        for (index, operation) in operations.into_iter().enumerate() {
            let outcome = match operation {
                BatchOperation::Create { payload } => {
                    let id = payload.id;
                    match self.create(payload).await {
                        Ok(block) => BatchOutcome::ok(index, block.id),
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
