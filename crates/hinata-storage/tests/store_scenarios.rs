//! End-to-end scenarios across the four stores.

use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use hinata_core::batch::BatchOperation;
use hinata_core::block::{CreateReference, KnowledgeBlock, ReferenceType};
use hinata_core::config::{MaintenanceConfig, RelationStoreConfig, TagStoreConfig};
use hinata_core::events::{EventBus, StoreEvent};
use hinata_core::hinata::{AccessLevel, HinataCore};
use hinata_core::packet::{CaptureSource, Packet, UserAction};
use hinata_core::relation::{CreateRelation, RelationType};
use hinata_core::storage::{BlockStorage, PacketStorage, RelationStorage, TagStorage};
use hinata_core::tag::{CreateTag, TagQuery, TagUsageMethod};
use hinata_storage::{
    MaintenanceTask, MemoryBlockStore, MemoryPacketStore, MemoryRelationStore, MemoryTagStore,
};

fn capture(user: &str, highlight: &str, tags: &[&str]) -> Packet {
    Packet::new(
        CaptureSource::WebClipper,
        UserAction::Highlight,
        HinataCore::new(highlight, "https://x")
            .with_tags(tags.iter().map(|t| t.to_string()).collect())
            .with_access(AccessLevel::Private),
        user,
    )
}

// Scenario A: packet lifecycle through the by-user index.
#[tokio::test]
async fn scenario_a_packet_lifecycle_by_user() -> Result<()> {
    let store = MemoryPacketStore::new();
    let packet = capture("u1", "h", &["ai"]);
    let id = packet.id();

    store.store(packet).await?;
    let mine = store.get_by_user("u1").await?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id(), id);

    store.delete(id).await?;
    assert!(store.get_by_user("u1").await?.is_empty());
    Ok(())
}

// Scenario B: reference round-trip keeps both directions consistent.
#[tokio::test]
async fn scenario_b_reference_roundtrip() -> Result<()> {
    let store = MemoryBlockStore::new();
    let library_item = Uuid::new_v4();
    let x = store
        .create(KnowledgeBlock::new("u1", library_item, HinataCore::new("x", "at")))
        .await?;
    let y = store
        .create(KnowledgeBlock::new("u1", library_item, HinataCore::new("y", "at")))
        .await?;

    store
        .add_reference(CreateReference::new(x.id, y.id, ReferenceType::Strong))
        .await?;

    let references = store.get_references(x.id).await?;
    assert_eq!(references.len(), 1);
    assert_eq!(references[0].target_block_id, y.id);
    assert_eq!(references[0].reference_type, ReferenceType::Strong);

    let backlinks = store.get_backlinks(y.id).await?;
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0], x.id);
    Ok(())
}

// Scenario C: tag dedupe across spellings with a shared usage count.
#[tokio::test]
async fn scenario_c_tag_dedupe_shared_usage() -> Result<()> {
    let store = MemoryTagStore::new(TagStoreConfig {
        seed_system_tags: false,
        ..Default::default()
    });

    let first = store.create(CreateTag::new("project")).await?;
    let second = store.create(CreateTag::new("Project ")).await?;
    assert_eq!(first.id, second.id);

    store
        .use_tag(first.id, "item-1", TagUsageMethod::Manual)
        .await?;
    store
        .use_tag(second.id, "item-2", TagUsageMethod::Manual)
        .await?;

    let page = store
        .query(TagQuery {
            name_pattern: Some("project".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].usage_count, 2);
    Ok(())
}

// A capture flows through all four stores the way the ingestion path
// composes them: packet in, block derived from it, tags applied, relation
// linking the block to another knowledge item.
#[tokio::test]
async fn cross_store_capture_flow() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let events = EventBus::default();
    let packets = MemoryPacketStore::with_event_bus(events.clone());
    let blocks = MemoryBlockStore::with_event_bus(events.clone());
    let relations =
        MemoryRelationStore::with_event_bus(RelationStoreConfig::default(), events.clone());
    let tags = MemoryTagStore::with_event_bus(
        TagStoreConfig {
            seed_system_tags: false,
            ..Default::default()
        },
        events.clone(),
    );
    let mut rx = events.subscribe();

    // ingest a capture
    let packet = capture("u1", "the borrow checker enforces aliasing rules", &["rust"]);
    let stored = packets.store(packet).await?;

    // derive a block from the packet's tuple
    let block = blocks
        .create(KnowledgeBlock::new(
            "u1",
            Uuid::new_v4(),
            stored.packet.payload.core.clone(),
        ))
        .await?;
    assert_eq!(block.core.highlight, stored.packet.payload.core.highlight);

    // apply the capture's tag through the tag store
    let tag = tags.create(CreateTag::new("rust")).await?;
    tags.use_tag(tag.id, &block.id.to_string(), TagUsageMethod::Auto)
        .await?;

    // relate the block to an existing knowledge item
    let other_item = Uuid::new_v4();
    let relation = relations
        .create(
            CreateRelation::new(block.id, other_item, RelationType::SemanticSimilarity)
                .with_strength(0.7),
        )
        .await?;

    let related = relations.recommend(block.id, 5, 0.0).await?;
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].item_id, other_item);
    assert_eq!(related[0].score, relation.strength);

    // the shared bus saw every stage of the flow
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(e, StoreEvent::PacketStored { .. })));
    assert!(seen.iter().any(|e| matches!(e, StoreEvent::BlockCreated { .. })));
    assert!(seen.iter().any(|e| matches!(e, StoreEvent::TagUsed { .. })));
    assert!(seen.iter().any(|e| matches!(e, StoreEvent::RelationCreated { .. })));
    Ok(())
}

// Batch operations are best-effort: failures isolate, successes land.
#[tokio::test]
async fn batch_isolation_across_stores() -> Result<()> {
    let packets = MemoryPacketStore::new();
    let good = capture("u1", "fine", &[]);
    let good_id = good.id();
    let invalid = capture("u1", "", &[]);

    let report = packets
        .batch(vec![
            BatchOperation::Create { payload: good },
            BatchOperation::Create { payload: invalid },
            BatchOperation::Delete { id: Uuid::new_v4() },
        ])
        .await?;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 2);
    assert!(packets.get(good_id).await?.is_some());

    // the failed subset is retryable by index
    assert_eq!(report.failed_indexes(), vec![1, 2]);
    Ok(())
}

// Deleting an entity removes it from every search path.
#[tokio::test]
async fn delete_is_invisible_to_every_query() -> Result<()> {
    let packets = MemoryPacketStore::new();
    let packet = capture("u1", "quite unique wording here", &["solo"]);
    let id = packet.id();
    packets.store(packet).await?;
    packets.delete(id).await?;

    assert!(packets.get(id).await?.is_none());
    assert!(packets.get_by_user("u1").await?.is_empty());
    assert!(packets
        .get_by_source(CaptureSource::WebClipper)
        .await?
        .is_empty());

    let results = packets
        .search(hinata_core::packet::PacketQuery {
            text: Some("unique wording".to_string()),
            ..Default::default()
        })
        .await?;
    assert_eq!(results.page.total, 0);
    Ok(())
}

// The maintenance task drives both sweeps through the storage traits.
#[tokio::test]
async fn maintenance_sweeps_both_stores() -> Result<()> {
    let events = EventBus::default();
    let relations: Arc<dyn RelationStorage> = Arc::new(MemoryRelationStore::with_event_bus(
        RelationStoreConfig::default(),
        events.clone(),
    ));
    let tags: Arc<dyn TagStorage> = Arc::new(MemoryTagStore::with_event_bus(
        TagStoreConfig::default(),
        events.clone(),
    ));

    let task = MaintenanceTask::with_event_bus(
        relations,
        tags,
        MaintenanceConfig::default(),
        events.clone(),
    );
    let mut rx = events.subscribe();
    task.sweep_once().await;

    let event = rx.recv().await?;
    assert!(matches!(event, StoreEvent::MaintenanceSweepCompleted { .. }));
    Ok(())
}
