//! Background Maintenance
//!
//! Periodic TTL sweeps over the relation and tag stores, run on a `tokio`
//! interval independent of request handling. The stores' `cleanup`
//! implementations snapshot candidates under a short lock and remove them
//! one at a time, so a sweep never blocks readers for longer than a
//! single removal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use hinata_core::config::MaintenanceConfig;
use hinata_core::events::{EventBus, StoreEvent};
use hinata_core::storage::{RelationStorage, TagStorage};

/// Periodic sweep task over the relation and tag stores.
pub struct MaintenanceTask {
    relations: Arc<dyn RelationStorage>,
    tags: Arc<dyn TagStorage>,
    config: MaintenanceConfig,
    events: EventBus,
}

impl MaintenanceTask {
    pub fn new(
        relations: Arc<dyn RelationStorage>,
        tags: Arc<dyn TagStorage>,
        config: MaintenanceConfig,
    ) -> Self {
        Self::with_event_bus(relations, tags, config, EventBus::default())
    }

    pub fn with_event_bus(
        relations: Arc<dyn RelationStorage>,
        tags: Arc<dyn TagStorage>,
        config: MaintenanceConfig,
        events: EventBus,
    ) -> Self {
        Self {
            relations,
            tags,
            config,
            events,
        }
    }

    /// Run one sweep over both stores. Failures are logged, not
    /// propagated: the next tick retries.
    pub async fn sweep_once(&self) {
        let relations_removed = match self.relations.cleanup().await {
            Ok(removed) => removed,
            Err(err) => {
                tracing::warn!(%err, "relation sweep failed");
                0
            }
        };
        let tags_removed = match self.tags.cleanup().await {
            Ok(removed) => removed,
            Err(err) => {
                tracing::warn!(%err, "tag sweep failed");
                0
            }
        };

        tracing::debug!(relations_removed, tags_removed, "maintenance sweep finished");
        self.events.emit(StoreEvent::MaintenanceSweepCompleted {
            relations_removed,
            tags_removed,
        });
    }

    /// Spawn the periodic sweep loop. Returns a handle that stops the
    /// loop on shutdown. With `enabled: false` the task exits
    /// immediately.
    pub fn spawn(self) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            if !self.config.enabled {
                return;
            }
            let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // consume the immediate first tick; the first sweep runs one
            // full period after startup
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep_once().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!("maintenance task stopping");
                            break;
                        }
                    }
                }
            }
        });
        MaintenanceHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }
}

/// Handle to a spawned [`MaintenanceTask`].
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }

    /// Abort without waiting.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation_store::MemoryRelationStore;
    use crate::tag_store::MemoryTagStore;
    use hinata_core::config::{RelationStoreConfig, TagStoreConfig};

    fn task(config: MaintenanceConfig) -> (MaintenanceTask, EventBus) {
        let events = EventBus::default();
        let relations = Arc::new(MemoryRelationStore::with_event_bus(
            RelationStoreConfig::default(),
            events.clone(),
        ));
        let tags = Arc::new(MemoryTagStore::with_event_bus(
            TagStoreConfig::default(),
            events.clone(),
        ));
        (
            MaintenanceTask::with_event_bus(relations, tags, config, events.clone()),
            events,
        )
    }

    #[tokio::test]
    async fn test_sweep_once_emits_completion_event() {
        let (task, events) = task(MaintenanceConfig::default());
        let mut rx = events.subscribe();

        task.sweep_once().await;

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            StoreEvent::MaintenanceSweepCompleted {
                relations_removed: 0,
                tags_removed: 0,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_sweeps_on_interval() {
        let (task, events) = task(MaintenanceConfig {
            enabled: true,
            sweep_interval_secs: 60,
        });
        let mut rx = events.subscribe();
        let handle = task.spawn();

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            StoreEvent::MaintenanceSweepCompleted { .. }
        ));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_disabled_task_exits() {
        let (task, _) = task(MaintenanceConfig {
            enabled: false,
            sweep_interval_secs: 1,
        });
        let handle = task.spawn();
        // the loop returned on its own; shutdown just joins it
        handle.shutdown().await;
    }
}
