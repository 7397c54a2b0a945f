//! # HiNATA Storage
//!
//! In-memory implementations of the four HiNATA stores defined by
//! `hinata-core`:
//!
//! - [`MemoryPacketStore`]: ingested capture packets with five secondary
//!   indexes, heuristic similarity, and attention trends
//! - [`MemoryBlockStore`]: knowledge blocks with ordered note items and
//!   dual-maintained references/backlinks
//! - [`MemoryRelationStore`]: the typed, weighted relation graph with
//!   breadth-first traversal and decayed recommendations
//! - [`MemoryTagStore`]: tag taxonomy, usage-weighted ranking,
//!   recommendation, and keyword extraction
//!
//! # Concurrency
//!
//! Each store guards its primary arena and every secondary index under a
//! single `parking_lot::RwLock`, so multi-map updates are atomic with
//! respect to readers. Locks are never held across an `.await`.
//! [`MaintenanceTask`] runs the TTL sweeps on a `tokio` interval,
//! snapshotting candidates under a short lock and removing them one at a
//! time.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hinata_core::{CaptureSource, HinataCore, Packet, PacketStorage, UserAction};
//! use hinata_storage::MemoryPacketStore;
//!
//! async fn ingest(store: &MemoryPacketStore) -> hinata_core::StoreResult<()> {
//!     let packet = Packet::new(
//!         CaptureSource::WebClipper,
//!         UserAction::Highlight,
//!         HinataCore::new("a sentence worth keeping", "https://example.com"),
//!         "user-1",
//!     );
//!     let stored = store.store(packet).await?;
//!     assert_eq!(stored.created_at, stored.updated_at);
//!     Ok(())
//! }
//! ```

pub mod arena;
pub mod block_store;
pub mod keywords;
pub mod maintenance;
pub mod packet_store;
pub mod relation_store;
pub mod tag_store;

pub use arena::{Arena, SlotId};
pub use block_store::MemoryBlockStore;
pub use maintenance::{MaintenanceHandle, MaintenanceTask};
pub use packet_store::MemoryPacketStore;
pub use relation_store::{DerivationStrategy, MemoryRelationStore, NoDerivation};
pub use tag_store::MemoryTagStore;
