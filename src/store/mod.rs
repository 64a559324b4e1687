pub mod graph;
pub mod memory;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::{Entity, LifecycleState, Rating};

/// One page of a full scan. `next_cursor` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct EntityPage {
    pub entities: Vec<Entity>,
    pub next_cursor: Option<String>,
}

/// Port to the graph storage engine.
///
/// Every write sets one attribute group from freshly computed values, so
/// concurrent writers are last-write-wins and need no locking.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Entities with importance or stability unset, at most `limit`.
    async fn find_unclassified_entities(&self, limit: usize) -> StoreResult<Vec<Entity>>;

    /// Scan all entities in id order, starting after `cursor`.
    async fn get_all_entities(&self, cursor: Option<&str>, limit: usize) -> StoreResult<EntityPage>;

    async fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>>;

    /// Set importance and stability only while at least one is unset.
    /// Returns `false` when the entity was already classified and the stored
    /// rating was kept.
    async fn write_classification(&self, id: &str, rating: Rating) -> StoreResult<bool>;

    /// Persist a fresh decay score and state. `state_changed_at` is set when
    /// the state actually moved; `None` leaves the stored value untouched.
    async fn write_decay_and_state(
        &self,
        id: &str,
        decay_score: f64,
        state: LifecycleState,
        state_changed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Bump the access counter and stamp `last_accessed_at`. Returns the
    /// updated entity.
    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Entity>;

    async fn create_entity(&self, entity: &Entity) -> StoreResult<()>;
}

/// Connect to Neo4j when configured, otherwise fall back to the local
/// SQLite store.
pub async fn connect(store_path: &Path) -> Result<Arc<dyn GraphStore>> {
    match graph::Neo4jGraphStore::connect().await {
        Ok(g) => {
            tracing::info!("neo4j connected");
            return Ok(Arc::new(g));
        }
        Err(e) => {
            tracing::warn!("neo4j unavailable, using sqlite store: {}", e);
        }
    }

    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = sqlite::SqliteGraphStore::open(store_path)?;
    tracing::info!("sqlite store opened at {}", store_path.display());
    Ok(Arc::new(db))
}
