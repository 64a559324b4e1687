use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{EntityPage, GraphStore};
use crate::types::{Entity, LifecycleState, Rating};

/// Process-local store keyed by entity id. Counts writes so callers can
/// check idempotence, and can be told to reject writes for given ids or to
/// fail every read.
#[derive(Default)]
pub struct InMemoryGraphStore {
    entities: RwLock<BTreeMap<String, Entity>>,
    failing_writes: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entity: Entity) {
        self.entities.write().await.insert(entity.id.clone(), entity);
    }

    pub async fn snapshot(&self) -> Vec<Entity> {
        self.entities.read().await.values().cloned().collect()
    }

    /// Make every subsequent write for `id` fail.
    pub async fn fail_writes_for(&self, id: &str) {
        self.failing_writes.write().await.insert(id.to_string());
    }

    /// Make every read fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Attribute writes performed so far (classification, decay/state, access).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_readable(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".into()));
        }
        Ok(())
    }

    async fn check_writable(&self, id: &str) -> StoreResult<()> {
        if self.failing_writes.read().await.contains(id) {
            return Err(StoreError::WriteFailure {
                id: id.to_string(),
                reason: "write rejected".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find_unclassified_entities(&self, limit: usize) -> StoreResult<Vec<Entity>> {
        self.check_readable()?;
        let entities = self.entities.read().await;
        Ok(entities
            .values()
            .filter(|e| !e.is_classified())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_all_entities(&self, cursor: Option<&str>, limit: usize) -> StoreResult<EntityPage> {
        self.check_readable()?;
        let entities = self.entities.read().await;
        let limit = limit.max(1);
        let mut page: Vec<Entity> = match cursor {
            Some(after) => entities
                .range::<str, _>((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .map(|(_, e)| e.clone())
                .take(limit + 1)
                .collect(),
            None => entities.values().take(limit + 1).cloned().collect(),
        };

        let next_cursor = if page.len() > limit {
            page.truncate(limit);
            page.last().map(|e| e.id.clone())
        } else {
            None
        };
        Ok(EntityPage { entities: page, next_cursor })
    }

    async fn get_entity(&self, id: &str) -> StoreResult<Option<Entity>> {
        self.check_readable()?;
        Ok(self.entities.read().await.get(id).cloned())
    }

    async fn write_classification(&self, id: &str, rating: Rating) -> StoreResult<bool> {
        self.check_writable(id).await?;
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if entity.is_classified() {
            return Ok(false);
        }
        entity.importance = Some(rating.importance);
        entity.stability = Some(rating.stability);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn write_decay_and_state(
        &self,
        id: &str,
        decay_score: f64,
        state: LifecycleState,
        state_changed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.check_writable(id).await?;
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entity.decay_score = decay_score;
        entity.lifecycle_state = state;
        if state_changed_at.is_some() {
            entity.state_changed_at = state_changed_at;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> StoreResult<Entity> {
        self.check_writable(id).await?;
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entity.access_count += 1;
        entity.last_accessed_at = Some(at);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(entity.clone())
    }

    async fn create_entity(&self, entity: &Entity) -> StoreResult<()> {
        self.insert(entity.clone()).await;
        Ok(())
    }
}
