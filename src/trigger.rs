//! Post-write classification shortcut.
//!
//! Spawned right after new entities are queued for creation so they get a
//! rating within seconds instead of waiting for the next maintenance cycle.
//! The periodic cycle still classifies anything this task misses.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::classifier::ImportanceClassifier;
use crate::error::StoreError;
use crate::store::GraphStore;
use crate::types::{ClassificationBatchResult, Entity};

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Completed(ClassificationBatchResult),
    /// The overall budget ran out; ratings written before that are kept.
    TimedOut,
    Failed(String),
}

#[derive(Clone)]
pub struct ImmediateClassificationTrigger {
    store: Arc<dyn GraphStore>,
    classifier: Arc<ImportanceClassifier>,
    batch_size: usize,
    timeout: Duration,
    tasks: Arc<Mutex<JoinSet<TriggerOutcome>>>,
}

impl ImmediateClassificationTrigger {
    pub fn new(
        store: Arc<dyn GraphStore>,
        classifier: Arc<ImportanceClassifier>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            classifier,
            batch_size,
            timeout,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Start a bounded background pass and return immediately.
    ///
    /// Classifies `new_entities`, or one page of whatever the store reports as
    /// unclassified when the list is empty. The handle can be awaited or
    /// dropped; failures never reach the caller.
    pub fn spawn(&self, new_entities: Vec<Entity>) -> JoinHandle<TriggerOutcome> {
        let this = self.clone();
        tokio::spawn(async move { this.run_bounded(new_entities).await })
    }

    /// Like [`spawn`](Self::spawn), but the task is owned by the trigger so
    /// [`shutdown`](Self::shutdown) can wait for it.
    pub async fn spawn_tracked(&self, new_entities: Vec<Entity>) {
        let this = self.clone();
        let mut tasks = self.tasks.lock().await;
        // Reap finished tasks so the set only holds live ones.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { this.run_bounded(new_entities).await });
    }

    /// Number of tracked tasks not yet reaped.
    pub async fn pending_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait up to `grace` for tracked tasks, then abort the rest.
    pub async fn shutdown(&self, grace: Duration) {
        let mut tasks = self.tasks.lock().await;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("{} classification tasks still running at shutdown, aborting", tasks.len());
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    async fn run_bounded(&self, new_entities: Vec<Entity>) -> TriggerOutcome {
        match tokio::time::timeout(self.timeout, self.run(new_entities)).await {
            Ok(Ok(result)) => {
                debug!(
                    found = result.found,
                    classified = result.classified,
                    failed = result.failed,
                    already_classified = result.already_classified,
                    "immediate classification done"
                );
                TriggerOutcome::Completed(result)
            }
            Ok(Err(e)) => {
                warn!("immediate classification failed: {}", e);
                TriggerOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!("immediate classification exceeded {:?}, leaving the rest to maintenance", self.timeout);
                TriggerOutcome::TimedOut
            }
        }
    }

    async fn run(&self, new_entities: Vec<Entity>) -> Result<ClassificationBatchResult, StoreError> {
        let entities = if new_entities.is_empty() {
            self.store.find_unclassified_entities(self.batch_size).await?
        } else {
            self.current_unclassified(new_entities).await?
        };
        let outcome = self
            .classifier
            .classify(self.store.as_ref(), &entities, self.batch_size)
            .await;
        Ok(outcome.result)
    }

    /// Re-read the caller's entities; the snapshot may predate a rating
    /// written by maintenance or another trigger.
    async fn current_unclassified(&self, snapshot: Vec<Entity>) -> Result<Vec<Entity>, StoreError> {
        let mut pending = Vec::with_capacity(snapshot.len());
        for entity in snapshot {
            match self.store.get_entity(&entity.id).await? {
                Some(current) if !current.is_classified() => pending.push(current),
                Some(_) => debug!(entity_id = %entity.id, "already classified, skipping"),
                None => debug!(entity_id = %entity.id, "entity vanished before classification"),
            }
        }
        Ok(pending)
    }
}
