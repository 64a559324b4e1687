//! Importance/stability classification with mandatory graceful degradation.
//!
//! Every entity handed to a pass ends with a rating: the model's, clamped
//! into range, or the `(3, 3)` default when the model cannot answer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{ClassifierError, StoreError};
use crate::store::GraphStore;
use crate::types::{ClassificationBatchResult, Entity, Rating, DEFAULT_RATING};

/// Raw ratings as returned by a model, before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRating {
    pub importance: i64,
    pub stability: i64,
}

impl RawRating {
    pub fn clamped(self) -> Rating {
        Rating::clamped(self.importance, self.stability)
    }
}

/// A rating provider: cloud API, local model, or a test double.
#[async_trait]
pub trait RatingClient: Send + Sync {
    async fn classify(&self, entity_text: &str) -> Result<RawRating, ClassifierError>;

    /// Rate several texts at once. The result is positional; `None` marks an
    /// item the provider could not rate. Providers with a native batch call
    /// override this.
    async fn classify_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<Option<RawRating>>, ClassifierError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            match self.classify(text).await {
                Ok(r) => out.push(Some(r)),
                Err(e) => {
                    debug!("single classification failed: {}", e);
                    out.push(None);
                }
            }
        }
        Ok(out)
    }
}

/// One rating decided by a pass, whether persisted or not.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub entity_id: String,
    pub rating: Rating,
    pub from_model: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationOutcome {
    pub result: ClassificationBatchResult,
    pub assignments: Vec<Assignment>,
}

pub struct ImportanceClassifier {
    client: Arc<dyn RatingClient>,
    batch_timeout: Duration,
}

impl ImportanceClassifier {
    pub fn new(client: Arc<dyn RatingClient>, batch_timeout: Duration) -> Self {
        Self { client, batch_timeout }
    }

    /// Decide ratings for `entities` in batches of `max_batch_size`.
    /// Already-classified entities are skipped. Nothing is written.
    pub async fn rate(&self, entities: &[Entity], max_batch_size: usize) -> ClassificationOutcome {
        let pending: Vec<&Entity> = entities.iter().filter(|e| !e.is_classified()).collect();
        let mut outcome = ClassificationOutcome::default();

        for chunk in pending.chunks(max_batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|e| e.classification_text()).collect();
            let mut batch = ClassificationBatchResult {
                found: chunk.len(),
                using_llm: true,
                ..Default::default()
            };

            let ratings = match tokio::time::timeout(self.batch_timeout, self.client.classify_batch(&texts)).await {
                Ok(Ok(ratings)) => ratings,
                Ok(Err(e)) => {
                    warn!("classification batch of {} failed, using defaults: {}", chunk.len(), e);
                    batch.using_llm = false;
                    Vec::new()
                }
                Err(_) => {
                    let e = ClassifierError::Timeout(self.batch_timeout);
                    warn!("classification batch of {} failed, using defaults: {}", chunk.len(), e);
                    batch.using_llm = false;
                    Vec::new()
                }
            };

            for (idx, entity) in chunk.iter().enumerate() {
                let (rating, from_model) = match ratings.get(idx).copied().flatten() {
                    Some(raw) => (raw.clamped(), true),
                    None => (DEFAULT_RATING, false),
                };
                if from_model {
                    batch.classified += 1;
                } else {
                    batch.failed += 1;
                }
                outcome.assignments.push(Assignment {
                    entity_id: entity.id.clone(),
                    rating,
                    from_model,
                });
            }
            outcome.result.merge(&batch);
        }
        outcome
    }

    /// Rate and persist. Entities whose write fails are counted in
    /// `write_errors` and left unclassified for a later pass. Entities some
    /// other pass rated first keep that rating and count as
    /// `already_classified`.
    pub async fn classify(
        &self,
        store: &dyn GraphStore,
        entities: &[Entity],
        max_batch_size: usize,
    ) -> ClassificationOutcome {
        let mut outcome = self.rate(entities, max_batch_size).await;
        let mut persisted = Vec::with_capacity(outcome.assignments.len());

        for assignment in outcome.assignments.drain(..) {
            match store.write_classification(&assignment.entity_id, assignment.rating).await {
                Ok(true) => persisted.push(assignment),
                Ok(false) => {
                    debug!(entity_id = %assignment.entity_id, "already classified, keeping stored rating");
                    if assignment.from_model {
                        outcome.result.classified = outcome.result.classified.saturating_sub(1);
                    } else {
                        outcome.result.failed = outcome.result.failed.saturating_sub(1);
                    }
                    outcome.result.already_classified += 1;
                }
                Err(e) => {
                    warn!(entity_id = %assignment.entity_id, "classification write failed: {}", e);
                    outcome.result.write_errors += 1;
                }
            }
        }
        outcome.assignments = persisted;
        outcome
    }

    /// Classify everything the store reports as unclassified, one page of
    /// `max_batch_size` at a time. Each entity is attempted at most once per
    /// pass. With `persist == false` ratings are decided but not written.
    pub async fn classify_pending(
        &self,
        store: &dyn GraphStore,
        max_batch_size: usize,
        persist: bool,
    ) -> Result<ClassificationOutcome, StoreError> {
        let page_size = max_batch_size.max(1);
        let total = if persist {
            self.persist_unclassified(store, page_size).await?
        } else {
            self.rate_unclassified(store, page_size).await?
        };

        if total.result.found > 0 {
            info!(
                found = total.result.found,
                classified = total.result.classified,
                failed = total.result.failed,
                already_classified = total.result.already_classified,
                using_llm = total.result.using_llm,
                "classification pass complete"
            );
        }
        Ok(total)
    }

    async fn persist_unclassified(
        &self,
        store: &dyn GraphStore,
        page_size: usize,
    ) -> Result<ClassificationOutcome, StoreError> {
        let mut total = ClassificationOutcome::default();
        // Attempted this pass but still unclassified in the store.
        let mut skip: HashSet<String> = HashSet::new();

        loop {
            let limit = page_size + skip.len();
            let fetched = store.find_unclassified_entities(limit).await?;
            let exhausted = fetched.len() < limit;
            let entities: Vec<Entity> = fetched
                .into_iter()
                .filter(|e| !skip.contains(&e.id))
                .take(page_size)
                .collect();
            if entities.is_empty() {
                break;
            }

            let outcome = self.classify(store, &entities, page_size).await;
            let persisted: HashSet<&str> = outcome.assignments.iter().map(|a| a.entity_id.as_str()).collect();
            skip.extend(
                entities
                    .iter()
                    .filter(|e| !persisted.contains(e.id.as_str()))
                    .map(|e| e.id.clone()),
            );
            total.result.merge(&outcome.result);
            total.assignments.extend(outcome.assignments);

            if exhausted {
                break;
            }
        }
        Ok(total)
    }

    /// Nothing is written, so the unclassified set never shrinks; walk the
    /// whole store with a cursor instead.
    async fn rate_unclassified(
        &self,
        store: &dyn GraphStore,
        page_size: usize,
    ) -> Result<ClassificationOutcome, StoreError> {
        let mut total = ClassificationOutcome::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = store.get_all_entities(cursor.as_deref(), page_size).await?;
            let pending: Vec<Entity> = page.entities.into_iter().filter(|e| !e.is_classified()).collect();
            if !pending.is_empty() {
                let outcome = self.rate(&pending, page_size).await;
                total.result.merge(&outcome.result);
                total.assignments.extend(outcome.assignments);
            }

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }
        Ok(total)
    }
}
