use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreResult;
use crate::lifecycle::{emit_transition, LifecycleEvaluator};
use crate::store::GraphStore;
use crate::types::{Entity, LifecycleState};

#[derive(Debug, Clone, Serialize)]
pub struct AccessOutcome {
    pub entity: Entity,
    /// Set when the access moved the entity back to ACTIVE.
    pub reactivated_from: Option<LifecycleState>,
}

/// Record a read/search hit and reactivate DORMANT or ARCHIVED entities on
/// the spot, without waiting for the next maintenance cycle.
pub async fn record_access(
    store: &dyn GraphStore,
    evaluator: &LifecycleEvaluator,
    id: &str,
    now: DateTime<Utc>,
) -> StoreResult<AccessOutcome> {
    let mut entity = store.record_access(id, now).await?;
    let evaluation = evaluator.evaluate(&entity, None, now);

    if !evaluation.reactivated {
        return Ok(AccessOutcome { entity, reactivated_from: None });
    }

    store
        .write_decay_and_state(id, evaluation.decay_score, evaluation.next_state, Some(now))
        .await?;
    emit_transition(id, &evaluation);

    entity.decay_score = evaluation.decay_score;
    entity.lifecycle_state = evaluation.next_state;
    entity.state_changed_at = Some(now);
    Ok(AccessOutcome {
        entity,
        reactivated_from: Some(evaluation.from_state),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::memory::InMemoryGraphStore;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn archived_entity_reactivates_on_access() {
        let store = InMemoryGraphStore::new();
        let now = Utc::now();
        let mut e = Entity::new("a", "old project", now - Duration::days(400));
        e.last_accessed_at = Some(now - Duration::days(400));
        e.importance = Some(2);
        e.stability = Some(2);
        e.lifecycle_state = LifecycleState::Archived;
        e.decay_score = 0.95;
        store.insert(e).await;

        let evaluator = LifecycleEvaluator::new(Arc::new(EngineConfig::default()));
        let outcome = record_access(&store, &evaluator, "a", now).await.unwrap();
        assert_eq!(outcome.reactivated_from, Some(LifecycleState::Archived));
        assert_eq!(outcome.entity.lifecycle_state, LifecycleState::Active);
        assert_eq!(outcome.entity.access_count, 1);

        let stored = store.get_entity("a").await.unwrap().unwrap();
        assert_eq!(stored.lifecycle_state, LifecycleState::Active);
        assert_eq!(stored.decay_score, 0.0);
    }

    #[tokio::test]
    async fn active_entity_access_only_touches() {
        let store = InMemoryGraphStore::new();
        let now = Utc::now();
        store.insert(Entity::new("a", "a", now)).await;

        let evaluator = LifecycleEvaluator::new(Arc::new(EngineConfig::default()));
        let outcome = record_access(&store, &evaluator, "a", now).await.unwrap();
        assert!(outcome.reactivated_from.is_none());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn unknown_entity_is_an_error() {
        let store = InMemoryGraphStore::new();
        let evaluator = LifecycleEvaluator::new(Arc::new(EngineConfig::default()));
        assert!(record_access(&store, &evaluator, "nope", Utc::now()).await.is_err());
    }
}
