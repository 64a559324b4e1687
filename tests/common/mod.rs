#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use graph_lifecycle::classifier::{RatingClient, RawRating};
use graph_lifecycle::config::EngineConfig;
use graph_lifecycle::error::ClassifierError;
use graph_lifecycle::store::memory::InMemoryGraphStore;
use graph_lifecycle::types::{Entity, LifecycleState};
use graph_lifecycle::Engine;

/// Always returns the same raw rating and counts calls.
pub struct ScriptedClient {
    pub rating: RawRating,
    pub calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(importance: i64, stability: i64) -> Self {
        Self {
            rating: RawRating { importance, stability },
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RatingClient for ScriptedClient {
    async fn classify(&self, _text: &str) -> Result<RawRating, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rating)
    }
}

pub struct FailingClient;

#[async_trait]
impl RatingClient for FailingClient {
    async fn classify(&self, _text: &str) -> Result<RawRating, ClassifierError> {
        Err(ClassifierError::Unavailable("provider down".into()))
    }

    async fn classify_batch(&self, _texts: &[String]) -> Result<Vec<Option<RawRating>>, ClassifierError> {
        Err(ClassifierError::Unavailable("provider down".into()))
    }
}

/// Sleeps before answering each item.
pub struct SlowClient {
    pub delay: Duration,
}

#[async_trait]
impl RatingClient for SlowClient {
    async fn classify(&self, _text: &str) -> Result<RawRating, ClassifierError> {
        tokio::time::sleep(self.delay).await;
        Ok(RawRating { importance: 2, stability: 2 })
    }
}

pub fn engine_with(store: Arc<InMemoryGraphStore>, client: impl RatingClient + 'static, config: EngineConfig) -> Engine {
    Engine::new(store, Arc::new(client), Arc::new(config))
}

pub fn entity(id: &str, last_access_days_ago: i64, now: DateTime<Utc>) -> Entity {
    let mut e = Entity::new(id, format!("entity {}", id), now - ChronoDuration::days(last_access_days_ago));
    e.last_accessed_at = Some(now - ChronoDuration::days(last_access_days_ago));
    e
}

pub fn rated(id: &str, importance: u8, stability: u8, last_access_days_ago: i64, now: DateTime<Utc>) -> Entity {
    let mut e = entity(id, last_access_days_ago, now);
    e.importance = Some(importance);
    e.stability = Some(stability);
    e
}

pub fn in_state(mut e: Entity, state: LifecycleState, decay: f64) -> Entity {
    e.lifecycle_state = state;
    e.decay_score = decay;
    e
}
