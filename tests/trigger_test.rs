mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use common::*;
use graph_lifecycle::config::EngineConfig;
use graph_lifecycle::store::memory::InMemoryGraphStore;
use graph_lifecycle::store::GraphStore;
use graph_lifecycle::trigger::{ImmediateClassificationTrigger, TriggerOutcome};
use graph_lifecycle::types::Rating;

// ── Completion ───────────────────────────────────────────────────────────

#[tokio::test]
async fn new_entities_are_rated_right_after_creation() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let fresh = vec![entity("n1", 0, now), entity("n2", 0, now)];
    for e in &fresh {
        store.insert(e.clone()).await;
    }
    let engine = engine_with(store.clone(), ScriptedClient::new(4, 2), EngineConfig::default());

    let outcome = engine.trigger.spawn(fresh).await.unwrap();
    match outcome {
        TriggerOutcome::Completed(result) => {
            assert_eq!(result.found, 2);
            assert_eq!(result.classified, 2);
            assert!(result.using_llm);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    for id in ["n1", "n2"] {
        let e = store.get_entity(id).await.unwrap().unwrap();
        assert_eq!((e.importance, e.stability), (Some(4), Some(2)));
    }
}

#[tokio::test]
async fn empty_request_picks_up_the_unclassified_backlog() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    store.insert(entity("backlog", 3, now)).await;
    store.insert(rated("done", 2, 2, 3, now)).await;
    let client = ScriptedClient::new(2, 5);
    let engine = engine_with(store.clone(), client, EngineConfig::default());

    let outcome = engine.trigger.spawn(Vec::new()).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Completed(r) if r.found == 1));
    assert!(store.find_unclassified_entities(10).await.unwrap().is_empty());
    let done = store.get_entity("done").await.unwrap().unwrap();
    assert_eq!((done.importance, done.stability), (Some(2), Some(2)));
}

#[tokio::test]
async fn already_classified_entities_are_not_sent_to_the_provider() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let known = rated("known", 3, 3, 0, now);
    store.insert(known.clone()).await;
    let client = Arc::new(ScriptedClient::new(5, 5));
    let engine = graph_lifecycle::Engine::new(store.clone(), client.clone(), Arc::new(EngineConfig::default()));

    let outcome = engine.trigger.spawn(vec![known]).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Completed(r) if r.found == 0));
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stale_snapshot_never_overwrites_a_rating_written_meanwhile() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let snapshot = entity("n", 0, now);
    store.insert(snapshot.clone()).await;
    store
        .write_classification("n", Rating { importance: 5, stability: 5 })
        .await
        .unwrap();
    let engine = engine_with(store.clone(), FailingClient, EngineConfig::default());

    let outcome = engine.trigger.spawn(vec![snapshot]).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Completed(r) if r.found == 0));
    let n = store.get_entity("n").await.unwrap().unwrap();
    assert_eq!((n.importance, n.stability), (Some(5), Some(5)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overlapping_trigger_and_maintenance_rate_each_entity_once() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let fresh: Vec<_> = (0..20).map(|i| entity(&format!("o{i:02}"), 0, now)).collect();
    for e in &fresh {
        store.insert(e.clone()).await;
    }
    let maintenance = engine_with(store.clone(), ScriptedClient::new(5, 5), EngineConfig::default());
    let trigger = engine_with(store.clone(), ScriptedClient::new(2, 2), EngineConfig::default());

    let handle = trigger.trigger.spawn(fresh);
    let report = maintenance.orchestrator.run_maintenance_cycle_at(now, false).await;
    let outcome = handle.await.unwrap();

    let triggered = match outcome {
        TriggerOutcome::Completed(result) => result,
        other => panic!("unexpected outcome: {:?}", other),
    };
    // Fresh entities never decay, so every write is a classification.
    assert_eq!(store.write_count(), 20);
    assert_eq!(report.classified + triggered.classified, 20);
    for e in store.snapshot().await {
        let rating = e.rating().unwrap();
        assert!(
            rating == Rating { importance: 5, stability: 5 } || rating == Rating { importance: 2, stability: 2 },
            "{}: {:?}",
            e.id,
            rating
        );
    }
}

// ── Degradation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn provider_outage_falls_back_to_default_ratings() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let fresh = entity("n", 0, now);
    store.insert(fresh.clone()).await;
    let engine = engine_with(store.clone(), FailingClient, EngineConfig::default());

    let outcome = engine.trigger.spawn(vec![fresh]).await.unwrap();
    match outcome {
        TriggerOutcome::Completed(result) => {
            assert!(!result.using_llm);
            assert_eq!(result.failed, 1);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let e = store.get_entity("n").await.unwrap().unwrap();
    assert_eq!((e.importance, e.stability), (Some(3), Some(3)));
}

#[tokio::test]
async fn timed_out_entities_are_left_for_maintenance() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let fresh = vec![entity("s1", 0, now), entity("s2", 0, now)];
    for e in &fresh {
        store.insert(e.clone()).await;
    }
    let slow = engine_with(
        store.clone(),
        SlowClient { delay: Duration::from_secs(5) },
        EngineConfig::default(),
    );
    let trigger = ImmediateClassificationTrigger::new(
        store.clone(),
        slow.classifier.clone(),
        100,
        Duration::from_millis(50),
    );

    let outcome = trigger.spawn(fresh).await.unwrap();
    assert_eq!(outcome, TriggerOutcome::TimedOut);
    assert_eq!(store.find_unclassified_entities(10).await.unwrap().len(), 2);

    let healthy = engine_with(store.clone(), ScriptedClient::new(2, 3), EngineConfig::default());
    let report = healthy.orchestrator.run_maintenance_cycle(false).await;
    assert_eq!(report.classification.found, 2);
    assert!(store.find_unclassified_entities(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn store_outage_inside_the_task_is_reported_not_raised() {
    let store = Arc::new(InMemoryGraphStore::new());
    store.insert(entity("x", 0, Utc::now())).await;
    store.set_unavailable(true);
    let engine = engine_with(store.clone(), ScriptedClient::new(3, 3), EngineConfig::default());

    let outcome = engine.trigger.spawn(Vec::new()).await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Failed(ref msg) if msg.contains("unavailable")));

    store.set_unavailable(false);
    assert!(!store.get_entity("x").await.unwrap().unwrap().is_classified());
}

// ── Tracked tasks ────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_waits_for_tracked_classification() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let fresh = entity("t", 0, now);
    store.insert(fresh.clone()).await;
    let engine = engine_with(
        store.clone(),
        SlowClient { delay: Duration::from_millis(50) },
        EngineConfig::default(),
    );

    engine.trigger.spawn_tracked(vec![fresh]).await;
    assert_eq!(engine.trigger.pending_tasks().await, 1);
    engine.trigger.shutdown(Duration::from_secs(5)).await;

    assert_eq!(engine.trigger.pending_tasks().await, 0);
    assert!(store.get_entity("t").await.unwrap().unwrap().is_classified());
}

#[tokio::test]
async fn shutdown_aborts_tasks_past_the_grace_period() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let fresh = entity("t", 0, now);
    store.insert(fresh.clone()).await;
    let engine = engine_with(
        store.clone(),
        SlowClient { delay: Duration::from_secs(10) },
        EngineConfig::default(),
    );

    engine.trigger.spawn_tracked(vec![fresh]).await;
    engine.trigger.shutdown(Duration::from_millis(50)).await;

    assert_eq!(engine.trigger.pending_tasks().await, 0);
    assert!(!store.get_entity("t").await.unwrap().unwrap().is_classified());
}

// ── Non-blocking ─────────────────────────────────────────────────────────

#[tokio::test]
async fn spawn_returns_before_classification_finishes() {
    let now = Utc::now();
    let store = Arc::new(InMemoryGraphStore::new());
    let fresh = entity("w", 0, now);
    store.insert(fresh.clone()).await;
    let engine = engine_with(
        store.clone(),
        SlowClient { delay: Duration::from_millis(300) },
        EngineConfig::default(),
    );

    let started = Instant::now();
    let handle = engine.trigger.spawn(vec![fresh]);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!store.get_entity("w").await.unwrap().unwrap().is_classified());

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, TriggerOutcome::Completed(_)));
    assert!(store.get_entity("w").await.unwrap().unwrap().is_classified());
}
