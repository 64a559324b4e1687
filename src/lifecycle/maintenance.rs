//! Maintenance cycle: classify -> rescore -> transition over every entity.
//!
//! A cycle always returns a report. Provider outages degrade classification
//! to default ratings; store failures are counted in `errors` and the cycle
//! carries on with whatever it can still reach.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::ImportanceClassifier;
use crate::lifecycle::{emit_transition, Evaluation, LifecycleEvaluator};
use crate::store::GraphStore;
use crate::types::{ClassificationBatchResult, Entity, LifecycleState, Rating};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MaintenanceReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    /// False when writes were suppressed.
    pub persisted: bool,
    pub classification: ClassificationBatchResult,
    /// Entities that received a rating this cycle, model-derived or default.
    pub classified: usize,
    pub scanned: usize,
    pub rescored: usize,
    pub transitioned: usize,
    pub reactivated: usize,
    /// Forward transitions keyed by `FROM->TO`.
    pub transitions: BTreeMap<String, usize>,
    /// Reactivations keyed by the state they left.
    pub reactivations: BTreeMap<String, usize>,
    pub errors: usize,
}

impl MaintenanceReport {
    fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            cycle_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            duration_ms: 0,
            dry_run,
            persisted: !dry_run,
            classification: ClassificationBatchResult::default(),
            classified: 0,
            scanned: 0,
            rescored: 0,
            transitioned: 0,
            reactivated: 0,
            transitions: BTreeMap::new(),
            reactivations: BTreeMap::new(),
            errors: 0,
        }
    }

    fn record_transition(&mut self, evaluation: &Evaluation) {
        if evaluation.reactivated {
            self.reactivated += 1;
            *self
                .reactivations
                .entry(evaluation.from_state.as_str().to_string())
                .or_default() += 1;
        } else {
            self.transitioned += 1;
            *self.transitions.entry(evaluation.label()).or_default() += 1;
        }
    }
}

pub struct MaintenanceOrchestrator {
    store: Arc<dyn GraphStore>,
    classifier: Arc<ImportanceClassifier>,
    evaluator: LifecycleEvaluator,
}

impl MaintenanceOrchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        classifier: Arc<ImportanceClassifier>,
        evaluator: LifecycleEvaluator,
    ) -> Self {
        Self { store, classifier, evaluator }
    }

    pub async fn run_maintenance_cycle(&self, dry_run: bool) -> MaintenanceReport {
        self.run_maintenance_cycle_at(Utc::now(), dry_run).await
    }

    /// Run one cycle as of `now`. With `dry_run` every step is computed but
    /// nothing is written.
    pub async fn run_maintenance_cycle_at(&self, now: DateTime<Utc>, dry_run: bool) -> MaintenanceReport {
        let started = Instant::now();
        let mut report = MaintenanceReport::new(now, dry_run);
        info!(cycle_id = %report.cycle_id, dry_run, "maintenance cycle started");

        let ratings = self.classify_step(dry_run, &mut report).await;
        self.rescore_step(now, dry_run, &ratings, &mut report).await;

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            cycle_id = %report.cycle_id,
            dry_run,
            classified = report.classified,
            using_llm = report.classification.using_llm,
            scanned = report.scanned,
            rescored = report.rescored,
            transitioned = report.transitioned,
            reactivated = report.reactivated,
            errors = report.errors,
            duration_ms = report.duration_ms,
            "maintenance cycle complete"
        );
        report
    }

    /// Rate every unclassified entity. Returns the decided ratings so a dry
    /// run can score with them without having written them.
    async fn classify_step(&self, dry_run: bool, report: &mut MaintenanceReport) -> HashMap<String, Rating> {
        let batch_size = self.evaluator.config().classification.maintenance_batch_size;
        match self
            .classifier
            .classify_pending(self.store.as_ref(), batch_size, !dry_run)
            .await
        {
            Ok(outcome) => {
                report.classification = outcome.result;
                report.classified = outcome.assignments.len();
                report.errors += outcome.result.write_errors;
                outcome
                    .assignments
                    .into_iter()
                    .map(|a| (a.entity_id, a.rating))
                    .collect()
            }
            Err(e) => {
                warn!(cycle_id = %report.cycle_id, "classification step failed: {}", e);
                report.errors += 1;
                HashMap::new()
            }
        }
    }

    /// Recompute decay and evaluate transitions, page by page. Decay is
    /// derived first because the transition depends on the fresh value.
    async fn rescore_step(
        &self,
        now: DateTime<Utc>,
        dry_run: bool,
        ratings: &HashMap<String, Rating>,
        report: &mut MaintenanceReport,
    ) {
        let page_size = self.evaluator.config().maintenance.page_size;
        let mut cursor: Option<String> = None;

        loop {
            let page = match self.store.get_all_entities(cursor.as_deref(), page_size).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(cycle_id = %report.cycle_id, "entity scan failed: {}", e);
                    report.errors += 1;
                    break;
                }
            };

            for entity in &page.entities {
                self.maintain_entity(entity, ratings.get(&entity.id).copied(), now, dry_run, report)
                    .await;
            }

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }
    }

    async fn maintain_entity(
        &self,
        entity: &Entity,
        rating: Option<Rating>,
        now: DateTime<Utc>,
        dry_run: bool,
        report: &mut MaintenanceReport,
    ) {
        // Logically removed; only an operator brings these back.
        if entity.lifecycle_state == LifecycleState::SoftDeleted {
            return;
        }
        report.scanned += 1;

        let evaluation = self.evaluator.evaluate(entity, rating, now);
        let epsilon = self.evaluator.config().maintenance.score_epsilon;
        let rescored = (evaluation.decay_score - entity.decay_score).abs() > epsilon;
        if !rescored && !evaluation.transitioned {
            return;
        }

        if !dry_run {
            let changed_at = evaluation.transitioned.then_some(now);
            if let Err(e) = self
                .store
                .write_decay_and_state(&entity.id, evaluation.decay_score, evaluation.next_state, changed_at)
                .await
            {
                warn!(entity_id = %entity.id, "decay/state write failed: {}", e);
                report.errors += 1;
                return;
            }
        }

        if rescored {
            report.rescored += 1;
            debug!(
                entity_id = %entity.id,
                from = entity.decay_score,
                to = evaluation.decay_score,
                "decay rescored"
            );
        }
        if evaluation.transitioned {
            report.record_transition(&evaluation);
            emit_transition(&entity.id, &evaluation);
        }
    }
}
