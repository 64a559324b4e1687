pub mod access;
pub mod decay;
pub mod maintenance;
pub mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::types::{Entity, LifecycleState, Rating, DEFAULT_RATING};

pub use access::{record_access, AccessOutcome};
pub use decay::{DecayCalculator, DecayCurves};
pub use maintenance::{MaintenanceOrchestrator, MaintenanceReport};
pub use state::{LifecycleStateMachine, Transition, TransitionInput};

/// Freshly derived decay and lifecycle state for one entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub decay_score: f64,
    pub is_permanent: bool,
    pub next_state: LifecycleState,
    pub transitioned: bool,
    pub reactivated: bool,
    pub from_state: LifecycleState,
}

impl Evaluation {
    fn transition(&self) -> Transition {
        Transition {
            from: self.from_state,
            to: self.next_state,
            transitioned: self.transitioned,
            reactivated: self.reactivated,
        }
    }

    pub fn label(&self) -> String {
        self.transition().label()
    }
}

/// Decay calculator and state machine bound to one configuration.
#[derive(Debug, Clone)]
pub struct LifecycleEvaluator {
    calculator: DecayCalculator,
    state_machine: LifecycleStateMachine,
    config: Arc<EngineConfig>,
}

impl LifecycleEvaluator {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self::with_curves(config, DecayCurves::default())
    }

    pub fn with_curves(config: Arc<EngineConfig>, curves: DecayCurves) -> Self {
        Self {
            calculator: DecayCalculator::new(curves),
            state_machine: LifecycleStateMachine::new(config.lifecycle.clone()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Derive decay and next state from current attributes and `now`.
    ///
    /// `rating` overrides the stored one (ratings decided but not yet
    /// persisted); unrated entities are scored with the default rating.
    pub fn evaluate(&self, entity: &Entity, rating: Option<Rating>, now: DateTime<Utc>) -> Evaluation {
        let rating = rating.or_else(|| entity.rating()).unwrap_or(DEFAULT_RATING);
        let days = entity.days_since_access(now);
        if days.is_none() {
            warn!(entity_id = %entity.id, "entity has no last_accessed_at, treating as fresh");
        }

        let type_config = self.config.decay_for(&entity.entity_type);
        let decay_score = self.calculator.score(rating, days, &type_config);
        let transition = self.state_machine.next_state(TransitionInput {
            current: entity.lifecycle_state,
            decay_score,
            days_since_access: days,
            days_in_state: entity.days_in_state(now),
            is_permanent: rating.is_permanent(),
            confirm_deletion: self.config.lifecycle.purge_expired,
        });

        Evaluation {
            decay_score,
            is_permanent: rating.is_permanent(),
            next_state: transition.to,
            transitioned: transition.transitioned,
            reactivated: transition.reactivated,
            from_state: transition.from,
        }
    }
}

/// Per-entity event for the metrics collaborator.
pub(crate) fn emit_transition(entity_id: &str, evaluation: &Evaluation) {
    if evaluation.reactivated {
        info!(
            target: "lifecycle",
            entity_id,
            from_state = %evaluation.from_state,
            to_state = %evaluation.next_state,
            "entity reactivated"
        );
    } else {
        info!(
            target: "lifecycle",
            entity_id,
            from_state = %evaluation.from_state,
            to_state = %evaluation.next_state,
            "lifecycle transition"
        );
    }
}
