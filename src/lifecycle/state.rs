//! Lifecycle state machine.
//!
//! ```text
//! ACTIVE -> DORMANT -> ARCHIVED -> EXPIRED -> SOFT_DELETED
//!    ^         |          |
//!    +---------+----------+   (reactivation on access)
//! ```
//!
//! Decay advances at most one tier per evaluation, and never before the entity
//! has spent `min_days_in_state` in its current state. EXPIRED only moves on
//! to SOFT_DELETED with operator confirmation. A permanent entity found in a
//! decayed tier goes straight back to ACTIVE.

use crate::config::{LifecycleThresholds, TierThreshold};
use crate::types::LifecycleState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionInput {
    pub current: LifecycleState,
    pub decay_score: f64,
    /// `None` when the entity has no access timestamp.
    pub days_since_access: Option<f64>,
    pub days_in_state: f64,
    pub is_permanent: bool,
    /// Operator confirmation for EXPIRED -> SOFT_DELETED.
    pub confirm_deletion: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub transitioned: bool,
    pub reactivated: bool,
}

impl Transition {
    fn stay(state: LifecycleState) -> Self {
        Self { from: state, to: state, transitioned: false, reactivated: false }
    }

    fn advance(from: LifecycleState, to: LifecycleState) -> Self {
        Self { from, to, transitioned: true, reactivated: false }
    }

    fn restore(from: LifecycleState) -> Self {
        Self { from, to: LifecycleState::Active, transitioned: true, reactivated: false }
    }

    fn reactivate(from: LifecycleState) -> Self {
        Self { from, to: LifecycleState::Active, transitioned: true, reactivated: true }
    }

    /// Metrics label, e.g. `DORMANT->ARCHIVED`.
    pub fn label(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleStateMachine {
    thresholds: LifecycleThresholds,
}

impl LifecycleStateMachine {
    pub fn new(thresholds: LifecycleThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &LifecycleThresholds {
        &self.thresholds
    }

    fn tier_threshold(&self, tier: LifecycleState) -> Option<&TierThreshold> {
        match tier {
            LifecycleState::Dormant => Some(&self.thresholds.dormant),
            LifecycleState::Archived => Some(&self.thresholds.archived),
            LifecycleState::Expired => Some(&self.thresholds.expired),
            _ => None,
        }
    }

    fn recently_accessed(&self, days_since_access: Option<f64>) -> bool {
        matches!(days_since_access, Some(d) if d <= self.thresholds.reactivation_window_days)
    }

    pub fn next_state(&self, input: TransitionInput) -> Transition {
        let current = input.current;

        if current.can_reactivate() && self.recently_accessed(input.days_since_access) {
            return Transition::reactivate(current);
        }

        if input.is_permanent {
            // SOFT_DELETED is an operator decision; only the operator undoes it.
            return match current {
                LifecycleState::Active | LifecycleState::SoftDeleted => Transition::stay(current),
                _ => Transition::restore(current),
            };
        }

        let next = match current.next_tier() {
            Some(next) => next,
            None => return Transition::stay(current),
        };
        if input.days_in_state < self.thresholds.min_days_in_state {
            return Transition::stay(current);
        }

        if next == LifecycleState::SoftDeleted {
            return if input.confirm_deletion {
                Transition::advance(current, next)
            } else {
                Transition::stay(current)
            };
        }

        let threshold = match self.tier_threshold(next) {
            Some(t) => t,
            None => return Transition::stay(current),
        };
        // A missing access timestamp never counts as inactivity.
        let inactive_days = input.days_since_access.unwrap_or(0.0);
        if input.decay_score >= threshold.min_decay && inactive_days >= threshold.min_days_inactive {
            Transition::advance(current, next)
        } else {
            Transition::stay(current)
        }
    }
}
