use crate::config::EntityTypeDecayConfig;
use crate::types::{Rating, MAX_RATING, MIN_RATING};

/// Half-life scaling per stability level, 1 through 5.
const STABILITY_FACTORS: [f64; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

/// Rate dampening per importance level, 1 through 5.
const IMPORTANCE_DAMPENING: [f64; 5] = [1.0, 0.8, 0.6, 0.4, 0.2];

fn level_index(level: u8) -> usize {
    (level.clamp(MIN_RATING, MAX_RATING) - MIN_RATING) as usize
}

/// Stability 3 leaves the half-life unchanged; each step doubles or halves it.
pub fn default_stability_factor(stability: u8) -> f64 {
    STABILITY_FACTORS[level_index(stability)]
}

/// Importance 1 decays at the full rate, importance 5 at a fifth of it.
pub fn default_importance_dampening(importance: u8) -> f64 {
    IMPORTANCE_DAMPENING[level_index(importance)]
}

/// The two shaping curves of the decay formula. Both must be strictly
/// monotonic: stability factor increasing, importance dampening decreasing.
#[derive(Debug, Clone, Copy)]
pub struct DecayCurves {
    pub stability_factor: fn(u8) -> f64,
    pub importance_dampening: fn(u8) -> f64,
}

impl Default for DecayCurves {
    fn default() -> Self {
        Self {
            stability_factor: default_stability_factor,
            importance_dampening: default_importance_dampening,
        }
    }
}

/// Pure decay scoring: `1 - e^(-λ·d·t)` with `λ = ln2 / half_life`.
///
/// 0.0 is fresh, values approaching 1.0 are fully decayed. No clock reads;
/// elapsed time is always an explicit input.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayCalculator {
    curves: DecayCurves,
}

impl DecayCalculator {
    pub fn new(curves: DecayCurves) -> Self {
        Self { curves }
    }

    pub fn half_life_days(&self, stability: u8, config: &EntityTypeDecayConfig) -> f64 {
        config.base_half_life_days
            * (self.curves.stability_factor)(stability)
            * config.stability_multiplier
    }

    /// Decay score for `days_since_reference` elapsed days.
    ///
    /// A missing reference (`None`) counts as zero elapsed time; logging the
    /// anomaly is left to the caller.
    pub fn compute_decay(
        &self,
        importance: u8,
        stability: u8,
        days_since_reference: Option<f64>,
        config: &EntityTypeDecayConfig,
    ) -> f64 {
        let days = match days_since_reference {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => return 0.0,
        };

        let half_life = self.half_life_days(stability, config);
        if !(half_life.is_finite() && half_life > 0.0) {
            return 0.0;
        }

        let importance = importance.max(config.importance_floor);
        let lambda = std::f64::consts::LN_2 / half_life;
        let adjusted_rate = lambda * (self.curves.importance_dampening)(importance);

        (1.0 - (-adjusted_rate * days).exp()).clamp(0.0, 1.0)
    }

    /// Score for a rated entity. Permanent ratings never decay.
    pub fn score(
        &self,
        rating: Rating,
        days_since_reference: Option<f64>,
        config: &EntityTypeDecayConfig,
    ) -> f64 {
        if rating.is_permanent() {
            return 0.0;
        }
        self.compute_decay(rating.importance, rating.stability, days_since_reference, config)
    }
}
