use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Type label whose decay parameters apply when an entity's own type has none.
pub const FALLBACK_ENTITY_TYPE: &str = "Entity";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntityTypeDecayConfig {
    pub base_half_life_days: f64,
    /// Importance used for decay never drops below this.
    pub importance_floor: u8,
    /// Extra half-life scaling applied on top of the stability factor.
    pub stability_multiplier: f64,
}

impl Default for EntityTypeDecayConfig {
    fn default() -> Self {
        Self {
            base_half_life_days: 180.0,
            importance_floor: 1,
            stability_multiplier: 1.0,
        }
    }
}

/// Entry condition for one lifecycle tier: both must hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierThreshold {
    pub min_decay: f64,
    pub min_days_inactive: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleThresholds {
    pub dormant: TierThreshold,
    pub archived: TierThreshold,
    pub expired: TierThreshold,
    /// Minimum time in a state before decay may advance it again.
    pub min_days_in_state: f64,
    /// A DORMANT or ARCHIVED entity accessed within this many days reactivates.
    pub reactivation_window_days: f64,
    /// Operator confirmation for EXPIRED -> SOFT_DELETED.
    pub purge_expired: bool,
}

impl Default for LifecycleThresholds {
    fn default() -> Self {
        Self {
            dormant: TierThreshold { min_decay: 0.3, min_days_inactive: 30.0 },
            archived: TierThreshold { min_decay: 0.6, min_days_inactive: 90.0 },
            expired: TierThreshold { min_decay: 0.9, min_days_inactive: 180.0 },
            min_days_in_state: 1.0,
            reactivation_window_days: 1.0,
            purge_expired: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassificationConfig {
    pub maintenance_batch_size: usize,
    pub immediate_batch_size: usize,
    pub batch_timeout_secs: u64,
    pub immediate_timeout_secs: u64,
    pub model: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            maintenance_batch_size: 500,
            immediate_batch_size: 100,
            batch_timeout_secs: 60,
            immediate_timeout_secs: 30,
            model: "claude-haiku-4-5-20251001".into(),
        }
    }
}

impl ClassificationConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn immediate_timeout(&self) -> Duration {
        Duration::from_secs(self.immediate_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub page_size: usize,
    pub interval_hours: u64,
    /// Decay changes smaller than this are not written back.
    pub score_epsilon: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            interval_hours: 24,
            score_epsilon: 1e-4,
        }
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.max(1) * 3600)
    }
}

/// Process-wide engine configuration. Loaded once, then shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub entity_types: BTreeMap<String, EntityTypeDecayConfig>,
    pub lifecycle: LifecycleThresholds,
    pub classification: ClassificationConfig,
    pub maintenance: MaintenanceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut entity_types = BTreeMap::new();
        entity_types.insert(FALLBACK_ENTITY_TYPE.to_string(), EntityTypeDecayConfig::default());
        Self {
            entity_types,
            lifecycle: LifecycleThresholds::default(),
            classification: ClassificationConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Decay parameters for a type label, falling back to the generic "Entity" entry.
    pub fn decay_for(&self, entity_type: &str) -> EntityTypeDecayConfig {
        self.entity_types
            .get(entity_type)
            .or_else(|| self.entity_types.get(FALLBACK_ENTITY_TYPE))
            .copied()
            .unwrap_or_default()
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let mut config: EngineConfig = serde_yaml::from_str(raw)?;
        config
            .entity_types
            .entry(FALLBACK_ENTITY_TYPE.to_string())
            .or_default();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Load from `LIFECYCLE_CONFIG` if set, otherwise use defaults.
    pub fn load() -> Result<Self> {
        match std::env::var("LIFECYCLE_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(&PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_half_life_is_180_days() {
        let config = EngineConfig::default();
        assert_eq!(config.decay_for("Entity").base_half_life_days, 180.0);
        assert_eq!(config.decay_for("Unknown").base_half_life_days, 180.0);
    }

    #[test]
    fn yaml_overrides_per_type_and_keeps_fallback() {
        let raw = r#"
entity_types:
  Indicator:
    base_half_life_days: 30
  ThreatActor:
    base_half_life_days: 365
    importance_floor: 3
lifecycle:
  purge_expired: true
maintenance:
  page_size: 50
"#;
        let config = EngineConfig::from_yaml(raw).unwrap();
        assert_eq!(config.decay_for("Indicator").base_half_life_days, 30.0);
        assert_eq!(config.decay_for("Indicator").stability_multiplier, 1.0);
        assert_eq!(config.decay_for("ThreatActor").importance_floor, 3);
        assert_eq!(config.decay_for("Entity").base_half_life_days, 180.0);
        assert!(config.lifecycle.purge_expired);
        assert_eq!(config.lifecycle.dormant.min_decay, 0.3);
        assert_eq!(config.maintenance.page_size, 50);
        assert_eq!(config.classification.immediate_batch_size, 100);
    }

    #[test]
    fn tier_thresholds_are_ordered() {
        let t = LifecycleThresholds::default();
        assert!(t.dormant.min_decay < t.archived.min_decay);
        assert!(t.archived.min_decay < t.expired.min_decay);
        assert!(t.reactivation_window_days < t.dormant.min_days_inactive);
        assert_eq!(t.min_days_in_state, 1.0);
    }
}
