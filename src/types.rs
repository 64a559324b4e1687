use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Rating assigned when the classifier cannot produce one.
pub const DEFAULT_RATING: Rating = Rating { importance: 3, stability: 3 };

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Active,
    Dormant,
    Archived,
    Expired,
    SoftDeleted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "ACTIVE",
            LifecycleState::Dormant => "DORMANT",
            LifecycleState::Archived => "ARCHIVED",
            LifecycleState::Expired => "EXPIRED",
            LifecycleState::SoftDeleted => "SOFT_DELETED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Some(LifecycleState::Active),
            "DORMANT" => Some(LifecycleState::Dormant),
            "ARCHIVED" => Some(LifecycleState::Archived),
            "EXPIRED" => Some(LifecycleState::Expired),
            "SOFT_DELETED" => Some(LifecycleState::SoftDeleted),
            _ => None,
        }
    }

    /// The tier decay advances to from here, if any.
    pub fn next_tier(&self) -> Option<Self> {
        match self {
            LifecycleState::Active => Some(LifecycleState::Dormant),
            LifecycleState::Dormant => Some(LifecycleState::Archived),
            LifecycleState::Archived => Some(LifecycleState::Expired),
            LifecycleState::Expired => Some(LifecycleState::SoftDeleted),
            LifecycleState::SoftDeleted => None,
        }
    }

    pub fn can_reactivate(&self) -> bool {
        matches!(self, LifecycleState::Dormant | LifecycleState::Archived)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An (importance, stability) pair, each in `[1, 5]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rating {
    pub importance: u8,
    pub stability: u8,
}

impl Rating {
    /// Clamp raw classifier output into range. Out-of-range values are
    /// corrected, never rejected.
    pub fn clamped(importance: i64, stability: i64) -> Self {
        Self {
            importance: clamp_rating(importance),
            stability: clamp_rating(stability),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.importance >= 4 && self.stability >= 4
    }
}

pub fn clamp_rating(raw: i64) -> u8 {
    raw.clamp(MIN_RATING as i64, MAX_RATING as i64) as u8
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub summary: Option<String>,
    /// Type label used to select decay parameters, e.g. "Entity" or "ThreatActor".
    pub entity_type: String,
    pub importance: Option<u8>,
    pub stability: Option<u8>,
    pub lifecycle_state: LifecycleState,
    pub decay_score: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    /// When `lifecycle_state` last changed; `None` means never since creation.
    pub state_changed_at: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            summary: None,
            entity_type: "Entity".into(),
            importance: None,
            stability: None,
            lifecycle_state: LifecycleState::Active,
            decay_score: 0.0,
            created_at: now,
            last_accessed_at: Some(now),
            access_count: 0,
            state_changed_at: None,
        }
    }

    pub fn rating(&self) -> Option<Rating> {
        match (self.importance, self.stability) {
            (Some(importance), Some(stability)) => Some(Rating { importance, stability }),
            _ => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.rating().is_some()
    }

    pub fn is_permanent(&self) -> bool {
        self.rating().map(|r| r.is_permanent()).unwrap_or(false)
    }

    /// Text handed to the classifier.
    pub fn classification_text(&self) -> String {
        match &self.summary {
            Some(summary) if !summary.is_empty() => {
                format!("{} ({}): {}", self.name, self.entity_type, summary)
            }
            _ => format!("{} ({})", self.name, self.entity_type),
        }
    }

    /// Days since last access, or `None` if the timestamp is missing.
    /// Clock skew into the future counts as zero.
    pub fn days_since_access(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_accessed_at
            .map(|at| (now - at).num_seconds().max(0) as f64 / 86_400.0)
    }

    /// Days spent in the current lifecycle state.
    pub fn days_in_state(&self, now: DateTime<Utc>) -> f64 {
        let since = self.state_changed_at.unwrap_or(self.created_at);
        (now - since).num_seconds().max(0) as f64 / 86_400.0
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationBatchResult {
    pub found: usize,
    pub classified: usize,
    pub failed: usize,
    pub using_llm: bool,
    /// Entities whose rating could not be persisted; they stay unclassified
    /// and are retried on the next pass.
    pub write_errors: usize,
    /// Entities another pass rated between our read and our write. Their
    /// stored rating is kept.
    #[serde(default)]
    pub already_classified: usize,
}

impl ClassificationBatchResult {
    pub fn merge(&mut self, other: &ClassificationBatchResult) {
        // A pass counts as LLM-backed only if every batch in it was.
        let using_llm = if self.found == 0 {
            other.using_llm
        } else if other.found == 0 {
            self.using_llm
        } else {
            self.using_llm && other.using_llm
        };
        self.found += other.found;
        self.classified += other.classified;
        self.failed += other.failed;
        self.write_errors += other.write_errors;
        self.already_classified += other.already_classified;
        self.using_llm = using_llm;
    }
}
