//! Planner policy knobs and configuration errors.

use std::time::Duration;

use chrono_tz::Tz;

/// Substring identifying opaque redirect links issued by the search tool.
pub const DEFAULT_REDIRECTOR_MARKER: &str = "vertexaisearch";

/// Fatal configuration problems. These abort before any planning starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("time zone is not configured; set MEALPREP_TIME_ZONE (or TIME_ZONE)")]
    MissingTimeZone,

    #[error("unrecognized time zone identifier: {0:?}")]
    UnknownTimeZone(String),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Parse an IANA time zone identifier.
pub fn parse_time_zone(id: Option<&str>) -> Result<Tz, ConfigError> {
    let id = id.map(str::trim).filter(|s| !s.is_empty());
    let Some(id) = id else {
        return Err(ConfigError::MissingTimeZone);
    };
    id.parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimeZone(id.to_string()))
}

/// Link validation policy.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Per-request timeout for the liveness fetch.
    pub timeout: Duration,
    /// Lowercase marker rejected anywhere in the URL.
    pub redirector_marker: String,
    /// `User-Agent` sent with the liveness fetch.
    pub user_agent: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            redirector_marker: DEFAULT_REDIRECTOR_MARKER.to_string(),
            user_agent: "Mozilla/5.0".to_string(),
        }
    }
}

/// Repair loop policy.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    /// Repair rounds allowed after the initial attempt.
    pub budget: u32,
    /// Validations in flight at once within a round.
    pub concurrency: usize,
    /// Time allowed for one round (link request plus validation). The whole
    /// loop is bounded by `(budget + 1) * round_timeout`.
    pub round_timeout: Duration,
}

impl RepairConfig {
    pub fn deadline(&self) -> Duration {
        self.round_timeout.saturating_mul(self.budget.saturating_add(1))
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            budget: 2,
            concurrency: 8,
            round_timeout: Duration::from_secs(60),
        }
    }
}

/// Everything the planning pipeline needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub time_zone: Tz,
    /// Ideas requested per meal kind.
    pub ideas_per_meal: u32,
    /// How many times one recipe may appear in a week.
    pub max_repeats: u32,
    /// Schedule requests before giving up on a non-conforming builder.
    pub schedule_attempts: u32,
    pub repair: RepairConfig,
    pub validator: ValidatorConfig,
}

impl PlannerConfig {
    pub fn new(time_zone: Tz) -> Self {
        Self {
            time_zone,
            ideas_per_meal: 7,
            max_repeats: 3,
            schedule_attempts: 2,
            repair: RepairConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }

    /// Check the knobs that have no sensible zero value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ideas_per_meal == 0 {
            return Err(ConfigError::Invalid {
                key: "planner.ideas_per_meal",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_repeats == 0 {
            return Err(ConfigError::Invalid {
                key: "planner.max_repeats",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.schedule_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "planner.schedule_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.repair.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "planner.validation_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.validator.redirector_marker.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "planner.redirector_marker",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
