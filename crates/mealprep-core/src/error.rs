use std::fmt;

use crate::config::ConfigError;

/// The collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ideas,
    Links,
    Schedule,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ideas => "recipe idea source",
            Self::Links => "recipe link source",
            Self::Schedule => "schedule builder",
        };
        f.write_str(s)
    }
}

/// Why a planning attempt did not produce a meal plan.
///
/// Invalid links never show up here; the repair loop absorbs them and the
/// ideas it could not fix are reported on the [`crate::model::MealPlan`].
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A collaborator failed outright.
    #[error("{stage} failed")]
    Upstream {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// The schedule builder kept returning schedules that break the rules.
    #[error("schedule rejected after {attempts} attempt(s): {violations}")]
    ScheduleRejected { attempts: u32, violations: String },

    /// Not a single idea ended up with a working link.
    #[error("no recipe with a working link could be found ({dropped} idea(s) dropped)")]
    NothingSourced { dropped: usize },

    #[error("planning was cancelled")]
    Cancelled,
}

impl PlanError {
    pub fn upstream(stage: Stage, source: anyhow::Error) -> Self {
        Self::Upstream { stage, source }
    }

    /// Whether the failure came from a collaborator rather than from
    /// configuration or cancellation.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. } | Self::ScheduleRejected { .. } | Self::NothingSourced { .. }
        )
    }
}

/// Render an error with its whole source chain, `outer: inner: ...`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        msg.push_str(": ");
        msg.push_str(&inner.to_string());
        source = inner.source();
    }
    msg
}
