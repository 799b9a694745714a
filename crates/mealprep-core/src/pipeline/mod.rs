//! One planning run: resolve the weekday, generate ideas, source and repair
//! links, then build and check the schedule.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{Agents, ScheduleRequest};
use crate::config::PlannerConfig;
use crate::error::{PlanError, Stage};
use crate::link::LinkValidator;
use crate::model::{DietaryRestrictions, MealKind, MealPlan, Weekday};
use crate::repair::{LinkRepairer, RoundReport};
use crate::schedule::{check_schedule, describe_violations};
use crate::weekday::weekday_at;

/// Progress reported while a plan is being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEvent {
    WeekdayResolved { anchor: Weekday },
    IdeasGenerated { count: usize },
    LinkRound {
        round: u32,
        accepted: usize,
        rejected: usize,
        missing: usize,
    },
    LinksSettled { validated: usize, dropped: usize },
    ScheduleRejected { attempt: u32, violations: String },
    ScheduleAccepted { attempt: u32 },
}

impl From<&RoundReport> for PlanEvent {
    fn from(report: &RoundReport) -> Self {
        Self::LinkRound {
            round: report.round,
            accepted: report.accepted.len(),
            rejected: report.rejected.len(),
            missing: report.missing.len(),
        }
    }
}

impl fmt::Display for PlanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeekdayResolved { anchor } => {
                write!(f, "The current day of the week is {anchor}. The plan starts today.")
            }
            Self::IdeasGenerated { count } => write!(f, "Came up with {count} recipe ideas."),
            Self::LinkRound {
                round,
                accepted,
                rejected,
                missing,
            } => {
                if *round == 0 {
                    write!(f, "Checked recipe links: {accepted} working")?;
                } else {
                    write!(f, "Retry {round}: {accepted} more working")?;
                }
                write!(f, ", {rejected} broken, {missing} without a link.")
            }
            Self::LinksSettled { validated, dropped } => {
                write!(f, "{validated} recipes have working links")?;
                if *dropped > 0 {
                    write!(f, "; {dropped} could not be sourced")?;
                }
                f.write_str(".")
            }
            Self::ScheduleRejected { attempt, violations } => {
                write!(f, "Schedule draft {attempt} was rejected: {violations}")
            }
            Self::ScheduleAccepted { attempt } => {
                write!(f, "Schedule draft {attempt} accepted.")
            }
        }
    }
}

/// Runs the planning pipeline against a set of collaborators.
#[derive(Debug, Clone)]
pub struct MealPlanner {
    agents: Agents,
    repairer: LinkRepairer,
    config: PlannerConfig,
}

impl MealPlanner {
    pub fn new(agents: Agents, validator: Arc<dyn LinkValidator>, config: PlannerConfig) -> Self {
        let repairer = LinkRepairer::new(agents.links.clone(), validator, config.repair.clone());
        Self {
            agents,
            repairer,
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Today in the configured time zone.
    pub fn today(&self) -> Weekday {
        weekday_at(self.config.time_zone, Utc::now())
    }

    /// Build a plan starting today.
    pub async fn plan(
        &self,
        restrictions: &DietaryRestrictions,
        meals: &[MealKind],
        cancel: &CancellationToken,
        progress: Option<&mpsc::UnboundedSender<PlanEvent>>,
    ) -> Result<MealPlan, PlanError> {
        self.plan_from(self.today(), restrictions, meals, cancel, progress)
            .await
    }

    /// Build a plan starting on `anchor`.
    pub async fn plan_from(
        &self,
        anchor: Weekday,
        restrictions: &DietaryRestrictions,
        meals: &[MealKind],
        cancel: &CancellationToken,
        progress: Option<&mpsc::UnboundedSender<PlanEvent>>,
    ) -> Result<MealPlan, PlanError> {
        let emit = |event: PlanEvent| {
            if let Some(tx) = progress {
                // The receiver going away only means nobody is watching.
                let _ = tx.send(event);
            }
        };
        let meals: Vec<MealKind> = if meals.is_empty() {
            MealKind::ALL.to_vec()
        } else {
            meals.to_vec()
        };

        info!(%anchor, %restrictions, meals = meals.len(), "planning started");
        emit(PlanEvent::WeekdayResolved { anchor });

        // 1. Ideas.
        let ideas = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PlanError::Cancelled),
            res = self.agents.ideas.generate_ideas(restrictions, &meals, self.config.ideas_per_meal) => {
                res.map_err(|e| PlanError::upstream(Stage::Ideas, e))?
            }
        };
        if ideas.is_empty() {
            return Err(PlanError::upstream(
                Stage::Ideas,
                anyhow::anyhow!("{} returned no ideas", self.agents.ideas.name()),
            ));
        }
        emit(PlanEvent::IdeasGenerated { count: ideas.len() });

        // 2. Links.
        let outcome = self
            .repairer
            .repair(&ideas, restrictions, self.repairer.default_budget(), cancel)
            .await?;
        for report in &outcome.rounds {
            emit(PlanEvent::from(report));
        }
        emit(PlanEvent::LinksSettled {
            validated: outcome.validated.len(),
            dropped: outcome.dropped.len(),
        });
        if outcome.validated.is_empty() {
            return Err(PlanError::NothingSourced {
                dropped: outcome.dropped.len(),
            });
        }

        // 3. Schedule.
        let mut feedback: Option<String> = None;
        for attempt in 1..=self.config.schedule_attempts {
            if cancel.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            let request = ScheduleRequest {
                validated: &outcome.validated,
                anchor,
                meals: &meals,
                max_repeats: self.config.max_repeats,
                feedback: feedback.as_deref(),
            };
            let schedule = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PlanError::Cancelled),
                res = self.agents.scheduler.build_schedule(&request) => {
                    res.map_err(|e| PlanError::upstream(Stage::Schedule, e))?
                }
            };

            match check_schedule(
                &schedule,
                &outcome.validated,
                anchor,
                &meals,
                self.config.max_repeats,
            ) {
                Ok(()) => {
                    info!(
                        attempt,
                        slots = schedule.slot_count(),
                        dropped = outcome.dropped.len(),
                        "schedule accepted"
                    );
                    emit(PlanEvent::ScheduleAccepted { attempt });
                    return Ok(MealPlan {
                        anchor,
                        restrictions: restrictions.clone(),
                        schedule,
                        dropped: outcome.dropped,
                    });
                }
                Err(violations) => {
                    let described = describe_violations(&violations);
                    warn!(attempt, violations = %described, "schedule rejected");
                    emit(PlanEvent::ScheduleRejected {
                        attempt,
                        violations: described.clone(),
                    });
                    feedback = Some(described);
                }
            }
        }

        Err(PlanError::ScheduleRejected {
            attempts: self.config.schedule_attempts,
            violations: feedback.unwrap_or_default(),
        })
    }
}
