//! Link repair loop: turns an unreliable link source into a set of recipes
//! whose links are known to work.
//!
//! ```text
//! round 0:  find_links(all ideas) -> validate each (fan-out) -> merge
//! round n:  find_links(still invalid ideas) -> validate -> merge
//! stop when nothing is invalid, the budget is spent, or the deadline passes
//! ```
//!
//! A round that outlives `round_timeout` finds nothing but still spends
//! budget; only the aggregate deadline ends the loop early.
//!
//! Validation within a round runs concurrently; the merge into the
//! validated set happens afterwards in discovery order, by a single writer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::LinkSource;
use crate::config::RepairConfig;
use crate::error::{PlanError, Stage};
use crate::link::{InvalidReason, LinkValidator, LinkVerdict, apply_verdict};
use crate::model::{CandidateLink, DietaryRestrictions, IdeaKey, RecipeIdea, ValidatedMealSet};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Repair rounds remaining after the initial attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    pub fn new(rounds: u32) -> Self {
        Self { remaining: rounds }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Spend one round. Returns `false` when nothing was left.
    pub fn try_consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

/// A proposed link that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub recipe: String,
    pub url: String,
    pub reason: InvalidReason,
}

/// What happened in one round.
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    /// 0 for the initial attempt, then 1, 2, ... for repair rounds.
    pub round: u32,
    pub requested: usize,
    pub proposed: usize,
    /// Recipes that gained a working link this round.
    pub accepted: Vec<String>,
    pub rejected: Vec<Rejection>,
    /// Requested recipes the link source returned nothing for.
    pub missing: Vec<String>,
    /// The round ran past its timeout; nothing it found was kept.
    pub timed_out: bool,
}

/// Result of a repair run.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub validated: ValidatedMealSet,
    /// Ideas still without a working link when the loop stopped.
    pub dropped: Vec<RecipeIdea>,
    pub link_source_calls: u32,
    /// Rounds spent beyond the initial attempt.
    pub repair_rounds: u32,
    pub rounds: Vec<RoundReport>,
    /// The aggregate deadline cut the loop short.
    pub deadline_hit: bool,
}

// ---------------------------------------------------------------------------
// LinkRepairer
// ---------------------------------------------------------------------------

/// Runs the repair loop against a link source and a validator.
#[derive(Clone)]
pub struct LinkRepairer {
    links: Arc<dyn LinkSource>,
    validator: Arc<dyn LinkValidator>,
    config: RepairConfig,
}

impl std::fmt::Debug for LinkRepairer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkRepairer")
            .field("links", &self.links.name())
            .field("config", &self.config)
            .finish()
    }
}

impl LinkRepairer {
    pub fn new(
        links: Arc<dyn LinkSource>,
        validator: Arc<dyn LinkValidator>,
        config: RepairConfig,
    ) -> Self {
        Self {
            links,
            validator,
            config,
        }
    }

    /// A fresh budget from the configured policy.
    pub fn default_budget(&self) -> RetryBudget {
        RetryBudget::new(self.config.budget)
    }

    /// Source and validate links for `ideas`.
    ///
    /// Makes at most `budget + 1` link source calls. Ideas sharing a key are
    /// collapsed (first wins). Ideas left invalid when the budget or the
    /// deadline runs out are returned in [`RepairOutcome::dropped`].
    pub async fn repair(
        &self,
        ideas: &[RecipeIdea],
        restrictions: &DietaryRestrictions,
        mut budget: RetryBudget,
        cancel: &CancellationToken,
    ) -> Result<RepairOutcome, PlanError> {
        let mut pending = dedup_ideas(ideas);
        let mut outcome = RepairOutcome {
            validated: ValidatedMealSet::new(),
            dropped: Vec::new(),
            link_source_calls: 0,
            repair_rounds: 0,
            rounds: Vec::new(),
            deadline_hit: false,
        };
        if pending.is_empty() {
            return Ok(outcome);
        }

        let deadline = Instant::now() + self.config.deadline();
        let mut round = 0u32;

        loop {
            let round_deadline = deadline.min(Instant::now() + self.config.round_timeout);
            outcome.link_source_calls += 1;

            let checked = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(round, "repair cancelled");
                    return Err(PlanError::Cancelled);
                }
                res = tokio::time::timeout_at(round_deadline, self.run_round(&pending, restrictions)) => res,
            };

            let report = match checked {
                Ok(result) => merge_round(round, &pending, result?, &mut outcome.validated),
                Err(_) => {
                    warn!(round, pending = pending.len(), "link round timed out");
                    RoundReport {
                        timed_out: true,
                        ..merge_round(round, &pending, Vec::new(), &mut outcome.validated)
                    }
                }
            };
            info!(
                round,
                requested = report.requested,
                proposed = report.proposed,
                accepted = report.accepted.len(),
                rejected = report.rejected.len(),
                missing = report.missing.len(),
                "link round complete"
            );
            outcome.rounds.push(report);

            pending.retain(|idea| !outcome.validated.contains_key(&idea.key()));

            if pending.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(round, pending = pending.len(), "repair deadline reached");
                outcome.deadline_hit = true;
                break;
            }
            if !budget.try_consume() {
                debug!(pending = pending.len(), "repair budget exhausted");
                break;
            }
            round += 1;
            outcome.repair_rounds = round;
        }

        if !pending.is_empty() {
            warn!(
                dropped = pending.len(),
                "dropping recipes without a working link"
            );
        }
        outcome.dropped = pending;
        Ok(outcome)
    }

    /// Ask for links and validate every proposal for a requested idea.
    async fn run_round(
        &self,
        pending: &[RecipeIdea],
        restrictions: &DietaryRestrictions,
    ) -> Result<Vec<(CandidateLink, LinkVerdict)>, PlanError> {
        let proposals = self
            .links
            .find_links(pending, restrictions)
            .await
            .map_err(|e| PlanError::upstream(Stage::Links, e))?;

        let requested: HashSet<IdeaKey> = pending.iter().map(RecipeIdea::key).collect();
        let candidates: Vec<CandidateLink> = proposals
            .into_iter()
            .filter(|(idea, url)| {
                let keep = requested.contains(&idea.key());
                if !keep {
                    debug!(recipe = %idea.name, %url, "ignoring link for unrequested recipe");
                }
                keep
            })
            .map(|(idea, url)| CandidateLink::new(idea, url))
            .collect();

        // Each check owns its URL and validator handle so the round's future
        // stays `Send` when the turn runs on a spawned task.
        let checks: Vec<_> = candidates
            .iter()
            .map(|c| {
                let validator = Arc::clone(&self.validator);
                let url = c.url.clone();
                async move { validator.validate(&url).await }
            })
            .collect();
        let verdicts: Vec<LinkVerdict> = futures::stream::iter(checks)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        Ok(candidates.into_iter().zip(verdicts).collect())
    }
}

/// Collapse ideas sharing a key, keeping the first.
fn dedup_ideas(ideas: &[RecipeIdea]) -> Vec<RecipeIdea> {
    let mut seen = HashSet::new();
    ideas
        .iter()
        .filter(|idea| seen.insert(idea.key()))
        .cloned()
        .collect()
}

/// Fold one round's verdicts into the validated set, in discovery order.
fn merge_round(
    round: u32,
    pending: &[RecipeIdea],
    checked: Vec<(CandidateLink, LinkVerdict)>,
    validated: &mut ValidatedMealSet,
) -> RoundReport {
    let by_key: HashMap<IdeaKey, &RecipeIdea> = pending.iter().map(|i| (i.key(), i)).collect();
    let mut proposed_for: HashSet<IdeaKey> = HashSet::new();
    let mut report = RoundReport {
        round,
        requested: pending.len(),
        proposed: checked.len(),
        ..RoundReport::default()
    };

    for (mut link, verdict) in checked {
        apply_verdict(&mut link, &verdict);
        let key = link.idea.key();
        proposed_for.insert(key.clone());
        match verdict {
            LinkVerdict::Valid => {
                // The requested idea keeps its own tags over whatever the
                // link source echoed back.
                let idea = by_key.get(&key).map_or_else(|| link.idea.clone(), |i| (*i).clone());
                if validated.insert(idea, link.url.clone()) {
                    report.accepted.push(link.idea.name.clone());
                }
            }
            LinkVerdict::Invalid(reason) => {
                debug!(recipe = %link.idea.name, url = %link.url, %reason, "link rejected");
                report.rejected.push(Rejection {
                    recipe: link.idea.name,
                    url: link.url,
                    reason,
                });
            }
        }
    }

    report.missing = pending
        .iter()
        .filter(|i| !proposed_for.contains(&i.key()))
        .map(|i| i.name.clone())
        .collect();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_counts_down() {
        let mut budget = RetryBudget::new(2);
        assert!(budget.try_consume());
        assert!(budget.try_consume());
        assert!(budget.is_exhausted());
        assert!(!budget.try_consume());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn dedup_keeps_first_by_key() {
        let ideas = vec![
            RecipeIdea::new("Pad Thai").with_description("first"),
            RecipeIdea::new("pad thai").with_description("second"),
            RecipeIdea::new("Ramen"),
        ];
        let out = dedup_ideas(&ideas);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].description.as_deref(), Some("first"));
    }

    #[test]
    fn merge_keeps_first_valid_url_and_reports_missing() {
        let pending = vec![
            RecipeIdea::new("Soup"),
            RecipeIdea::new("Salad"),
            RecipeIdea::new("Stew"),
        ];
        let checked = vec![
            (
                CandidateLink::new(RecipeIdea::new("Soup"), "https://a.example/soup"),
                LinkVerdict::Invalid(InvalidReason::Status(404)),
            ),
            (
                CandidateLink::new(RecipeIdea::new("soup"), "https://b.example/soup"),
                LinkVerdict::Valid,
            ),
            (
                CandidateLink::new(RecipeIdea::new("Soup"), "https://c.example/soup"),
                LinkVerdict::Valid,
            ),
            (
                CandidateLink::new(RecipeIdea::new("Salad"), "https://vertexaisearch.example"),
                LinkVerdict::Invalid(InvalidReason::Redirector),
            ),
        ];
        let mut set = ValidatedMealSet::new();
        let report = merge_round(0, &pending, checked, &mut set);

        assert_eq!(set.len(), 1);
        let soup = set.get(&IdeaKey::new("soup")).unwrap();
        assert_eq!(soup.url, "https://b.example/soup");
        // Stored under the requested idea's own name.
        assert_eq!(soup.idea.name, "Soup");
        assert_eq!(report.accepted, vec!["soup".to_string()]);
        assert_eq!(report.rejected.len(), 2);
        assert_eq!(report.missing, vec!["Stew".to_string()]);
        assert_eq!(report.proposed, 4);
    }
}
