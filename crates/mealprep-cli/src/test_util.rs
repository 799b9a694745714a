//! Helpers shared by the CLI unit tests.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;

use mealprep_core::agent::{Agents, IdeaSource, LinkSource, ScheduleBuilder, ScheduleRequest};
use mealprep_core::link::{LinkValidator, LinkVerdict};
use mealprep_core::model::{DayPlan, DietaryRestrictions, MealKind, MealSlot, RecipeIdea, WeeklySchedule};
use mealprep_core::session::{MemoryService, SessionService};
use mealprep_core::{MealPlanner, PlannerConfig, Runner};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that read or write process environment variables.
pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// -----------------------------------------------------------------------
// Canned collaborators
// -----------------------------------------------------------------------

struct CannedIdeas;

#[async_trait]
impl IdeaSource for CannedIdeas {
    fn name(&self) -> &str {
        "canned_ideas"
    }

    async fn generate_ideas(
        &self,
        _restrictions: &DietaryRestrictions,
        meals: &[MealKind],
        count_per_meal: u32,
    ) -> Result<Vec<RecipeIdea>> {
        Ok(meals
            .iter()
            .flat_map(|&meal| {
                (1..=count_per_meal).map(move |n| RecipeIdea::new(format!("{meal} {n}")).with_meal(meal))
            })
            .collect())
    }
}

struct CannedLinks;

#[async_trait]
impl LinkSource for CannedLinks {
    fn name(&self) -> &str {
        "canned_links"
    }

    async fn find_links(
        &self,
        ideas: &[RecipeIdea],
        _restrictions: &DietaryRestrictions,
    ) -> Result<Vec<(RecipeIdea, String)>> {
        Ok(ideas
            .iter()
            .map(|idea| {
                let slug = idea.name.to_lowercase().replace(' ', "-");
                (idea.clone(), format!("https://recipes.example/{slug}"))
            })
            .collect())
    }
}

struct CannedScheduler;

#[async_trait]
impl ScheduleBuilder for CannedScheduler {
    fn name(&self) -> &str {
        "canned_scheduler"
    }

    async fn build_schedule(&self, request: &ScheduleRequest<'_>) -> Result<WeeklySchedule> {
        let days = request
            .anchor
            .week_from()
            .iter()
            .enumerate()
            .map(|(i, &day)| DayPlan {
                day,
                meals: request
                    .meals
                    .iter()
                    .filter_map(|&meal| {
                        let options: Vec<_> = request.validated.for_meal(meal).collect();
                        let pick = options.get(i % options.len().max(1))?;
                        Some(MealSlot {
                            meal,
                            recipe: pick.idea.name.clone(),
                            url: pick.url.clone(),
                        })
                    })
                    .collect(),
            })
            .collect();
        Ok(WeeklySchedule { days })
    }
}

struct AcceptAll;

#[async_trait]
impl LinkValidator for AcceptAll {
    async fn validate(&self, _url: &str) -> LinkVerdict {
        LinkVerdict::Valid
    }
}

/// A runner whose collaborators answer instantly and never fail.
pub fn canned_runner() -> Arc<Runner> {
    let agents = Agents {
        ideas: Arc::new(CannedIdeas),
        links: Arc::new(CannedLinks),
        scheduler: Arc::new(CannedScheduler),
    };
    let planner = MealPlanner::new(agents, Arc::new(AcceptAll), PlannerConfig::new(chrono_tz::UTC));
    Arc::new(Runner::new(
        planner,
        Arc::new(SessionService::new()),
        Arc::new(MemoryService::new()),
    ))
}
