//! Fake collaborators shared by the pipeline and runner tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use mealprep_core::PlannerConfig;
use mealprep_core::agent::{Agents, IdeaSource, LinkSource, ScheduleBuilder, ScheduleRequest};
use mealprep_core::link::{InvalidReason, LinkValidator, LinkVerdict};
use mealprep_core::model::{
    DayPlan, DietaryRestrictions, MealKind, MealSlot, RecipeIdea, WeeklySchedule,
};
use mealprep_core::pipeline::MealPlanner;

// ===========================================================================
// Ideas
// ===========================================================================

/// Returns `count_per_meal` ideas per meal named `"<Meal> dish <n>"`.
#[derive(Default)]
pub struct FakeIdeas {
    pub fail: bool,
    pub calls: Mutex<Vec<(DietaryRestrictions, Vec<MealKind>)>>,
}

#[async_trait]
impl IdeaSource for FakeIdeas {
    fn name(&self) -> &str {
        "fake_ideas"
    }

    async fn generate_ideas(
        &self,
        restrictions: &DietaryRestrictions,
        meals: &[MealKind],
        count_per_meal: u32,
    ) -> Result<Vec<RecipeIdea>> {
        self.calls
            .lock()
            .unwrap()
            .push((restrictions.clone(), meals.to_vec()));
        if self.fail {
            anyhow::bail!("model overloaded");
        }
        Ok(meals
            .iter()
            .flat_map(|&meal| {
                (1..=count_per_meal).map(move |n| {
                    RecipeIdea::new(format!("{meal} dish {n}"))
                        .with_meal(meal)
                        .with_restrictions(restrictions.clone())
                })
            })
            .collect())
    }
}

// ===========================================================================
// Links
// ===========================================================================

/// Proposes `https://r.example/<slug>` for every idea, except names listed in
/// `broken`, which always get a dead link.
#[derive(Default)]
pub struct FakeLinks {
    pub broken: Vec<String>,
    pub calls: AtomicUsize,
}

pub fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

#[async_trait]
impl LinkSource for FakeLinks {
    fn name(&self) -> &str {
        "fake_links"
    }

    async fn find_links(
        &self,
        ideas: &[RecipeIdea],
        _restrictions: &DietaryRestrictions,
    ) -> Result<Vec<(RecipeIdea, String)>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ideas
            .iter()
            .map(|idea| {
                let url = if self.broken.iter().any(|b| b == &idea.name) {
                    format!("https://r.example/broken/{}", slug(&idea.name))
                } else {
                    format!("https://r.example/{}", slug(&idea.name))
                };
                (idea.clone(), url)
            })
            .collect())
    }
}

/// Everything is valid except URLs under `/broken/`.
pub struct PathValidator;

#[async_trait]
impl LinkValidator for PathValidator {
    async fn validate(&self, url: &str) -> LinkVerdict {
        if url.contains("/broken/") {
            LinkVerdict::Invalid(InvalidReason::Status(404))
        } else {
            LinkVerdict::Valid
        }
    }
}

// ===========================================================================
// Scheduler
// ===========================================================================

/// Lays out validated recipes day by day. The first `bad_drafts` answers are
/// six days long.
#[derive(Default)]
pub struct FakeScheduler {
    pub bad_drafts: usize,
    pub feedback: Mutex<Vec<Option<String>>>,
}

/// A conforming schedule: for each requested meal, cycle through the
/// recipes for that meal.
pub fn conforming_schedule(request: &ScheduleRequest<'_>) -> WeeklySchedule {
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
    WeeklySchedule { days }
}

#[async_trait]
impl ScheduleBuilder for FakeScheduler {
    fn name(&self) -> &str {
        "fake_scheduler"
    }

    async fn build_schedule(&self, request: &ScheduleRequest<'_>) -> Result<WeeklySchedule> {
        let attempt = {
            let mut feedback = self.feedback.lock().unwrap();
            feedback.push(request.feedback.map(str::to_string));
            feedback.len()
        };
        let mut schedule = conforming_schedule(request);
        if attempt <= self.bad_drafts {
            schedule.days.pop();
        }
        Ok(schedule)
    }
}

// ===========================================================================
// Wiring
// ===========================================================================

pub struct Fakes {
    pub ideas: Arc<FakeIdeas>,
    pub links: Arc<FakeLinks>,
    pub scheduler: Arc<FakeScheduler>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            ideas: Arc::new(FakeIdeas::default()),
            links: Arc::new(FakeLinks::default()),
            scheduler: Arc::new(FakeScheduler::default()),
        }
    }

    pub fn planner(&self) -> MealPlanner {
        let agents = Agents {
            ideas: self.ideas.clone(),
            links: self.links.clone(),
            scheduler: self.scheduler.clone(),
        };
        let mut config = PlannerConfig::new(chrono_tz::UTC);
        config.ideas_per_meal = 4;
        MealPlanner::new(agents, Arc::new(PathValidator), config)
    }
}
