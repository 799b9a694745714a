//! Collaborator interfaces for the LLM-backed agent roles.
//!
//! The pipeline talks to three named collaborators directly:
//!
//! ```text
//! Pipeline
//!     |
//!     +--> IdeaSource::generate_ideas(restrictions, meals, n)  -> [RecipeIdea]
//!     |
//!     +--> LinkSource::find_links(ideas, restrictions)         -> [(idea, url)]
//!     |        (called again by the repair loop for invalid ideas)
//!     |
//!     +--> ScheduleBuilder::build_schedule(request)            -> WeeklySchedule
//! ```
//!
//! The [`gemini`] module provides implementations backed by the Gemini
//! `generateContent` API.

pub mod gemini;
pub mod llm;
pub mod parse;
pub mod prompts;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{DietaryRestrictions, MealKind, RecipeIdea, ValidatedMealSet, Weekday, WeeklySchedule};

pub use gemini::{GeminiIdeaAgent, GeminiLinkAgent, GeminiScheduleAgent};
pub use llm::{GeminiClient, GeminiConfig, LlmError};

/// Produces recipe ideas that satisfy the user's dietary restrictions.
#[async_trait]
pub trait IdeaSource: Send + Sync {
    /// Human-readable name used in logs and events.
    fn name(&self) -> &str;

    /// Return at least `count_per_meal` ideas for each of `meals`.
    async fn generate_ideas(
        &self,
        restrictions: &DietaryRestrictions,
        meals: &[MealKind],
        count_per_meal: u32,
    ) -> Result<Vec<RecipeIdea>>;
}

/// Finds recipe URLs for ideas.
#[async_trait]
pub trait LinkSource: Send + Sync {
    fn name(&self) -> &str;

    /// Propose URLs for `ideas`. An idea may receive zero, one, or several
    /// URLs; the links are unverified.
    async fn find_links(
        &self,
        ideas: &[RecipeIdea],
        restrictions: &DietaryRestrictions,
    ) -> Result<Vec<(RecipeIdea, String)>>;
}

/// Everything the schedule builder is given.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRequest<'a> {
    pub validated: &'a ValidatedMealSet,
    pub anchor: Weekday,
    pub meals: &'a [MealKind],
    pub max_repeats: u32,
    /// Problems found in the previous attempt, if this is a retry.
    pub feedback: Option<&'a str>,
}

/// Lays validated recipes out over a week.
#[async_trait]
pub trait ScheduleBuilder: Send + Sync {
    fn name(&self) -> &str;

    async fn build_schedule(&self, request: &ScheduleRequest<'_>) -> Result<WeeklySchedule>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn IdeaSource, _: &dyn LinkSource, _: &dyn ScheduleBuilder) {}
};

/// The three collaborators a planning run needs.
#[derive(Clone)]
pub struct Agents {
    pub ideas: Arc<dyn IdeaSource>,
    pub links: Arc<dyn LinkSource>,
    pub scheduler: Arc<dyn ScheduleBuilder>,
}

impl Agents {
    /// Gemini-backed agents sharing one client.
    pub fn gemini(client: GeminiClient) -> Self {
        Self {
            ideas: Arc::new(GeminiIdeaAgent::new(client.clone())),
            links: Arc::new(GeminiLinkAgent::new(client.clone())),
            scheduler: Arc::new(GeminiScheduleAgent::new(client)),
        }
    }
}

impl std::fmt::Debug for Agents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agents")
            .field("ideas", &self.ideas.name())
            .field("links", &self.links.name())
            .field("scheduler", &self.scheduler.name())
            .finish()
    }
}
