//! Gemini-backed implementations of the agent roles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::llm::GeminiClient;
use super::{IdeaSource, LinkSource, ScheduleBuilder, ScheduleRequest, parse, prompts};
use crate::model::{DietaryRestrictions, MealKind, RecipeIdea, WeeklySchedule};

/// Recipe idea generation with web search grounding.
#[derive(Debug, Clone)]
pub struct GeminiIdeaAgent {
    client: GeminiClient,
}

impl GeminiIdeaAgent {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdeaSource for GeminiIdeaAgent {
    fn name(&self) -> &str {
        "recipe_idea_agent"
    }

    async fn generate_ideas(
        &self,
        restrictions: &DietaryRestrictions,
        meals: &[MealKind],
        count_per_meal: u32,
    ) -> Result<Vec<RecipeIdea>> {
        let prompt = prompts::idea_prompt(restrictions, meals, count_per_meal);
        let text = self
            .client
            .generate(prompts::IDEA_INSTRUCTION, &prompt, true)
            .await
            .context("recipe idea request failed")?;
        let ideas = parse::parse_ideas(&text, restrictions)
            .context("recipe idea answer could not be parsed")?;
        info!(count = ideas.len(), %restrictions, "recipe ideas generated");
        Ok(ideas)
    }
}

/// Recipe link discovery with web search grounding.
#[derive(Debug, Clone)]
pub struct GeminiLinkAgent {
    client: GeminiClient,
}

impl GeminiLinkAgent {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LinkSource for GeminiLinkAgent {
    fn name(&self) -> &str {
        "recipe_link_agent"
    }

    async fn find_links(
        &self,
        ideas: &[RecipeIdea],
        restrictions: &DietaryRestrictions,
    ) -> Result<Vec<(RecipeIdea, String)>> {
        let prompt = prompts::link_prompt(ideas, restrictions);
        let text = self
            .client
            .generate(prompts::LINK_INSTRUCTION, &prompt, true)
            .await
            .context("recipe link request failed")?;
        let links = parse::parse_links(&text, ideas)
            .context("recipe link answer could not be parsed")?;
        debug!(requested = ideas.len(), returned = links.len(), "recipe links proposed");
        Ok(links)
    }
}

/// Weekly schedule assembly. Runs without search; everything it needs is in
/// the prompt.
#[derive(Debug, Clone)]
pub struct GeminiScheduleAgent {
    client: GeminiClient,
}

impl GeminiScheduleAgent {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScheduleBuilder for GeminiScheduleAgent {
    fn name(&self) -> &str {
        "planning_agent"
    }

    async fn build_schedule(&self, request: &ScheduleRequest<'_>) -> Result<WeeklySchedule> {
        let prompt = prompts::schedule_prompt(request);
        let text = self
            .client
            .generate(prompts::SCHEDULE_INSTRUCTION, &prompt, false)
            .await
            .context("schedule request failed")?;
        let schedule =
            parse::parse_schedule(&text).context("schedule answer could not be parsed")?;
        debug!(days = schedule.days.len(), slots = schedule.slot_count(), "schedule drafted");
        Ok(schedule)
    }
}
