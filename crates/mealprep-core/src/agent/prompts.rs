//! System instructions and user prompts for the three agent roles.
//!
//! Every role answers with a single JSON object so the reply can be parsed
//! deterministically (see [`super::parse`]). Gemini refuses a JSON response
//! MIME type when the search tool is enabled, so the shape is requested in
//! the prompt instead.

use std::fmt::Write as _;

use crate::model::{DietaryRestrictions, MealKind, RecipeIdea};
use crate::weekday;

use super::ScheduleRequest;

pub const IDEA_INSTRUCTION: &str = "\
You find recipe ideas on the web using the google_search tool.
If dietary restrictions are given you MUST respect them and only suggest recipes that satisfy every one.
Suggest varied dishes; do not repeat a dish.
Answer with ONLY a JSON object of this shape and no other text:
{\"ideas\": [{\"name\": \"<dish name>\", \"meal\": \"breakfast|lunch|dinner\", \"description\": \"<one sentence>\"}]}";

pub const LINK_INSTRUCTION: &str = "\
You find links to full recipes on the web using the google_search tool, one for each recipe idea you are given.
Only return links to pages that answer HTTP 200 OK with the full recipe.
NEVER return links that start with https://vertexaisearch or any other search redirect; give the final recipe page URL.
Respect the dietary restrictions given.
Do not add opinions or commentary.
Answer with ONLY a JSON object of this shape and no other text:
{\"links\": [{\"recipe\": \"<recipe name exactly as given>\", \"url\": \"<https URL>\"}]}";

pub const SCHEDULE_INSTRUCTION: &str = "\
You create a weekly meal schedule from recipes that already have verified links.
Use ONLY the recipes and links provided; never invent a recipe or a link.
Start on the given current day of the week and cover seven consecutive days.
Plan only the requested meals, at most one of each meal per day.
Make the plan varied and never use the same recipe more times than allowed.
Answer with ONLY a JSON object of this shape and no other text:
{\"days\": [{\"day\": \"<Weekday>\", \"meals\": [{\"meal\": \"breakfast|lunch|dinner\", \"recipe\": \"<recipe name>\", \"url\": \"<link>\"}]}]}";

fn restrictions_line(restrictions: &DietaryRestrictions) -> String {
    if restrictions.is_empty() {
        "Dietary restrictions: none.".to_string()
    } else {
        format!("Dietary restrictions (all must be honored): {restrictions}.")
    }
}

fn meals_list(meals: &[MealKind]) -> String {
    meals.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

pub fn idea_prompt(restrictions: &DietaryRestrictions, meals: &[MealKind], count_per_meal: u32) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}", restrictions_line(restrictions));
    let _ = writeln!(
        prompt,
        "Provide at least {count_per_meal} recipe ideas for each of these meals: {}.",
        meals_list(meals)
    );
    let _ = writeln!(
        prompt,
        "That is at least {} ideas in total.",
        count_per_meal as usize * meals.len()
    );
    prompt
}

pub fn link_prompt(ideas: &[RecipeIdea], restrictions: &DietaryRestrictions) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}", restrictions_line(restrictions));
    let _ = writeln!(prompt, "Find one valid recipe link for each of these recipe ideas:");
    for idea in ideas {
        match (&idea.meal, &idea.description) {
            (Some(meal), Some(desc)) => {
                let _ = writeln!(prompt, "- {} ({meal}): {desc}", idea.name);
            }
            (Some(meal), None) => {
                let _ = writeln!(prompt, "- {} ({meal})", idea.name);
            }
            (None, Some(desc)) => {
                let _ = writeln!(prompt, "- {}: {desc}", idea.name);
            }
            (None, None) => {
                let _ = writeln!(prompt, "- {}", idea.name);
            }
        }
    }
    prompt
}

pub fn schedule_prompt(request: &ScheduleRequest<'_>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}.", weekday::describe(request.anchor));
    let _ = writeln!(prompt, "Meals to plan each day: {}.", meals_list(request.meals));
    let _ = writeln!(
        prompt,
        "Do not include the same recipe more than {} times in the week.",
        request.max_repeats
    );
    let _ = writeln!(prompt, "Recipes with verified links:");
    for entry in request.validated.iter() {
        match entry.idea.meal {
            Some(meal) => {
                let _ = writeln!(prompt, "- [{meal}] {} - {}", entry.idea.name, entry.url);
            }
            None => {
                let _ = writeln!(prompt, "- {} - {}", entry.idea.name, entry.url);
            }
        }
    }
    if let Some(feedback) = request.feedback {
        let _ = writeln!(prompt, "\nYour previous schedule was rejected:\n{feedback}");
        let _ = writeln!(prompt, "Fix every problem listed above.");
    }
    prompt
}
