//! Parsing of the JSON answers the agent roles are asked to produce.
//!
//! Models often wrap JSON in a fenced code block or add a sentence around
//! it, so [`extract_json`] locates the object before deserializing.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{
    DayPlan, DietaryRestrictions, IdeaKey, MealKind, MealSlot, RecipeIdea, Weekday, WeeklySchedule,
};

/// Errors turning model text into domain values.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoJson,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid weekday {0:?} in schedule")]
    InvalidDay(String),

    #[error("invalid meal {value:?} on {day}")]
    InvalidMeal { day: String, value: String },
}

/// Return the JSON object embedded in `text`.
///
/// Prefers the contents of a ```` ```json ```` fence, then any fence, then
/// the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    for opener in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(opener) {
            let body = &text[start + opener.len()..];
            if let Some(end) = body.find("```") {
                let inner = body[..end].trim();
                if inner.starts_with('{') {
                    return Some(inner);
                }
            }
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Deserialize)]
struct IdeasAnswer {
    #[serde(default)]
    ideas: Vec<IdeaItem>,
}

#[derive(Debug, Deserialize)]
struct IdeaItem {
    #[serde(alias = "recipe", alias = "title")]
    name: String,
    #[serde(default)]
    meal: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinksAnswer {
    #[serde(default)]
    links: Vec<LinkItem>,
}

#[derive(Debug, Deserialize)]
struct LinkItem {
    #[serde(alias = "name", alias = "idea")]
    recipe: String,
    #[serde(alias = "link")]
    url: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleAnswer {
    #[serde(default)]
    days: Vec<DayItem>,
}

#[derive(Debug, Deserialize)]
struct DayItem {
    day: String,
    #[serde(default)]
    meals: Vec<SlotItem>,
}

#[derive(Debug, Deserialize)]
struct SlotItem {
    meal: String,
    #[serde(alias = "name")]
    recipe: String,
    #[serde(alias = "link")]
    url: String,
}

fn json_body(text: &str) -> Result<&str, ParseError> {
    extract_json(text).ok_or(ParseError::NoJson)
}

/// Parse an idea answer, tagging each idea with `restrictions`.
///
/// Unknown meal labels are kept as untagged ideas; blank names are skipped.
pub fn parse_ideas(text: &str, restrictions: &DietaryRestrictions) -> Result<Vec<RecipeIdea>, ParseError> {
    let answer: IdeasAnswer = serde_json::from_str(json_body(text)?)?;
    Ok(answer
        .ideas
        .into_iter()
        .filter(|item| !item.name.trim().is_empty())
        .map(|item| RecipeIdea {
            name: item.name.trim().to_string(),
            description: item.description.filter(|d| !d.trim().is_empty()),
            meal: item.meal.and_then(|m| m.parse::<MealKind>().ok()),
            restrictions: restrictions.clone(),
        })
        .collect())
}

/// Parse a link answer, mapping each entry back to the requested idea with
/// the same key. Entries naming unrequested recipes are returned as bare
/// ideas; the repair loop discards them.
pub fn parse_links(text: &str, requested: &[RecipeIdea]) -> Result<Vec<(RecipeIdea, String)>, ParseError> {
    let answer: LinksAnswer = serde_json::from_str(json_body(text)?)?;
    let by_key: HashMap<IdeaKey, &RecipeIdea> = requested.iter().map(|i| (i.key(), i)).collect();
    Ok(answer
        .links
        .into_iter()
        .filter(|item| !item.url.trim().is_empty())
        .map(|item| {
            let idea = by_key
                .get(&IdeaKey::new(&item.recipe))
                .map(|i| (*i).clone())
                .unwrap_or_else(|| RecipeIdea::new(item.recipe.trim()));
            (idea, item.url.trim().to_string())
        })
        .collect())
}

/// Parse a schedule answer. Structural checks happen later in the schedule
/// guard; this only rejects values that cannot be represented.
pub fn parse_schedule(text: &str) -> Result<WeeklySchedule, ParseError> {
    let answer: ScheduleAnswer = serde_json::from_str(json_body(text)?)?;
    let mut days = Vec::with_capacity(answer.days.len());
    for item in answer.days {
        let day: Weekday = item
            .day
            .parse()
            .map_err(|_| ParseError::InvalidDay(item.day.clone()))?;
        let mut meals = Vec::with_capacity(item.meals.len());
        for slot in item.meals {
            let meal: MealKind = slot.meal.parse().map_err(|_| ParseError::InvalidMeal {
                day: item.day.clone(),
                value: slot.meal.clone(),
            })?;
            meals.push(MealSlot {
                meal,
                recipe: slot.recipe.trim().to_string(),
                url: slot.url.trim().to_string(),
            });
        }
        days.push(DayPlan { day, meals });
    }
    Ok(WeeklySchedule { days })
}
