//! Reading what the user asked for out of a chat message.
//!
//! Interpretation is keyword based and deterministic. Restrictions found in a
//! message are stored on the session and reused on later turns.

use crate::model::{DietaryRestrictions, MealKind};

/// Phrases meaning "I have no dietary restrictions".
const NO_RESTRICTION_PHRASES: &[&str] = &[
    "no restrictions",
    "no restriction",
    "no dietary restrictions",
    "no dietary restriction",
    "no dietary needs",
    "no preferences",
    "none",
    "anything",
    "i eat everything",
];

/// Known restriction tags and the words that imply them.
const RESTRICTION_SYNONYMS: &[(&str, &[&str])] = &[
    ("vegetarian", &["vegetarian", "veggie"]),
    ("vegan", &["vegan", "plant based", "plant-based"]),
    ("gluten-free", &["gluten free", "gluten-free", "celiac", "coeliac", "no gluten"]),
    ("dairy-free", &["dairy free", "dairy-free", "lactose", "no dairy"]),
    ("nut-free", &["nut free", "nut-free", "nut allergy", "no nuts", "peanut"]),
    ("pescatarian", &["pescatarian", "pescetarian"]),
    ("keto", &["keto", "ketogenic"]),
    ("low-carb", &["low carb", "low-carb"]),
    ("halal", &["halal"]),
    ("kosher", &["kosher"]),
];

/// What a single message says about restrictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionAnswer {
    /// The message does not mention restrictions.
    Unstated,
    /// The user said they have none.
    NoRestrictions,
    Tags(DietaryRestrictions),
}

/// A plan request read from one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub restrictions: RestrictionAnswer,
    /// Meal kinds mentioned in the message, in serving order. Empty when none
    /// were mentioned.
    pub meals: Vec<MealKind>,
}

impl PlanRequest {
    pub fn from_message(text: &str) -> Self {
        let normalized = normalize(text);
        Self {
            restrictions: restrictions_in(&normalized),
            meals: meals_in(&normalized),
        }
    }

    /// The meals to plan: those mentioned, or all three.
    pub fn meals_or_all(&self) -> Vec<MealKind> {
        if self.meals.is_empty() {
            MealKind::ALL.to_vec()
        } else {
            self.meals.clone()
        }
    }
}

/// Lowercase, with punctuation other than `-` turned into spaces and runs of
/// whitespace collapsed. Padded with a space on each side for word matching.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn has_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {phrase} "))
}

fn restrictions_in(normalized: &str) -> RestrictionAnswer {
    let mut tags = DietaryRestrictions::none();
    for (tag, words) in RESTRICTION_SYNONYMS {
        if words.iter().any(|w| has_phrase(normalized, w)) {
            tags.insert(tag);
        }
    }
    if !tags.is_empty() {
        return RestrictionAnswer::Tags(tags);
    }
    if NO_RESTRICTION_PHRASES.iter().any(|p| has_phrase(normalized, p)) {
        return RestrictionAnswer::NoRestrictions;
    }
    RestrictionAnswer::Unstated
}

fn meals_in(normalized: &str) -> Vec<MealKind> {
    let mut meals = Vec::new();
    if has_phrase(normalized, "breakfast") || has_phrase(normalized, "breakfasts") {
        meals.push(MealKind::Breakfast);
    }
    if has_phrase(normalized, "lunch") || has_phrase(normalized, "lunches") {
        meals.push(MealKind::Lunch);
    }
    if ["dinner", "dinners", "supper", "suppers"]
        .iter()
        .any(|w| has_phrase(normalized, w))
    {
        meals.push(MealKind::Dinner);
    }
    meals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_restriction_synonyms() {
        let req = PlanRequest::from_message("I'm vegetarian and have a nut allergy.");
        let RestrictionAnswer::Tags(tags) = req.restrictions else {
            panic!("expected tags, got {:?}", req.restrictions);
        };
        assert!(tags.contains("vegetarian"));
        assert!(tags.contains("nut-free"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn gluten_free_spelled_either_way() {
        for msg in ["Gluten free please", "gluten-free!"] {
            let req = PlanRequest::from_message(msg);
            assert_eq!(
                req.restrictions,
                RestrictionAnswer::Tags(DietaryRestrictions::new(["gluten-free"]))
            );
        }
    }

    #[test]
    fn no_restrictions_is_distinct_from_unstated() {
        assert_eq!(
            PlanRequest::from_message("No dietary restrictions, thanks").restrictions,
            RestrictionAnswer::NoRestrictions
        );
        assert_eq!(
            PlanRequest::from_message("Plan my meals for the week").restrictions,
            RestrictionAnswer::Unstated
        );
    }

    #[test]
    fn words_match_whole() {
        // "ketone" is not "keto"; "nonessential" is not "none".
        let req = PlanRequest::from_message("ketone levels are nonessential");
        assert_eq!(req.restrictions, RestrictionAnswer::Unstated);
    }

    #[test]
    fn reads_meal_kinds_in_serving_order() {
        let req = PlanRequest::from_message("Just dinners and breakfast please");
        assert_eq!(req.meals, vec![MealKind::Breakfast, MealKind::Dinner]);
        assert_eq!(req.meals_or_all(), vec![MealKind::Breakfast, MealKind::Dinner]);
    }

    #[test]
    fn defaults_to_all_meals() {
        let req = PlanRequest::from_message("vegan");
        assert!(req.meals.is_empty());
        assert_eq!(req.meals_or_all(), MealKind::ALL.to_vec());
    }
}
