//! Acceptance rules for schedules coming back from the schedule builder, and
//! rendering of the final plan.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use thiserror::Error;

use crate::model::{IdeaKey, MealKind, MealPlan, ValidatedMealSet, Weekday, WeeklySchedule};

/// One way a schedule breaks the rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleViolation {
    #[error("{recipe:?} appears {count} times (max {max})")]
    TooManyRepeats {
        recipe: String,
        count: usize,
        max: u32,
    },

    #[error("{day} {meal} uses a link that was never validated: {url}")]
    UnknownLink {
        day: Weekday,
        meal: MealKind,
        url: String,
    },

    #[error("{day} {meal} calls {url} {recipe:?}, but it was validated as a different recipe")]
    MismatchedRecipe {
        day: Weekday,
        meal: MealKind,
        recipe: String,
        url: String,
    },

    #[error("schedule has {0} days, expected 7")]
    WrongLength(usize),

    #[error("day {index} is {found}, expected {expected}")]
    WrongDay {
        index: usize,
        expected: Weekday,
        found: Weekday,
    },

    #[error("{day} has {count} meals (max 3)")]
    TooManyMeals { day: Weekday, count: usize },

    #[error("{day} includes {meal}, which was not requested")]
    UnrequestedMeal { day: Weekday, meal: MealKind },

    #[error("{day} has more than one {meal}")]
    DuplicateMeal { day: Weekday, meal: MealKind },
}

/// Join violations into one line, for logs and builder feedback.
pub fn describe_violations(violations: &[ScheduleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Check `schedule` against the validated set and the request.
///
/// Returns every violation found, not just the first, so a retry can be told
/// all of them at once.
pub fn check_schedule(
    schedule: &WeeklySchedule,
    validated: &ValidatedMealSet,
    anchor: Weekday,
    meals: &[MealKind],
    max_repeats: u32,
) -> Result<(), Vec<ScheduleViolation>> {
    let mut violations = Vec::new();

    // Repeats are counted per recipe page, so renaming a slot does not reset
    // the count.
    let mut by_url: HashMap<&str, (IdeaKey, usize)> = HashMap::new();
    for slot in schedule.days.iter().flat_map(|d| d.meals.iter()) {
        let entry = by_url.entry(slot.url.as_str()).or_insert_with(|| {
            let key = validated
                .find_url(&slot.url)
                .map(|v| v.idea.key())
                .unwrap_or_else(|| IdeaKey::new(&slot.recipe));
            (key, 0)
        });
        entry.1 += 1;
    }
    let mut counts: Vec<_> = by_url.into_values().collect();
    counts.sort();
    for (key, count) in counts {
        if count > max_repeats as usize {
            violations.push(ScheduleViolation::TooManyRepeats {
                recipe: key.to_string(),
                count,
                max: max_repeats,
            });
        }
    }

    if schedule.days.len() != 7 {
        violations.push(ScheduleViolation::WrongLength(schedule.days.len()));
    }
    for (index, (plan, expected)) in schedule.days.iter().zip(anchor.week_from()).enumerate() {
        if plan.day != expected {
            violations.push(ScheduleViolation::WrongDay {
                index,
                expected,
                found: plan.day,
            });
        }
    }

    for plan in &schedule.days {
        if plan.meals.len() > 3 {
            violations.push(ScheduleViolation::TooManyMeals {
                day: plan.day,
                count: plan.meals.len(),
            });
        }
        let mut seen = HashSet::new();
        for slot in &plan.meals {
            if !meals.contains(&slot.meal) {
                violations.push(ScheduleViolation::UnrequestedMeal {
                    day: plan.day,
                    meal: slot.meal,
                });
            }
            if !seen.insert(slot.meal) {
                violations.push(ScheduleViolation::DuplicateMeal {
                    day: plan.day,
                    meal: slot.meal,
                });
            }
            let named = validated.get(&IdeaKey::new(&slot.recipe));
            if named.is_some_and(|entry| entry.url == slot.url) {
                continue;
            }
            if validated.contains_url(&slot.url) {
                violations.push(ScheduleViolation::MismatchedRecipe {
                    day: plan.day,
                    meal: slot.meal,
                    recipe: slot.recipe.clone(),
                    url: slot.url.clone(),
                });
            } else {
                violations.push(ScheduleViolation::UnknownLink {
                    day: plan.day,
                    meal: slot.meal,
                    url: slot.url.clone(),
                });
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the plan as the markdown reply shown to the user.
pub fn render_markdown(plan: &MealPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Your meal plan, starting {}", plan.anchor);
    let _ = writeln!(out);
    let _ = writeln!(out, "Dietary restrictions: {}", plan.restrictions);

    for day in &plan.schedule.days {
        let _ = writeln!(out);
        let _ = writeln!(out, "### {}", day.day);
        let mut meals = day.meals.clone();
        meals.sort_by_key(|s| s.meal);
        for slot in meals {
            let _ = writeln!(
                out,
                "- **{}**: [{}]({})",
                capitalize(&slot.meal.to_string()),
                slot.recipe,
                slot.url
            );
        }
    }

    if plan.is_partial() {
        let _ = writeln!(out);
        let names = plan
            .dropped
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            out,
            "_Note: no working recipe link could be found for: {names}. These were left out of the plan._"
        );
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DayPlan, DietaryRestrictions, MealSlot, RecipeIdea};

    fn validated() -> ValidatedMealSet {
        let mut set = ValidatedMealSet::new();
        set.insert(RecipeIdea::new("Oatmeal"), "https://x.example/oatmeal");
        set.insert(RecipeIdea::new("Curry"), "https://x.example/curry");
        set.insert(RecipeIdea::new("Tacos"), "https://x.example/tacos");
        set
    }

    fn slot(meal: MealKind, recipe: &str) -> MealSlot {
        MealSlot {
            meal,
            recipe: recipe.to_string(),
            url: format!("https://x.example/{}", recipe.to_lowercase()),
        }
    }

    /// Seven days from `anchor`, dinner only, rotating through three recipes.
    fn good_schedule(anchor: Weekday) -> WeeklySchedule {
        let dinners = ["Curry", "Tacos", "Oatmeal"];
        WeeklySchedule {
            days: anchor
                .week_from()
                .iter()
                .enumerate()
                .map(|(i, &day)| DayPlan {
                    day,
                    meals: vec![slot(MealKind::Dinner, dinners[i % 3])],
                })
                .collect(),
        }
    }

    #[test]
    fn accepts_conforming_schedule() {
        let schedule = good_schedule(Weekday::Thursday);
        check_schedule(&schedule, &validated(), Weekday::Thursday, &[MealKind::Dinner], 3).unwrap();
    }

    #[test]
    fn rejects_too_many_repeats() {
        let mut schedule = good_schedule(Weekday::Monday);
        for day in &mut schedule.days {
            day.meals = vec![slot(MealKind::Dinner, "Curry")];
        }
        let errs = check_schedule(&schedule, &validated(), Weekday::Monday, &[MealKind::Dinner], 3)
            .unwrap_err();
        assert_eq!(
            errs,
            vec![ScheduleViolation::TooManyRepeats {
                recipe: "curry".to_string(),
                count: 7,
                max: 3,
            }]
        );
    }

    #[test]
    fn rejects_unvalidated_link() {
        let mut schedule = good_schedule(Weekday::Monday);
        schedule.days[2].meals[0].url = "https://made.up/recipe".to_string();
        let errs = check_schedule(&schedule, &validated(), Weekday::Monday, &[MealKind::Dinner], 3)
            .unwrap_err();
        assert!(matches!(
            &errs[0],
            ScheduleViolation::UnknownLink { day: Weekday::Wednesday, .. }
        ));
    }

    #[test]
    fn renamed_slots_still_count_as_repeats() {
        let names = [
            "Curry",
            "Curry",
            "Curry",
            "Chicken Curry",
            "Chicken Curry",
            "Chicken Curry",
            "Pizza",
        ];
        let mut schedule = good_schedule(Weekday::Monday);
        for (day, name) in schedule.days.iter_mut().zip(names) {
            day.meals = vec![MealSlot {
                meal: MealKind::Dinner,
                recipe: name.to_string(),
                url: "https://x.example/curry".to_string(),
            }];
        }

        let errs = check_schedule(&schedule, &validated(), Weekday::Monday, &[MealKind::Dinner], 3)
            .unwrap_err();
        assert_eq!(
            errs[0],
            ScheduleViolation::TooManyRepeats {
                recipe: "curry".to_string(),
                count: 7,
                max: 3,
            }
        );
        let mismatched: Vec<_> = errs
            .iter()
            .filter_map(|e| match e {
                ScheduleViolation::MismatchedRecipe { recipe, .. } => Some(recipe.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            mismatched,
            vec!["Chicken Curry", "Chicken Curry", "Chicken Curry", "Pizza"]
        );
    }

    #[test]
    fn validated_name_with_another_recipes_link_is_rejected() {
        let mut schedule = good_schedule(Weekday::Monday);
        schedule.days[0].meals[0].url = "https://x.example/tacos".to_string();
        let errs = check_schedule(&schedule, &validated(), Weekday::Monday, &[MealKind::Dinner], 3)
            .unwrap_err();
        assert_eq!(
            errs,
            vec![ScheduleViolation::MismatchedRecipe {
                day: Weekday::Monday,
                meal: MealKind::Dinner,
                recipe: "Curry".to_string(),
                url: "https://x.example/tacos".to_string(),
            }]
        );
    }

    #[test]
    fn rejects_wrong_anchor_and_length() {
        let mut schedule = good_schedule(Weekday::Monday);
        schedule.days.pop();
        let errs = check_schedule(&schedule, &validated(), Weekday::Tuesday, &[MealKind::Dinner], 3)
            .unwrap_err();
        assert!(errs.contains(&ScheduleViolation::WrongLength(6)));
        assert!(errs.contains(&ScheduleViolation::WrongDay {
            index: 0,
            expected: Weekday::Tuesday,
            found: Weekday::Monday,
        }));
    }

    #[test]
    fn rejects_unrequested_and_duplicate_meals() {
        let mut schedule = good_schedule(Weekday::Monday);
        schedule.days[0].meals.push(slot(MealKind::Dinner, "Tacos"));
        schedule.days[1].meals.push(slot(MealKind::Breakfast, "Oatmeal"));
        let errs = check_schedule(&schedule, &validated(), Weekday::Monday, &[MealKind::Dinner], 3)
            .unwrap_err();
        assert!(errs.contains(&ScheduleViolation::DuplicateMeal {
            day: Weekday::Monday,
            meal: MealKind::Dinner,
        }));
        assert!(errs.contains(&ScheduleViolation::UnrequestedMeal {
            day: Weekday::Tuesday,
            meal: MealKind::Breakfast,
        }));
    }

    #[test]
    fn rejects_more_than_three_meals() {
        let mut schedule = good_schedule(Weekday::Monday);
        schedule.days[0].meals = vec![
            slot(MealKind::Breakfast, "Oatmeal"),
            slot(MealKind::Lunch, "Tacos"),
            slot(MealKind::Dinner, "Curry"),
            slot(MealKind::Dinner, "Tacos"),
        ];
        let errs =
            check_schedule(&schedule, &validated(), Weekday::Monday, &MealKind::ALL, 3).unwrap_err();
        assert!(errs.contains(&ScheduleViolation::TooManyMeals {
            day: Weekday::Monday,
            count: 4,
        }));
    }

    #[test]
    fn markdown_lists_links_and_dropped_recipes() {
        let plan = MealPlan {
            anchor: Weekday::Friday,
            restrictions: DietaryRestrictions::new(["vegan"]),
            schedule: good_schedule(Weekday::Friday),
            dropped: vec![RecipeIdea::new("Mushroom Risotto")],
        };
        let md = render_markdown(&plan);
        assert!(md.starts_with("## Your meal plan, starting Friday"));
        assert!(md.contains("Dietary restrictions: vegan"));
        assert!(md.contains("### Friday\n- **Dinner**: [Curry](https://x.example/curry)"));
        assert!(md.contains("Mushroom Risotto"));
    }

    #[test]
    fn markdown_without_dropped_has_no_note() {
        let plan = MealPlan {
            anchor: Weekday::Monday,
            restrictions: DietaryRestrictions::none(),
            schedule: good_schedule(Weekday::Monday),
            dropped: Vec::new(),
        };
        assert!(!render_markdown(&plan).contains("Note:"));
    }

    #[test]
    fn violations_join_into_one_line() {
        let line = describe_violations(&[
            ScheduleViolation::WrongLength(5),
            ScheduleViolation::TooManyMeals {
                day: Weekday::Sunday,
                count: 4,
            },
        ]);
        assert_eq!(line, "schedule has 5 days, expected 7; Sunday has 4 meals (max 3)");
    }
}
