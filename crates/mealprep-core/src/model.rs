use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A meal of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealKind {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealKind {
    /// Every meal kind in serving order.
    pub const ALL: [MealKind; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];
}

impl fmt::Display for MealKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        };
        f.write_str(s)
    }
}

impl FromStr for MealKind {
    type Err = MealKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" | "supper" => Ok(Self::Dinner),
            _ => Err(MealKindParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealKind`] string.
#[derive(Debug, Clone)]
pub struct MealKindParseError(pub String);

impl fmt::Display for MealKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid meal kind: {:?}", self.0)
    }
}

impl std::error::Error for MealKindParseError {}

// ---------------------------------------------------------------------------

/// Day of the week, numbered Monday = 1 through Sunday = 7 (ISO 8601).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    const ORDER: [Weekday; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    /// Map an ISO weekday number (1 = Monday .. 7 = Sunday).
    pub fn from_iso(n: u32) -> Option<Self> {
        n.checked_sub(1)
            .and_then(|i| Self::ORDER.get(i as usize))
            .copied()
    }

    pub fn iso_number(self) -> u32 {
        self as u32 + 1
    }

    /// The following day, wrapping Sunday to Monday.
    pub fn succ(self) -> Self {
        Self::ORDER[(self as usize + 1) % 7]
    }

    /// Seven consecutive days beginning with `self`.
    pub fn week_from(self) -> [Weekday; 7] {
        let mut days = [self; 7];
        for i in 1..7 {
            days[i] = days[i - 1].succ();
        }
        days
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(day: chrono::Weekday) -> Self {
        Self::ORDER[day.num_days_from_monday() as usize]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Weekday {
    type Err = WeekdayParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ORDER
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| WeekdayParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`Weekday`] string.
#[derive(Debug, Clone)]
pub struct WeekdayParseError(pub String);

impl fmt::Display for WeekdayParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid weekday: {:?}", self.0)
    }
}

impl std::error::Error for WeekdayParseError {}

// ---------------------------------------------------------------------------

/// Validation status of a [`CandidateLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Unverified,
    Valid,
    Invalid,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unverified => "unverified",
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Dietary restrictions
// ---------------------------------------------------------------------------

/// The set of dietary restriction tags a plan must honor.
///
/// Tags are normalized to lowercase with words joined by `-`, so
/// `"Gluten Free"` and `"gluten_free"` both become `gluten-free`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct DietaryRestrictions(BTreeSet<String>);

impl DietaryRestrictions {
    /// No restrictions at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            tags.into_iter()
                .map(|t| normalize_tag(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    pub fn insert(&mut self, tag: &str) {
        let tag = normalize_tag(tag);
        if !tag.is_empty() {
            self.0.insert(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(&normalize_tag(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for DietaryRestrictions {
    fn from(tags: Vec<String>) -> Self {
        Self::new(tags)
    }
}

impl fmt::Display for DietaryRestrictions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        let joined = self.0.iter().cloned().collect::<Vec<_>>().join(", ");
        f.write_str(&joined)
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// ---------------------------------------------------------------------------
// Recipe ideas and links
// ---------------------------------------------------------------------------

/// Identity of a recipe idea: its name, trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdeaKey(String);

impl IdeaKey {
    pub fn new(name: &str) -> Self {
        Self(name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdeaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate recipe produced by the idea source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeIdea {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal: Option<MealKind>,
    #[serde(default)]
    pub restrictions: DietaryRestrictions,
}

impl RecipeIdea {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            meal: None,
            restrictions: DietaryRestrictions::none(),
        }
    }

    pub fn with_meal(mut self, meal: MealKind) -> Self {
        self.meal = Some(meal);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_restrictions(mut self, restrictions: DietaryRestrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn key(&self) -> IdeaKey {
        IdeaKey::new(&self.name)
    }
}

/// A URL proposed for a recipe idea, together with its validation status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    pub idea: RecipeIdea,
    pub url: String,
    pub status: LinkStatus,
}

impl CandidateLink {
    /// A freshly proposed link; always starts [`LinkStatus::Unverified`].
    pub fn new(idea: RecipeIdea, url: impl Into<String>) -> Self {
        Self {
            idea,
            url: url.into(),
            status: LinkStatus::Unverified,
        }
    }
}

// ---------------------------------------------------------------------------
// Validated meal set
// ---------------------------------------------------------------------------

/// One recipe whose link passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedMeal {
    pub idea: RecipeIdea,
    pub url: String,
}

/// Recipes with verified links, one entry per idea key, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedMealSet {
    entries: Vec<ValidatedMeal>,
    index: HashMap<IdeaKey, usize>,
}

impl ValidatedMealSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a validated link. Returns `false` (and keeps the existing
    /// entry) when the idea key is already present.
    pub fn insert(&mut self, idea: RecipeIdea, url: impl Into<String>) -> bool {
        let key = idea.key();
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(ValidatedMeal {
            idea,
            url: url.into(),
        });
        true
    }

    pub fn get(&self, key: &IdeaKey) -> Option<&ValidatedMeal> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn contains_key(&self, key: &IdeaKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.find_url(url).is_some()
    }

    /// The first entry validated with `url`.
    pub fn find_url(&self, url: &str) -> Option<&ValidatedMeal> {
        self.entries.iter().find(|e| e.url == url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatedMeal> {
        self.entries.iter()
    }

    /// Entries tagged with the given meal kind, plus untagged entries.
    pub fn for_meal(&self, meal: MealKind) -> impl Iterator<Item = &ValidatedMeal> {
        self.entries
            .iter()
            .filter(move |e| e.idea.meal.is_none_or(|m| m == meal))
    }
}

impl Serialize for ValidatedMealSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// One meal in the schedule, pointing at a validated recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealSlot {
    pub meal: MealKind,
    pub recipe: String,
    pub url: String,
}

/// The meals planned for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: Weekday,
    pub meals: Vec<MealSlot>,
}

/// A week of meals starting on the anchor weekday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub days: Vec<DayPlan>,
}

impl WeeklySchedule {
    /// Number of slots referencing each recipe key.
    pub fn recipe_counts(&self) -> HashMap<IdeaKey, usize> {
        let mut counts = HashMap::new();
        for slot in self.days.iter().flat_map(|d| d.meals.iter()) {
            *counts.entry(IdeaKey::new(&slot.recipe)).or_insert(0) += 1;
        }
        counts
    }

    pub fn slot_count(&self) -> usize {
        self.days.iter().map(|d| d.meals.len()).sum()
    }
}

/// The artifact returned to the user: an accepted schedule and the ideas
/// that had to be dropped because no working link was found.
#[derive(Debug, Clone, Serialize)]
pub struct MealPlan {
    pub anchor: Weekday,
    pub restrictions: DietaryRestrictions,
    pub schedule: WeeklySchedule,
    pub dropped: Vec<RecipeIdea>,
}

impl MealPlan {
    pub fn is_partial(&self) -> bool {
        !self.dropped.is_empty()
    }
}
