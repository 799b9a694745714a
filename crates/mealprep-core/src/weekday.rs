//! Anchor weekday resolution.

use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;

use crate::config::{ConfigError, parse_time_zone};
use crate::model::Weekday;

/// The current weekday in the named IANA time zone.
///
/// An absent or unrecognized identifier is a [`ConfigError`]; there is no
/// sensible default across deployments.
pub fn current_weekday(timezone_id: Option<&str>) -> Result<Weekday, ConfigError> {
    let tz = parse_time_zone(timezone_id)?;
    Ok(weekday_at(tz, Utc::now()))
}

/// The weekday `instant` falls on in `tz`.
pub fn weekday_at(tz: Tz, instant: DateTime<Utc>) -> Weekday {
    Weekday::from(instant.with_timezone(&tz).date_naive().weekday())
}

/// Sentence handed to the schedule builder, e.g.
/// "The current day of the week is Tuesday".
pub fn describe(day: Weekday) -> String {
    format!("The current day of the week is {day}")
}
