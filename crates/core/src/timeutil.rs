//! Calendar keys for exposure counters.
//!
//! Month keys are `YYYY-MM`; week keys are ISO-8601 (`YYYY-Www`, Monday
//! start), both in UTC. The ISO year can differ from the calendar year
//! around January 1st, which is exactly why these helpers exist.

use chrono::{DateTime, Datelike, Duration, IsoWeek, Utc};

/// Returns the `YYYY-MM` month key for a UTC instant.
#[must_use]
pub fn month_key(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// Returns the `YYYY-Www` ISO week key for a UTC instant.
#[must_use]
pub fn iso_week_key(at: DateTime<Utc>) -> String {
    format_iso_week(at.iso_week())
}

/// Returns the ISO week key for the week N weeks before the given instant.
#[must_use]
pub fn iso_week_key_back(at: DateTime<Utc>, weeks_back: i64) -> String {
    format_iso_week((at - Duration::weeks(weeks_back)).iso_week())
}

fn format_iso_week(week: IsoWeek) -> String {
    format!("{:04}-W{:02}", week.year(), week.week())
}
