use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One day's Sehri/Iftar times for a location.
///
/// `(date, location)` is the natural key and the upsert key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// ISO-8601 calendar date (`YYYY-MM-DD`)
    pub date: String,
    /// `HH:mm`
    pub sehri: String,
    /// `HH:mm`
    pub iftar: String,
    pub location: String,
}

impl ScheduleEntry {
    pub fn new(date: &str, sehri: &str, iftar: &str, location: &str) -> Self {
        Self {
            date: date.to_string(),
            sehri: sehri.to_string(),
            iftar: iftar.to_string(),
            location: location.to_string(),
        }
    }

    /// Key used for deduplication and upsert
    pub fn key(&self) -> (&str, &str) {
        (self.date.as_str(), self.location.trim())
    }

    /// Structural validation. Returns a human readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if parse_date(&self.date).is_none() {
            return Err(format!("Invalid date '{}', expected YYYY-MM-DD", self.date));
        }
        if !is_valid_time(&self.sehri) {
            return Err(format!("Invalid sehri time '{}', expected HH:mm", self.sehri));
        }
        if !is_valid_time(&self.iftar) {
            return Err(format!("Invalid iftar time '{}', expected HH:mm", self.iftar));
        }
        if self.location.trim().is_empty() {
            return Err("Location cannot be empty".to_string());
        }
        Ok(())
    }

    /// Parsed date; only meaningful after `validate` succeeded
    pub fn naive_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Strict `HH:mm` (two digits each, 00-23 / 00-59)
pub fn is_valid_time(value: &str) -> bool {
    value.len() == 5 && NaiveTime::parse_from_str(value, "%H:%M").is_ok()
}

/// Persisted schedule row
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRow {
    pub date: NaiveDate,
    pub sehri: String,
    pub iftar: String,
    pub location: String,
    pub updated_at: DateTime<Utc>,
}

impl From<ScheduleRow> for ScheduleEntry {
    fn from(row: ScheduleRow) -> Self {
        Self {
            date: row.date.format("%Y-%m-%d").to_string(),
            sehri: row.sehri,
            iftar: row.iftar,
            location: row.location,
        }
    }
}

/// Filter for reading persisted entries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleQuery {
    pub location: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ScheduleQuery {
    pub fn matches(&self, entry: &ScheduleEntry) -> bool {
        if let Some(ref location) = self.location {
            if !entry.location.eq_ignore_ascii_case(location.trim()) {
                return false;
            }
        }
        let Some(date) = entry.naive_date() else {
            return false;
        };
        if self.from.is_some_and(|from| date < from) {
            return false;
        }
        if self.to.is_some_and(|to| date > to) {
            return false;
        }
        true
    }
}
