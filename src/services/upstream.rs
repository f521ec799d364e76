//! Upstream prayer-times API: URL construction and payload normalization.
//!
//! The API wraps every payload in `{code, status, data}`. `data` is a single
//! day for `timingsByCity` and an array of days for the calendar endpoints.
//! Sehri is taken from `Fajr`, Iftar from `Maghrib`.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::config::UpstreamConfig;
use crate::error::FetchError;
use crate::models::schedule::is_valid_time;
use crate::models::ScheduleEntry;

#[derive(Debug, Deserialize)]
pub struct UpstreamEnvelope {
    pub code: u16,
    #[serde(default)]
    pub status: Option<String>,
    pub data: DayData,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DayData {
    One(DayPayload),
    Many(Vec<DayPayload>),
}

#[derive(Debug, Deserialize)]
pub struct DayPayload {
    pub timings: Timings,
    pub date: DateInfo,
}

#[derive(Debug, Deserialize)]
pub struct Timings {
    #[serde(rename = "Fajr")]
    pub fajr: String,
    #[serde(rename = "Maghrib")]
    pub maghrib: String,
}

#[derive(Debug, Deserialize)]
pub struct DateInfo {
    pub gregorian: GregorianDate,
}

#[derive(Debug, Deserialize)]
pub struct GregorianDate {
    /// `DD-MM-YYYY`
    pub date: String,
}

/// Builds endpoint URLs for one upstream deployment
#[derive(Debug, Clone)]
pub struct UpstreamApi {
    base_url: String,
    country: String,
    method: u32,
}

impl UpstreamApi {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
            method: config.method,
        }
    }

    fn build(&self, path: &str, district: &str) -> Result<String, FetchError> {
        let method = self.method.to_string();
        url::Url::parse_with_params(
            &format!("{}{}", self.base_url, path),
            &[
                ("city", district),
                ("country", self.country.as_str()),
                ("method", method.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|e| FetchError::Decode(format!("Invalid upstream URL: {}", e)))
    }

    /// Timings for a single Gregorian day
    pub fn day_url(&self, district: &str, date: NaiveDate) -> Result<String, FetchError> {
        self.build(
            &format!("/timingsByCity/{}", date.format("%d-%m-%Y")),
            district,
        )
    }

    /// Calendar for a Gregorian month
    pub fn month_url(&self, district: &str, year: i32, month: u32) -> Result<String, FetchError> {
        self.build(&format!("/calendarByCity/{}/{}", year, month), district)
    }

    /// Calendar for a Hijri month
    pub fn hijri_url(&self, district: &str, year: i32, month: u32) -> Result<String, FetchError> {
        self.build(&format!("/hijriCalendarByCity/{}/{}", year, month), district)
    }
}

/// `"04:45 (+06)"` → `"04:45"`, `"4:45"` → `"04:45"`
pub fn normalize_time(raw: &str) -> Option<String> {
    let token = raw.split_whitespace().next()?;
    let time = if token.len() == 4 && token.as_bytes().get(1) == Some(&b':') {
        format!("0{}", token)
    } else {
        token.to_string()
    };
    is_valid_time(&time).then_some(time)
}

/// `"01-03-2026"` → `"2026-03-01"`
pub fn normalize_date(raw: &str) -> Option<String> {
    NaiveDate::parse_from_str(raw.trim(), "%d-%m-%Y")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn normalize_day(day: &DayPayload, location: &str) -> Result<ScheduleEntry, FetchError> {
    let date = normalize_date(&day.date.gregorian.date).ok_or_else(|| {
        FetchError::Decode(format!("Unparseable date '{}'", day.date.gregorian.date))
    })?;
    let sehri = normalize_time(&day.timings.fajr)
        .ok_or_else(|| FetchError::Decode(format!("Unparseable Fajr '{}'", day.timings.fajr)))?;
    let iftar = normalize_time(&day.timings.maghrib).ok_or_else(|| {
        FetchError::Decode(format!("Unparseable Maghrib '{}'", day.timings.maghrib))
    })?;

    Ok(ScheduleEntry {
        date,
        sehri,
        iftar,
        location: location.to_string(),
    })
}

/// Converts an upstream envelope into schedule entries for `location`, in payload order
pub fn normalize(envelope: &UpstreamEnvelope, location: &str) -> Result<Vec<ScheduleEntry>, FetchError> {
    if envelope.code != 200 {
        return Err(FetchError::Decode(format!(
            "Upstream reported code {} ({})",
            envelope.code,
            envelope.status.as_deref().unwrap_or("no status")
        )));
    }

    match &envelope.data {
        DayData::One(day) => Ok(vec![normalize_day(day, location)?]),
        DayData::Many(days) => days.iter().map(|d| normalize_day(d, location)).collect(),
    }
}
