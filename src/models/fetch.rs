use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ProgressStatus, RateLimitConfig, RateLimitPreset, ScheduleEntry, UploadResult};
use crate::error::{AppError, AppResult};

/// Which calendar span a fetch covers. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum FetchMode {
    #[serde(rename_all = "camelCase")]
    DateRange {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    MultiMonth { year: i32, months: Vec<u32> },
    HijriMonth { year: i32, month: u32 },
}

/// What to fetch and for which districts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    #[serde(flatten)]
    pub mode: FetchMode,
    pub districts: Vec<String>,
}

impl FetchOptions {
    pub fn validate(&self) -> AppResult<()> {
        if self.districts.iter().all(|d| d.trim().is_empty()) {
            return Err(AppError::Validation(
                "At least one district is required".to_string(),
            ));
        }

        match &self.mode {
            FetchMode::DateRange {
                start_date,
                end_date,
            } => {
                if start_date > end_date {
                    return Err(AppError::Validation(
                        "startDate must not be after endDate".to_string(),
                    ));
                }
            }
            FetchMode::MultiMonth { months, .. } => {
                if months.is_empty() {
                    return Err(AppError::Validation(
                        "At least one month is required".to_string(),
                    ));
                }
                if let Some(bad) = months.iter().find(|m| !(1..=12).contains(*m)) {
                    return Err(AppError::Validation(format!(
                        "Month {} is out of range 1-12",
                        bad
                    )));
                }
            }
            FetchMode::HijriMonth { month, .. } => {
                if !(1..=12).contains(month) {
                    return Err(AppError::Validation(format!(
                        "Hijri month {} is out of range 1-12",
                        month
                    )));
                }
            }
        }

        Ok(())
    }

    /// Trimmed, non-empty, de-duplicated district names in request order
    pub fn district_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.districts
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty() && seen.insert(d.to_lowercase()))
            .collect()
    }
}

/// Body of `POST /api/fetch`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    #[serde(flatten)]
    pub options: FetchOptions,
    #[serde(default)]
    pub rate_limit_config: Option<RateLimitConfig>,
    #[serde(default)]
    pub preset: Option<RateLimitPreset>,
    #[serde(default)]
    pub operation_id: Option<Uuid>,
    /// Hand fetched entries to the batch upload service
    #[serde(default)]
    pub persist: bool,
    #[serde(default)]
    pub source_label: Option<String>,
}

impl FetchRequest {
    /// An explicit config wins over a preset name, which wins over the default
    pub fn resolve_rate_limit(&self, default: RateLimitPreset) -> RateLimitConfig {
        self.rate_limit_config
            .unwrap_or_else(|| self.preset.unwrap_or(default).config())
    }
}

/// Unrecoverable failure of one district; its partial results were discarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistrictError {
    pub district: String,
    pub error: String,
}

/// Result of `POST /api/fetch`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub operation_id: Uuid,
    pub status: ProgressStatus,
    pub requests_issued: u64,
    pub entries_fetched: usize,
    pub total: u64,
    pub approximate_total: bool,
    pub errors: Vec<DistrictError>,
    pub entries: Vec<ScheduleEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadSummary>,
}

/// Upload performed after a persisting fetch
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub operation_id: Uuid,
    pub result: UploadResult,
}
