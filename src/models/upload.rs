use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ScheduleEntry;

/// Error attributed to one submitted row (1-based)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub error: String,
}

impl RowError {
    pub fn new(row: usize, error: impl Into<String>) -> Self {
        Self {
            row,
            error: error.into(),
        }
    }
}

/// Outcome of a batch upload. `row_count` only counts durably persisted rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    pub row_count: usize,
    pub errors: Vec<RowError>,
    /// Rows that went through the per-row fallback after a batch failure
    pub retried: usize,
    /// True when at least one batch transaction was rolled back
    pub rolled_back: bool,
}

impl UploadResult {
    pub fn status(&self) -> UploadStatus {
        if self.row_count == 0 {
            UploadStatus::Failed
        } else if self.errors.is_empty() {
            UploadStatus::Success
        } else {
            UploadStatus::Partial
        }
    }
}

/// Audit status of an upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    Partial,
    Failed,
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStatus::Success => write!(f, "success"),
            UploadStatus::Partial => write!(f, "partial"),
            UploadStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record written after every upload attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUploadLog {
    pub source_label: String,
    pub row_count: usize,
    pub status: UploadStatus,
    pub errors: Vec<RowError>,
}

/// Persisted audit record
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UploadLog {
    pub id: i64,
    pub source_label: String,
    pub row_count: i32,
    pub status: UploadStatus,
    pub errors: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/upload`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub entries: Vec<ScheduleEntry>,
    pub source_label: String,
    #[serde(default)]
    pub operation_id: Option<Uuid>,
}

/// Response of `POST /api/upload`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub operation_id: Uuid,
    pub result: UploadResult,
}
