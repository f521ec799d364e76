use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of work an operation tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Fetch,
    Upload,
}

/// Lifecycle status of a tracked operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Initializing,
    Fetching,
    Validating,
    Uploading,
    Retrying,
    Processing,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Failed)
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProgressStatus::Initializing => "initializing",
            ProgressStatus::Fetching => "fetching",
            ProgressStatus::Validating => "validating",
            ProgressStatus::Uploading => "uploading",
            ProgressStatus::Retrying => "retrying",
            ProgressStatus::Processing => "processing",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Live progress state, as streamed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressOperation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub current: u64,
    pub total: u64,
    pub percentage: u8,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_batches: Option<u32>,
    /// Set when `total` is an estimate (Hijri months)
    pub approximate_total: bool,
}

impl ProgressOperation {
    pub fn new(id: Uuid, operation_type: OperationType, total: u64) -> Self {
        Self {
            id,
            operation_type,
            current: 0,
            total,
            percentage: 0,
            status: ProgressStatus::Initializing,
            current_district: None,
            message: None,
            batch: None,
            total_batches: None,
            approximate_total: false,
        }
    }

    /// Merges a partial update. `current` never moves backwards.
    pub fn apply(&mut self, update: ProgressUpdate) {
        if let Some(total) = update.total {
            self.total = total;
        }
        if let Some(current) = update.current {
            self.current = self.current.max(current);
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(district) = update.current_district {
            self.current_district = Some(district);
        }
        if let Some(message) = update.message {
            self.message = Some(message);
        }
        if let Some(batch) = update.batch {
            self.batch = Some(batch);
        }
        if let Some(total_batches) = update.total_batches {
            self.total_batches = Some(total_batches);
        }
        if let Some(approximate) = update.approximate_total {
            self.approximate_total = approximate;
        }
        self.percentage = percentage(self.current, self.total);
    }
}

fn percentage(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (current.saturating_mul(100) / total).min(100) as u8
}

/// Partial update merged into a `ProgressOperation`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub current: Option<u64>,
    pub total: Option<u64>,
    pub status: Option<ProgressStatus>,
    pub current_district: Option<String>,
    pub message: Option<String>,
    pub batch: Option<u32>,
    pub total_batches: Option<u32>,
    pub approximate_total: Option<bool>,
}

impl ProgressUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ProgressStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn current(mut self, current: u64) -> Self {
        self.current = Some(current);
        self
    }

    pub fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn district(mut self, district: impl Into<String>) -> Self {
        self.current_district = Some(district.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn batch(mut self, batch: u32, total_batches: u32) -> Self {
        self.batch = Some(batch);
        self.total_batches = Some(total_batches);
        self
    }

    pub fn approximate_total(mut self, approximate: bool) -> Self {
        self.approximate_total = Some(approximate);
        self
    }
}

/// Body of `POST /api/progress`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperation {
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    #[serde(default)]
    pub total: u64,
}
