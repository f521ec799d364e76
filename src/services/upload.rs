//! Validated, chunked, transactional upload of schedule entries.
//!
//! Rows are validated and de-duplicated up front, then written in batches of
//! `UploadConfig::batch_size`, one transaction per batch. A failed batch is
//! rolled back and each of its rows is retried on its own, so one bad row
//! cannot sink its neighbours. An unreachable store stops the upload at once
//! without the per-row fallback. An audit record is written for every upload.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::progress::ProgressHub;
use crate::config::UploadConfig;
use crate::error::{ProgressError, StoreError};
use crate::models::{
    NewUploadLog, OperationType, ProgressStatus, ProgressUpdate, RowError, ScheduleEntry,
    UploadResponse, UploadResult,
};
use crate::store::ScheduleStore;

/// Entry that passed validation and deduplication, with its 1-based row number
struct AcceptedRow {
    row: usize,
    entry: ScheduleEntry,
}

/// Splits submitted entries into accepted rows and row errors.
///
/// Later occurrences of a `(date, location)` key are rejected as
/// `duplicate of row N`, where N is the first occurrence.
fn screen(entries: Vec<ScheduleEntry>) -> (Vec<AcceptedRow>, Vec<RowError>) {
    let mut accepted = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    let mut first_seen: HashMap<(String, String), usize> = HashMap::new();

    for (index, mut entry) in entries.into_iter().enumerate() {
        let row = index + 1;
        if let Err(reason) = entry.validate() {
            errors.push(RowError::new(row, reason));
            continue;
        }

        entry.location = entry.location.trim().to_string();
        let key = (entry.date.clone(), entry.location.clone());
        if let Some(first) = first_seen.get(&key) {
            errors.push(RowError::new(row, format!("duplicate of row {}", first)));
            continue;
        }
        first_seen.insert(key, row);
        accepted.push(AcceptedRow { row, entry });
    }

    (accepted, errors)
}

pub struct BatchUploadService {
    store: Arc<dyn ScheduleStore>,
    config: UploadConfig,
    hub: ProgressHub,
}

impl BatchUploadService {
    pub fn new(store: Arc<dyn ScheduleStore>, config: UploadConfig, hub: ProgressHub) -> Self {
        Self { store, config, hub }
    }

    pub fn store(&self) -> &Arc<dyn ScheduleStore> {
        &self.store
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    /// Pushes an update, logging when the operation can no longer take one
    fn report(&self, id: Uuid, update: ProgressUpdate) {
        if let Err(e) = self.hub.update(id, update) {
            log::warn!("Dropped upload progress update: {}", e);
        }
    }

    /// Delay before attempt `attempt + 1` of a single row
    fn row_retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.config
            .retry_base_delay
            .mul_f64(self.config.retry_multiplier.max(1.0).powi(exponent))
    }

    async fn upsert_row_with_retry(&self, entry: &ScheduleEntry) -> Result<(), StoreError> {
        let max_attempts = self.config.max_row_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.upsert(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_unavailable() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.row_retry_delay(attempt);
                    log::warn!(
                        "Row {} @ {} failed (attempt {}/{}), retrying in {:?}: {}",
                        entry.date,
                        entry.location,
                        attempt,
                        max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Validates, de-duplicates and persists `entries`.
    ///
    /// `operation_id` lets a caller subscribe before the upload starts. Only
    /// failing to set up progress tracking is an error; every row-level
    /// problem ends up in the returned [`UploadResult`].
    pub async fn upload(
        &self,
        entries: Vec<ScheduleEntry>,
        source_label: &str,
        operation_id: Option<Uuid>,
    ) -> Result<UploadResponse, ProgressError> {
        let total = entries.len() as u64;
        let id = self.hub.ensure(operation_id, OperationType::Upload, total)?;
        let cancel = self.hub.cancellation_token(id)?;

        self.report(
            id,
            ProgressUpdate::new()
                .status(ProgressStatus::Validating)
                .message(format!("Validating {} rows", total)),
        );

        let (accepted, mut errors) = screen(entries);
        let skipped = total - accepted.len() as u64;
        if !errors.is_empty() {
            log::info!(
                "Upload '{}': {} of {} rows rejected before persisting",
                source_label,
                errors.len(),
                total
            );
        }

        let batch_size = self.config.batch_size.max(1);
        let total_batches = accepted.len().div_ceil(batch_size) as u32;
        let mut done = skipped;
        let mut row_count = 0usize;
        let mut retried = 0usize;
        let mut rolled_back = false;
        let mut persistence_failed = false;
        let mut cancelled = false;
        let mut unavailable: Option<String> = None;

        self.report(id, ProgressUpdate::new().current(done));

        'batches: for (index, chunk) in accepted.chunks(batch_size).enumerate() {
            let batch = index as u32 + 1;

            if cancel.is_cancelled() {
                log::info!(
                    "Upload '{}' cancelled before batch {}/{}",
                    source_label,
                    batch,
                    total_batches
                );
                cancelled = true;
                persistence_failed = true;
                errors.extend(
                    accepted[index * batch_size..]
                        .iter()
                        .map(|r| RowError::new(r.row, "Upload cancelled")),
                );
                break;
            }

            self.report(
                id,
                ProgressUpdate::new()
                    .status(ProgressStatus::Uploading)
                    .batch(batch, total_batches)
                    .message(format!("Uploading batch {}/{}", batch, total_batches)),
            );

            let rows: Vec<ScheduleEntry> = chunk.iter().map(|r| r.entry.clone()).collect();
            match self.store.upsert_batch(&rows).await {
                Ok(()) => {
                    row_count += rows.len();
                    done += rows.len() as u64;
                    self.report(id, ProgressUpdate::new().current(done));
                }
                Err(e) if e.is_unavailable() => {
                    log::error!(
                        "Store unavailable at batch {}/{} of '{}', aborting upload: {}",
                        batch,
                        total_batches,
                        source_label,
                        e
                    );
                    persistence_failed = true;
                    let reason = e.to_string();
                    errors.extend(
                        accepted[index * batch_size..]
                            .iter()
                            .map(|r| RowError::new(r.row, reason.clone())),
                    );
                    unavailable = Some(reason);
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "Batch {}/{} of '{}' rolled back, retrying {} rows individually: {}",
                        batch,
                        total_batches,
                        source_label,
                        rows.len(),
                        e
                    );
                    rolled_back = true;
                    self.report(
                        id,
                        ProgressUpdate::new()
                            .status(ProgressStatus::Retrying)
                            .message(format!("Batch {} failed, retrying rows", batch)),
                    );

                    for (offset, accepted_row) in chunk.iter().enumerate() {
                        retried += 1;
                        match self.upsert_row_with_retry(&accepted_row.entry).await {
                            Ok(()) => row_count += 1,
                            Err(e) if e.is_unavailable() => {
                                log::error!(
                                    "Store unavailable during row fallback of '{}', aborting upload: {}",
                                    source_label,
                                    e
                                );
                                persistence_failed = true;
                                let reason = e.to_string();
                                errors.extend(
                                    accepted[index * batch_size + offset..]
                                        .iter()
                                        .map(|r| RowError::new(r.row, reason.clone())),
                                );
                                unavailable = Some(reason);
                                break 'batches;
                            }
                            Err(e) => {
                                log::warn!("Row {} could not be persisted: {}", accepted_row.row, e);
                                persistence_failed = true;
                                errors.push(RowError::new(accepted_row.row, e.to_string()));
                            }
                        }
                        done += 1;
                        self.report(id, ProgressUpdate::new().current(done));
                    }
                }
            }
        }

        errors.sort_by_key(|e| e.row);
        let result = UploadResult {
            success: row_count > 0 && !persistence_failed,
            row_count,
            errors,
            retried,
            rolled_back,
        };

        self.write_audit(source_label, &result).await;

        let summary = format!(
            "{} of {} rows persisted, {} errors",
            result.row_count,
            total,
            result.errors.len()
        );
        let finish = if cancelled {
            self.hub.fail(id, format!("Upload cancelled: {}", summary))
        } else if let Some(reason) = unavailable {
            self.hub.fail(id, format!("Upload aborted, {}: {}", reason, summary))
        } else if result.row_count == 0 {
            self.hub.fail(id, format!("Nothing persisted: {}", summary))
        } else {
            self.hub.update(
                id,
                ProgressUpdate::new()
                    .current(total)
                    .status(ProgressStatus::Completed)
                    .message(summary),
            )
        };
        if let Err(e) = finish {
            log::warn!("Could not finish upload operation: {}", e);
        }

        log::info!(
            "Upload '{}' finished: status={}, rows={}, retried={}, rolled_back={}",
            source_label,
            result.status(),
            result.row_count,
            result.retried,
            result.rolled_back
        );

        Ok(UploadResponse {
            operation_id: id,
            result,
        })
    }

    async fn write_audit(&self, source_label: &str, result: &UploadResult) {
        let log = NewUploadLog {
            source_label: source_label.to_string(),
            row_count: result.row_count,
            status: result.status(),
            errors: result.errors.clone(),
        };
        if let Err(e) = self.store.record_upload(&log).await {
            log::error!("Failed to write upload audit record for '{}': {}", source_label, e);
        }
    }
}
