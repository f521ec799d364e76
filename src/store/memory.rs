use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::ScheduleStore;
use crate::error::StoreError;
use crate::models::{NewUploadLog, ScheduleEntry, ScheduleQuery, UploadLog};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: ScheduleEntry,
    /// Bumped only when sehri/iftar actually change
    revision: u64,
}

#[derive(Default)]
struct MemoryState {
    // Keyed by (location, date) so iteration matches the SQL ordering
    entries: BTreeMap<(String, String), StoredEntry>,
    uploads: Vec<UploadLog>,
}

impl MemoryState {
    fn apply(&mut self, entry: &ScheduleEntry) {
        let location = entry.location.trim().to_string();
        let key = (location.clone(), entry.date.clone());
        let normalized = ScheduleEntry {
            location,
            ..entry.clone()
        };

        match self.entries.get_mut(&key) {
            Some(stored) if stored.entry == normalized => {}
            Some(stored) => {
                stored.entry = normalized;
                stored.revision += 1;
            }
            None => {
                self.entries.insert(
                    key,
                    StoredEntry {
                        entry: normalized,
                        revision: 1,
                    },
                );
            }
        }
    }
}

/// Process-local store with the same upsert semantics as the SQL store.
///
/// Batches are applied under a single lock after every row has been checked,
/// which gives the same all-or-nothing behaviour as a transaction.
#[derive(Default)]
pub struct MemoryScheduleStore {
    state: Mutex<MemoryState>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(entry: &ScheduleEntry) -> Result<(), StoreError> {
        entry
            .validate()
            .map_err(|e| StoreError::Transaction(format!("Rejected row: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, date: &str, location: &str) -> Option<ScheduleEntry> {
        self.lock()
            .entries
            .get(&(location.to_string(), date.to_string()))
            .map(|s| s.entry.clone())
    }

    /// How many times the row was written with new values (0 if absent)
    pub fn revision(&self, date: &str, location: &str) -> u64 {
        self.lock()
            .entries
            .get(&(location.to_string(), date.to_string()))
            .map(|s| s.revision)
            .unwrap_or(0)
    }

    pub fn uploads(&self) -> Vec<UploadLog> {
        self.lock().uploads.clone()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn upsert_batch(&self, entries: &[ScheduleEntry]) -> Result<(), StoreError> {
        for entry in entries {
            Self::check(entry)?;
        }
        let mut state = self.lock();
        for entry in entries {
            state.apply(entry);
        }
        Ok(())
    }

    async fn upsert(&self, entry: &ScheduleEntry) -> Result<(), StoreError> {
        Self::check(entry)?;
        self.lock().apply(entry);
        Ok(())
    }

    async fn record_upload(&self, log: &NewUploadLog) -> Result<(), StoreError> {
        let errors = serde_json::to_value(&log.errors)
            .map_err(|e| StoreError::Transaction(format!("Unserializable errors: {}", e)))?;
        let mut state = self.lock();
        let id = state.uploads.len() as i64 + 1;
        state.uploads.push(UploadLog {
            id,
            source_label: log.source_label.clone(),
            row_count: log.row_count as i32,
            status: log.status,
            errors,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_entries(&self, query: &ScheduleQuery) -> Result<Vec<ScheduleEntry>, StoreError> {
        Ok(self
            .lock()
            .entries
            .values()
            .filter(|s| query.matches(&s.entry))
            .map(|s| s.entry.clone())
            .collect())
    }

    async fn list_uploads(&self, limit: i64) -> Result<Vec<UploadLog>, StoreError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self.lock().uploads.iter().rev().take(limit).cloned().collect())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
