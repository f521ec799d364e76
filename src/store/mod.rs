//! Persistence contract for schedule entries.
//!
//! The upload service only relies on this trait: a transactional batch
//! upsert keyed on `(date, location)`, a single-row upsert, and an audit log.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{NewUploadLog, ScheduleEntry, ScheduleQuery, UploadLog};

pub use memory::MemoryScheduleStore;
pub use postgres::PgScheduleStore;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Upserts every entry inside one transaction: all rows are written or none are.
    ///
    /// Entries must already be validated and unique on `(date, location)`.
    async fn upsert_batch(&self, entries: &[ScheduleEntry]) -> Result<(), StoreError>;

    /// Upserts a single entry. Re-submitting identical values changes nothing.
    async fn upsert(&self, entry: &ScheduleEntry) -> Result<(), StoreError>;

    /// Persists an upload audit record
    async fn record_upload(&self, log: &NewUploadLog) -> Result<(), StoreError>;

    /// Reads persisted entries ordered by location then date
    async fn list_entries(&self, query: &ScheduleQuery) -> Result<Vec<ScheduleEntry>, StoreError>;

    /// Most recent audit records first
    async fn list_uploads(&self, limit: i64) -> Result<Vec<UploadLog>, StoreError>;

    /// Whether the backing storage is reachable
    async fn health_check(&self) -> bool;
}
