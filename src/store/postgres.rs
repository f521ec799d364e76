use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};

use super::ScheduleStore;
use crate::db;
use crate::error::StoreError;
use crate::models::{NewUploadLog, ScheduleEntry, ScheduleQuery, ScheduleRow, UploadLog};

/// Identical values leave the row (including `updated_at`) untouched
const UPSERT_SQL: &str = r#"
    INSERT INTO schedule_entries (date, location, sehri, iftar)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (date, location) DO UPDATE
    SET sehri = EXCLUDED.sehri,
        iftar = EXCLUDED.iftar,
        updated_at = NOW()
    WHERE schedule_entries.sehri IS DISTINCT FROM EXCLUDED.sehri
       OR schedule_entries.iftar IS DISTINCT FROM EXCLUDED.iftar
"#;

/// Pool and connection failures mean the database is unreachable, not that a row is bad
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
        other => StoreError::Database(other),
    }
}

/// PostgreSQL-backed schedule store
#[derive(Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn parse_date(entry: &ScheduleEntry) -> Result<NaiveDate, StoreError> {
        entry
            .naive_date()
            .ok_or_else(|| StoreError::Transaction(format!("Invalid date '{}'", entry.date)))
    }

    async fn upsert_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        entry: &ScheduleEntry,
    ) -> Result<(), StoreError> {
        let date = Self::parse_date(entry)?;
        sqlx::query(UPSERT_SQL)
            .bind(date)
            .bind(entry.location.trim())
            .bind(&entry.sehri)
            .bind(&entry.iftar)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn upsert_batch(&self, entries: &[ScheduleEntry]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let mut result = Ok(());
        for entry in entries {
            if let Err(e) = Self::upsert_in_tx(&mut tx, entry).await {
                result = Err(e);
                break;
            }
        }

        match result {
            Ok(()) => {
                tx.commit().await.map_err(classify)?;
                Ok(())
            }
            Err(e) => {
                tx.rollback().await.map_err(classify)?;
                Err(StoreError::Transaction(e.to_string()))
            }
        }
    }

    async fn upsert(&self, entry: &ScheduleEntry) -> Result<(), StoreError> {
        let date = Self::parse_date(entry)?;
        sqlx::query(UPSERT_SQL)
            .bind(date)
            .bind(entry.location.trim())
            .bind(&entry.sehri)
            .bind(&entry.iftar)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn record_upload(&self, log: &NewUploadLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO upload_logs (source_label, row_count, status, errors)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&log.source_label)
        .bind(log.row_count as i32)
        .bind(log.status)
        .bind(sqlx::types::Json(&log.errors))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_entries(&self, query: &ScheduleQuery) -> Result<Vec<ScheduleEntry>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT date, sehri, iftar, location, updated_at
            FROM schedule_entries
            WHERE ($1::varchar IS NULL OR LOWER(location) = LOWER($1))
              AND ($2::date IS NULL OR date >= $2)
              AND ($3::date IS NULL OR date <= $3)
            ORDER BY location, date
            "#,
        )
        .bind(query.location.as_deref().map(str::trim))
        .bind(query.from)
        .bind(query.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScheduleEntry::from).collect())
    }

    async fn list_uploads(&self, limit: i64) -> Result<Vec<UploadLog>, StoreError> {
        let logs = sqlx::query_as::<_, UploadLog>(
            r#"
            SELECT id, source_label, row_count, status, errors, created_at
            FROM upload_logs
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(logs)
    }

    async fn health_check(&self) -> bool {
        db::health_check(&self.pool).await
    }
}
