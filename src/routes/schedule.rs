use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::ScheduleQuery;
use crate::store::ScheduleStore;

const DEFAULT_UPLOADS_LIMIT: i64 = 20;
const MAX_UPLOADS_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct UploadsQuery {
    pub limit: Option<i64>,
}

/// GET /api/schedule - Persisted entries, optionally filtered by location and date
pub async fn list_schedule(
    store: web::Data<Arc<dyn ScheduleStore>>,
    query: web::Query<ScheduleQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::Validation("'from' must not be after 'to'".to_string()));
        }
    }

    let entries = store.list_entries(&query).await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// GET /api/uploads - Most recent upload audit records
pub async fn list_uploads(
    store: web::Data<Arc<dyn ScheduleStore>>,
    query: web::Query<UploadsQuery>,
) -> AppResult<HttpResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_UPLOADS_LIMIT)
        .clamp(1, MAX_UPLOADS_LIMIT);

    let uploads = store.list_uploads(limit).await?;
    Ok(HttpResponse::Ok().json(uploads))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/schedule", web::get().to(list_schedule))
        .route("/api/uploads", web::get().to(list_uploads));
}
