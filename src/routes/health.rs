use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Serialize;
use std::sync::Arc;

use crate::services::ProgressHub;
use crate::store::ScheduleStore;

#[derive(Serialize)]
pub struct LivenessResponse {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    status: &'static str,
    checks: ReadinessChecks,
    tracked_operations: usize,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    store: &'static str,
}

/// GET /health - the process is up
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(LivenessResponse { status: "ok" })
}

/// GET /health/ready - 200 when the schedule store answers, 503 otherwise
pub async fn readiness(
    store: web::Data<Arc<dyn ScheduleStore>>,
    hub: web::Data<ProgressHub>,
) -> HttpResponse {
    let (status, store_status, http_status) = if store.health_check().await {
        ("ready", "ok", StatusCode::OK)
    } else {
        ("not_ready", "error", StatusCode::SERVICE_UNAVAILABLE)
    };

    HttpResponse::build(http_status).json(ReadinessResponse {
        status,
        checks: ReadinessChecks {
            store: store_status,
        },
        tracked_operations: hub.len(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/health")
            .route("", web::get().to(liveness))
            .route("/ready", web::get().to(readiness)),
    );
}
