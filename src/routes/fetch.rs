use actix_web::{web, HttpResponse};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{FetchRequest, ProgressStatus, UploadSummary};
use crate::services::{BatchUploadService, IngestionPipeline};

/// POST /api/fetch - Fetch schedules from upstream, optionally persisting them
///
/// Runs to completion before responding; observers follow along on
/// `/api/progress/{operationId}/stream`.
pub async fn fetch_schedules(
    pipeline: web::Data<IngestionPipeline>,
    uploader: web::Data<BatchUploadService>,
    config: web::Data<Config>,
    body: web::Json<FetchRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let mut report = pipeline.run(&request, config.default_preset).await?;

    if request.persist && report.status == ProgressStatus::Completed && !report.entries.is_empty() {
        let label = request
            .source_label
            .clone()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| format!("fetch:{}", report.operation_id));

        let upload = uploader.upload(report.entries.clone(), &label, None).await?;
        report.upload = Some(UploadSummary {
            operation_id: upload.operation_id,
            result: upload.result,
        });
    }

    Ok(HttpResponse::Ok().json(report))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/fetch", web::post().to(fetch_schedules));
}
