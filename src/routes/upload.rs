use actix_web::{web, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::models::UploadRequest;
use crate::services::BatchUploadService;

/// POST /api/upload - Validate and persist schedule entries
pub async fn upload_entries(
    uploader: web::Data<BatchUploadService>,
    body: web::Json<UploadRequest>,
) -> AppResult<HttpResponse> {
    let request = body.into_inner();
    let label = request.source_label.trim();
    if label.is_empty() {
        return Err(AppError::Validation("sourceLabel is required".to_string()));
    }

    let response = uploader
        .upload(request.entries, label, request.operation_id)
        .await?;

    Ok(HttpResponse::Ok().json(response))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/upload", web::post().to(upload_entries));
}
