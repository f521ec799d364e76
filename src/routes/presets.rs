use actix_web::{web, HttpResponse};

use crate::models::RateLimitPreset;

/// GET /api/rate-limit/presets - Named rate limit configurations
pub async fn list_presets() -> HttpResponse {
    HttpResponse::Ok().json(RateLimitPreset::catalog())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/rate-limit/presets", web::get().to(list_presets));
}
