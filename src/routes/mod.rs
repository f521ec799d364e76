pub mod fetch;
pub mod health;
pub mod presets;
pub mod progress;
pub mod schedule;
pub mod upload;

use actix_web::web;

/// Registers every route; handlers expect `Config`, `ProgressHub`,
/// `Arc<dyn ScheduleStore>`, `IngestionPipeline` and `BatchUploadService` as app data
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.configure(health::configure)
        .configure(progress::configure)
        .configure(fetch::configure)
        .configure(upload::configure)
        .configure(presets::configure)
        .configure(schedule::configure);
}
