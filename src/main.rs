use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;

use ramadan_ingest::config;
use ramadan_ingest::db;
use ramadan_ingest::routes;
use ramadan_ingest::services::{BatchUploadService, IngestionPipeline, ProgressHub};
use ramadan_ingest::store::{PgScheduleStore, ScheduleStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::Config::from_env().map_err(|e| {
        log::error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!(
        "Starting ramadan-ingest on {}:{} (upstream {}, default preset {})",
        config.host,
        config.port,
        config.upstream.base_url,
        config.default_preset
    );

    let db_pool = db::create_pool(&config.database).await.map_err(|e| {
        log::error!("Database pool error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    db::run_migrations(&db_pool).await.map_err(|e| {
        log::error!("Migration error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // One client for the whole process; per-attempt timeouts are applied by the retrying client
    let http = reqwest::Client::builder()
        .user_agent(concat!("ramadan-ingest/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            log::error!("HTTP client error: {}", e);
            std::io::Error::other(e.to_string())
        })?;

    let hub = ProgressHub::new();
    let reaper = hub.spawn_reaper(config.progress.retention, config.progress.reap_interval);

    let store: Arc<dyn ScheduleStore> = Arc::new(PgScheduleStore::new(db_pool));
    let pipeline = web::Data::new(IngestionPipeline::new(
        http,
        &config.upstream,
        config.retry.clone(),
        hub.clone(),
    ));
    let uploader = web::Data::new(BatchUploadService::new(
        Arc::clone(&store),
        config.upload.clone(),
        hub.clone(),
    ));

    let host = config.host.clone();
    let port = config.port;

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::CACHE_CONTROL,
            ])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(hub.clone()))
            .app_data(web::Data::new(Arc::clone(&store)))
            .app_data(pipeline.clone())
            .app_data(uploader.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind((host.as_str(), port))?
    .shutdown_timeout(30)
    .run();

    let server_handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    let result = server.await;
    reaper.abort();
    result
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
