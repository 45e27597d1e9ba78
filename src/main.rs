use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;
use std::sync::Arc;

mod api;
mod attendance;
mod auth;
mod config;
mod db;
mod docs;
mod model;
mod models;
mod routes;
mod utils;

use attendance::memory_store::MemoryAttendanceStore;
use attendance::mysql_store::MySqlAttendanceStore;
use attendance::store::AttendanceStore;
use attendance::{AttendanceService, CorrelationPolicy, TextNotifier};
use config::{Config, StoreBackend};
use db::init_db;

use crate::docs::ApiDoc;
use crate::utils::user_status_cache;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance service is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await?;

    if let Err(e) = api::users::ensure_super_hr(&pool, &config).await {
        error!(error = %e, "Failed to create bootstrap HR account");
    }

    let delay_budget = config.delay_budget()?;
    info!(delay_budget_secs = delay_budget.num_seconds(), "Selfie/location delay budget");

    let store: Arc<dyn AttendanceStore> = match config.attendance_store {
        StoreBackend::MySql => Arc::new(MySqlAttendanceStore::new(pool.clone())),
        StoreBackend::Memory => {
            warn!("Attendance windows are kept in memory and are lost on restart");
            Arc::new(MemoryAttendanceStore::new())
        }
    };
    let service = Data::new(AttendanceService::new(
        store,
        CorrelationPolicy::new(delay_budget),
    ));
    let notifier = Data::new(TextNotifier::new(delay_budget));

    let pool_for_cache_warmup = pool.clone();
    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    actix_web::rt::spawn(async move {
        // Warm up users seen in the last 7 days, in batches of 250
        if let Err(e) =
            user_status_cache::warmup_user_status_cache(&pool_for_cache_warmup, 7, 250).await
        {
            error!(error = ?e, "Failed to warmup user status cache");
        }
    });

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(service.clone())
            .app_data(notifier.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await?;

    Ok(())
}
