mod api;
mod blockchain;
mod config;
mod error;
mod services;
mod store;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blockchain::{NodeConnection, RpcNodeClient};
use crate::config::AppConfig;
use services::{MigrationContext, MigrationScheduler, TickOutcome};
use store::PlanStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging with console and file output
    let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".into());
    std::fs::create_dir_all(&log_dir)?;

    // File appender - rotates when > 100MB, keeps 5 backup files
    let log_path = std::path::Path::new(&log_dir).join("turnstile-migrator.log");
    let file_appender = rolling_file::RollingFileAppender::new(
        log_path,
        rolling_file::RollingConditionBasic::new().max_size(100 * 1024 * 1024),
        5,
    )?;

    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,reqwest=warn".into()),
    );

    tracing_subscriber::registry()
        .with(env_filter)
        // Console output
        .with(tracing_subscriber::fmt::layer().with_target(true))
        // File output
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    tracing::info!("Starting turnstile migrator");

    let config = AppConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    tracing::info!(
        "Configuration loaded: network {}, plan directory {}",
        config.wallet.network,
        config.wallet.data_dir
    );

    let node: Arc<dyn NodeConnection> = Arc::new(RpcNodeClient::new(&config.node).map_err(|e| {
        tracing::error!("Failed to create node client: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    })?);

    let scheduler = Arc::new(MigrationScheduler::new(
        node,
        PlanStore::new(&config.wallet.data_dir),
        MigrationContext::from(&config),
    ));

    let stored = scheduler.current_plan();
    if !stored.is_empty() && !stored.is_complete() {
        if let Some(progress) = services::migration_service::progress_of(&stored) {
            tracing::info!(
                "Resuming migration at step {}/{}",
                progress.step_index,
                progress.total_steps
            );
        }
    }

    // Background refresh driving the migration plan
    let scheduler_bg = scheduler.clone();
    let refresh = Duration::from_secs(config.migration.refresh_interval_secs);
    tokio::spawn(async move {
        let mut interval = interval(refresh);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match scheduler_bg.tick().await {
                Ok(TickOutcome::NoPlan) | Ok(TickOutcome::Complete) => {}
                Ok(outcome) => tracing::debug!("Migration tick: {:?}", outcome),
                Err(e) => tracing::error!("Error advancing migration: {}", e),
            }
        }
    });

    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    tracing::info!("Starting HTTP server at {}:{}", server_host, server_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(actix_web::middleware::from_fn(api::middleware::request_logger))
            .app_data(web::Data::new(scheduler.clone()))
            .app_data(web::Data::new(config.clone()))
            .configure(api::configure_routes)
    })
    .bind((server_host, server_port))?
    .run()
    .await
}
