use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::services::MigrationScheduler;

#[derive(Debug, Deserialize)]
pub struct StartMigrationRequest {
    pub source_address: String,
    pub destination_address: String,
    pub num_parts: Option<usize>,
    pub block_window: Option<u64>,
}

/// Plan a new migration, replacing any stored plan
pub async fn start_migration(
    scheduler: web::Data<Arc<MigrationScheduler>>,
    config: web::Data<AppConfig>,
    request: web::Json<StartMigrationRequest>,
) -> AppResult<HttpResponse> {
    let request = request.into_inner();
    let num_parts = request.num_parts.unwrap_or(config.migration.default_parts);
    let block_window = request
        .block_window
        .unwrap_or(config.migration.default_block_window);

    let plan = scheduler
        .plan_migration(
            request.source_address.trim(),
            request.destination_address.trim(),
            num_parts,
            block_window,
        )
        .await?;

    Ok(HttpResponse::Created().json(plan))
}

pub async fn get_migration_status(
    scheduler: web::Data<Arc<MigrationScheduler>>,
) -> AppResult<HttpResponse> {
    let present = scheduler.is_migration_present();
    let progress = if present { scheduler.progress() } else { None };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "present": present,
        "network": scheduler.context().network,
        "progress": progress
    })))
}

pub async fn get_migration_plan(
    scheduler: web::Data<Arc<MigrationScheduler>>,
) -> AppResult<HttpResponse> {
    let plan = scheduler.current_plan();
    if plan.is_empty() {
        return Err(AppError::NotFound(format!(
            "No {} migration plan",
            scheduler.context().network
        )));
    }

    Ok(HttpResponse::Ok().json(plan))
}

pub async fn clear_migration(
    scheduler: web::Data<Arc<MigrationScheduler>>,
) -> AppResult<HttpResponse> {
    scheduler.clear().await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Run one scheduler step now instead of waiting for the refresh interval
pub async fn force_tick(
    scheduler: web::Data<Arc<MigrationScheduler>>,
) -> AppResult<HttpResponse> {
    let outcome = scheduler.tick().await?;
    Ok(HttpResponse::Ok().json(outcome))
}
