use actix_web::web;

use super::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            // Migration routes
            .route("/migration", web::get().to(handlers::get_migration_status))
            .route("/migration", web::post().to(handlers::start_migration))
            .route("/migration", web::delete().to(handlers::clear_migration))
            .route("/migration/plan", web::get().to(handlers::get_migration_plan))
            .route("/migration/tick", web::post().to(handlers::force_tick)),
    );
}

async fn health_check() -> actix_web::HttpResponse {
    actix_web::HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
