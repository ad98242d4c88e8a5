//! Liveness/readiness probes and the read-only aggregated health view.

use crate::services::health::HealthSupervisor;
use actix_web::{web, HttpResponse, Result};
use serde_json::json;
use std::sync::Arc;

/// General health check: process status plus version and uptime.
pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    })))
}

/// Kubernetes readiness probe. Always ready once the listener is bound;
/// upstream health is reported separately via `/api/v1/gateway/health`.
pub async fn readiness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Kubernetes liveness probe. Only fails if the process itself is wedged.
pub async fn liveness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// `GET /api/v1/gateway/health` -- aggregated status and per-service detail.
pub async fn aggregate_health(health: web::Data<Arc<HealthSupervisor>>) -> Result<HttpResponse> {
    let aggregate = health.aggregate_health().await;
    let services = health.list().await;
    Ok(HttpResponse::Ok().json(json!({
        "status": aggregate,
        "services": services,
    })))
}

pub fn configure_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/ready", web::get().to(readiness_check))
        .route("/live", web::get().to(liveness_check))
        .route("/api/v1/gateway/health", web::get().to(aggregate_health));
}
