//! The management API (C9): CRUD over routes and rate-limit rules, plus
//! read-only views over health, logs, and metrics.
//!
//! Every handler requires a verified bearer token whose identity carries the
//! `admin` role; anything else is denied with 403 before touching state.

use crate::middleware::auth::TokenVerifier;
use crate::models::error::GatewayError;
use crate::models::log::LogQuery;
use crate::models::rate_limit::{CreateRateLimitRule, UpdateRateLimitRule};
use crate::models::route::{CreateRoute, UpdateRoute};
use crate::services::circuit_breaker::CircuitBreakerRegistry;
use crate::services::health::HealthSupervisor;
use crate::services::log_sink::LogSink;
use crate::services::rate_limiter::{RateLimitEngine, RateLimitRuleError};
use crate::services::route_table::{RouteTable, RouteTableError};
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub struct ManagementState {
    pub routes: Arc<RouteTable>,
    pub rate_limits: Arc<RateLimitEngine>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub health: Arc<HealthSupervisor>,
    pub logs: Arc<LogSink>,
    pub tokens: Arc<TokenVerifier>,
}

async fn require_admin(req: &HttpRequest, tokens: &TokenVerifier) -> Result<(), GatewayError> {
    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let identity = tokens
        .verify(authorization)
        .await
        .map_err(|e| GatewayError::Unauthorized { reason: e.to_string() })?;

    if !identity.is_admin() {
        return Err(GatewayError::Forbidden);
    }
    Ok(())
}

fn route_table_error(e: RouteTableError) -> GatewayError {
    match e {
        RouteTableError::NotFound { path } => GatewayError::RouteNotFound { path },
        RouteTableError::MethodNotAllowed { path, method, allowed } => GatewayError::MethodNotAllowed {
            path,
            method,
            allowed: allowed.join(", "),
        },
        RouteTableError::DuplicatePattern => GatewayError::Conflict {
            message: "a route with this pattern already exists".to_string(),
        },
        RouteTableError::NoSuchRoute(id) => GatewayError::NotFound {
            message: format!("no route with id {id}"),
        },
        RouteTableError::Invalid(message) => GatewayError::BadRequest { message },
    }
}

fn rule_error(e: RateLimitRuleError) -> GatewayError {
    match e {
        RateLimitRuleError::NoSuchRule(id) => GatewayError::NotFound {
            message: format!("no rate-limit rule with id {id}"),
        },
        RateLimitRuleError::DuplicateName => GatewayError::Conflict {
            message: "a rate-limit rule with this name already exists".to_string(),
        },
        RateLimitRuleError::Invalid(message) => GatewayError::BadRequest { message },
    }
}

// ---- Routes (C2) ----

pub async fn list_routes(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let routes = state.routes.list(false).await;
    Ok(HttpResponse::Ok().json(json!({ "routes": routes })))
}

pub async fn get_route(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let route = state
        .routes
        .get(id.into_inner())
        .await
        .ok_or(GatewayError::NotFound { message: "route not found".to_string() })?;
    Ok(HttpResponse::Ok().json(route))
}

pub async fn create_route(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    body: web::Json<CreateRoute>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let route = state.routes.create(body.into_inner()).await.map_err(route_table_error)?;
    state.health.register(&route.target_service, &route.target_base_url).await;
    Ok(HttpResponse::Created().json(route))
}

pub async fn update_route(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    id: web::Path<Uuid>,
    body: web::Json<UpdateRoute>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let route = state
        .routes
        .update(id.into_inner(), body.into_inner())
        .await
        .map_err(route_table_error)?;
    state.health.register(&route.target_service, &route.target_base_url).await;
    Ok(HttpResponse::Ok().json(route))
}

pub async fn delete_route(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    state.routes.delete(id.into_inner()).await.map_err(route_table_error)?;
    Ok(HttpResponse::NoContent().finish())
}

// ---- Rate-limit rules (C4) ----

pub async fn list_rate_limits(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let rules = state.rate_limits.list().await;
    Ok(HttpResponse::Ok().json(json!({ "rate_limits": rules })))
}

pub async fn get_rate_limit(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let rule = state
        .rate_limits
        .get(id.into_inner())
        .await
        .ok_or(GatewayError::NotFound { message: "rate-limit rule not found".to_string() })?;
    Ok(HttpResponse::Ok().json(rule))
}

pub async fn create_rate_limit(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    body: web::Json<CreateRateLimitRule>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let rule = state.rate_limits.create(body.into_inner()).await.map_err(rule_error)?;
    Ok(HttpResponse::Created().json(rule))
}

pub async fn update_rate_limit(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    id: web::Path<Uuid>,
    body: web::Json<UpdateRateLimitRule>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let rule = state
        .rate_limits
        .update(id.into_inner(), body.into_inner())
        .await
        .map_err(rule_error)?;
    Ok(HttpResponse::Ok().json(rule))
}

pub async fn delete_rate_limit(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    id: web::Path<Uuid>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    state.rate_limits.delete(id.into_inner()).await.map_err(rule_error)?;
    Ok(HttpResponse::NoContent().finish())
}

// ---- Services / health / circuit breaker (C5, C6) ----

pub async fn list_services(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let services = state.health.list().await;
    Ok(HttpResponse::Ok().json(json!({ "services": services })))
}

pub async fn reset_service(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    name: web::Path<String>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let name = name.into_inner();
    state.breakers.reset(&name).await;
    state.health.set_circuit_open(&name, false).await;
    Ok(HttpResponse::Ok().json(json!({ "service": name, "reset": true })))
}

// ---- Logs (C10) ----

pub async fn query_logs(
    req: HttpRequest,
    state: web::Data<Arc<ManagementState>>,
    query: web::Query<LogQuery>,
) -> Result<HttpResponse, GatewayError> {
    require_admin(&req, &state.tokens).await?;
    let logs = state.logs.query(&query.into_inner()).await;
    Ok(HttpResponse::Ok().json(json!({ "logs": logs })))
}

pub fn configure_management(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/gateway/routes", web::get().to(list_routes))
        .route("/api/v1/gateway/routes", web::post().to(create_route))
        .route("/api/v1/gateway/routes/{id}", web::get().to(get_route))
        .route("/api/v1/gateway/routes/{id}", web::put().to(update_route))
        .route("/api/v1/gateway/routes/{id}", web::delete().to(delete_route))
        .route("/api/v1/gateway/rate-limits", web::get().to(list_rate_limits))
        .route("/api/v1/gateway/rate-limits", web::post().to(create_rate_limit))
        .route("/api/v1/gateway/rate-limits/{id}", web::get().to(get_rate_limit))
        .route("/api/v1/gateway/rate-limits/{id}", web::put().to(update_rate_limit))
        .route("/api/v1/gateway/rate-limits/{id}", web::delete().to(delete_rate_limit))
        .route("/api/v1/gateway/services", web::get().to(list_services))
        .route("/api/v1/gateway/services/{name}/reset", web::post().to(reset_service))
        .route("/api/v1/gateway/logs", web::get().to(query_logs));
}
