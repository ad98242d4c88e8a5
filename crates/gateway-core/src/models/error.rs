//! Gateway-wide error taxonomy and its HTTP surface.
//!
//! Every stage of the request pipeline (routing, auth, rate limiting,
//! circuit breaking, dispatch) returns a `GatewayError` at its boundary so
//! that no internal error type leaks past its own module. `GatewayError`
//! implements `ResponseError`, producing the uniform JSON error body and
//! status code mapping described for the data plane.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Crate-wide error type returned by every gate in the request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no route matches path: {path}")]
    RouteNotFound { path: String },

    #[error("method {method} not allowed for {path}, allowed: {allowed}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allowed: String,
    },

    #[error("authentication failed: {reason}")]
    Unauthorized { reason: String },

    #[error("admin scope required")]
    Forbidden,

    #[error("identity service unavailable")]
    IdentityServiceUnavailable,

    #[error("rate limit exceeded: {rule}")]
    RateLimited {
        rule: String,
        limit: u64,
        remaining: u64,
        reset_at: i64,
        retry_after: i64,
    },

    #[error("circuit open for {service}")]
    CircuitOpen { service: String },

    #[error("upstream timeout after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("upstream connect error: {message}")]
    UpstreamConnect { message: String },

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("invalid request: {message}")]
    BadRequest { message: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorPayload<'a>,
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    code: &'a str,
    message: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl GatewayError {
    /// Stable machine-readable error code, independent of the Display message.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            GatewayError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            GatewayError::Unauthorized { .. } => "UNAUTHORIZED",
            GatewayError::Forbidden => "FORBIDDEN",
            GatewayError::IdentityServiceUnavailable => "IDENTITY_SERVICE_UNAVAILABLE",
            GatewayError::RateLimited { .. } => "RATE_LIMITED",
            GatewayError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            GatewayError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            GatewayError::UpstreamConnect { .. } => "UPSTREAM_CONNECT_ERROR",
            GatewayError::ClientDisconnected => "CLIENT_CLOSED",
            GatewayError::Conflict { .. } => "CONFLICT",
            GatewayError::BadRequest { .. } => "BAD_REQUEST",
            GatewayError::NotFound { .. } => "NOT_FOUND",
            GatewayError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::MethodNotAllowed { allowed, .. } => {
                Some(json!({ "allowed_methods": allowed }))
            }
            GatewayError::RateLimited {
                limit,
                remaining,
                reset_at,
                retry_after,
                ..
            } => Some(json!({
                "limit": limit,
                "remaining": remaining,
                "reset_at": reset_at,
                "retry_after": retry_after,
            })),
            GatewayError::CircuitOpen { service } => Some(json!({ "service": service })),
            _ => None,
        }
    }

    /// Render the uniform error body for a given request id.
    pub fn to_response_with_id(&self, request_id: &Uuid) -> HttpResponse {
        let body = ErrorBody {
            error: ErrorPayload {
                code: self.code(),
                message: self.to_string(),
                request_id: request_id.to_string(),
                details: self.details(),
            },
        };
        let mut builder = HttpResponse::build(self.status_code());
        if let GatewayError::RateLimited {
            limit,
            remaining,
            reset_at,
            retry_after,
            ..
        } = self
        {
            builder.insert_header(("X-RateLimit-Limit", limit.to_string()));
            builder.insert_header(("X-RateLimit-Remaining", remaining.to_string()));
            builder.insert_header(("X-RateLimit-Reset", reset_at.to_string()));
            builder.insert_header(("Retry-After", retry_after.to_string()));
        }
        builder.json(body)
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } | GatewayError::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::IdentityServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamConnect { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ClientDisconnected => StatusCode::from_u16(499).unwrap(),
            GatewayError::Conflict { .. } => StatusCode::CONFLICT,
            GatewayError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.to_response_with_id(&Uuid::new_v4())
    }
}
