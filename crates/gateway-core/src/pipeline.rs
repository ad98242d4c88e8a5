//! The request pipeline: composes the routing table, token verifier,
//! rate-limit engine, circuit breaker, and dispatcher for every inbound
//! request, per the eight-step contract below. Every branch that produces an
//! error response still emits exactly one [`RequestLog`] record -- the
//! pipeline never drops a request silently.
//!
//! 1. Assign `request_id`, start a timer, record `client_ip`.
//! 2. Resolve the route; `NotFound` -> 404, `MethodNotAllowed` -> 405.
//! 3. If `route.auth_required`, verify the bearer token; failure -> 401/503.
//! 4. Evaluate rate limits; deny -> 429 with `X-RateLimit-*`/`Retry-After`.
//! 5. If `route.circuit_breaker_enabled` and the breaker refuses -> 503.
//! 6. Dispatch to the upstream and relay the response.
//! 7. Report the outcome to the circuit breaker and the health supervisor.
//! 8. Record a `RequestLog`.

use crate::middleware::auth::{Identity, TokenError, TokenVerifier};
use crate::models::error::GatewayError;
use crate::models::log::RequestLog;
use crate::models::route::Route;
use crate::services::circuit_breaker::CircuitBreakerRegistry;
use crate::services::health::HealthSupervisor;
use crate::services::http::{DispatchOutcome, DispatchRequest, Dispatcher};
use crate::services::log_sink::LogSink;
use crate::services::rate_limiter::{RateLimitContext, RateLimitEngine, Verdict};
use crate::services::route_table::{RouteTable, RouteTableError};
use actix_web::http::header::HeaderMap;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub struct Pipeline {
    pub routes: Arc<RouteTable>,
    pub tokens: Arc<TokenVerifier>,
    pub rate_limiter: Arc<RateLimitEngine>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub health: Arc<HealthSupervisor>,
    pub dispatcher: Arc<Dispatcher>,
    pub logs: Arc<LogSink>,
    pub rate_limit_enabled: bool,
}

pub struct InboundRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: bytes::Bytes,
    pub client_ip: &'a str,
}

pub struct OutboundResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: bytes::Bytes,
    pub request_id: Uuid,
    pub rate_limit_verdict: Verdict,
}

impl Pipeline {
    /// Runs steps 1-8 for a single proxied request. Never panics on a bad
    /// request; every error path still produces a `RequestLog`.
    pub async fn handle(&self, req: InboundRequest<'_>) -> Result<OutboundResponse, GatewayError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let authorization = header_str(req.headers, "authorization");

        let mut log = RequestLog {
            request_id,
            method: req.method.to_string(),
            path: req.path.to_string(),
            matched_route_id: None,
            target_service: None,
            user_id: None,
            client_ip: req.client_ip.to_string(),
            status_code: None,
            response_time_ms: 0,
            error_message: None,
            created_at: Utc::now(),
        };

        let result = self.run(&req, request_id, authorization, &mut log).await;

        log.response_time_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(resp) => log.status_code = Some(resp.status),
            Err(err) => {
                log.status_code = Some(err.status_code().as_u16());
                log.error_message = Some(err.to_string());
            }
        }
        self.logs.record(log).await;

        result
    }

    async fn run(
        &self,
        req: &InboundRequest<'_>,
        request_id: Uuid,
        authorization: Option<&str>,
        log: &mut RequestLog,
    ) -> Result<OutboundResponse, GatewayError> {
        let route = self.resolve_route(req.path, req.method, log).await?;

        let identity = self.authenticate(&route, authorization).await?;
        if let Some(identity) = &identity {
            log.user_id = Some(identity.user_id.clone());
        }

        let verdict = self.check_rate_limit(&route, req, identity.as_ref()).await?;

        if route.circuit_breaker_enabled && !self.breakers.allow(&route.target_service).await {
            return Err(GatewayError::CircuitOpen {
                service: route.target_service.clone(),
            });
        }

        let upstream_path = req.path.to_string();
        let dispatch_req = DispatchRequest {
            route: &route,
            method: req.method,
            upstream_path: &upstream_path,
            query: req.query,
            headers: req.headers,
            body: req.body.clone(),
            request_id,
            client_ip: req.client_ip,
            identity: identity.as_ref(),
        };

        let outcome = self.dispatcher.dispatch(dispatch_req).await;
        self.health.observe_dispatch(&route.target_service).await;

        match outcome {
            DispatchOutcome::Success(resp) => {
                if route.circuit_breaker_enabled {
                    let breaker_failure = resp.status >= 500;
                    if breaker_failure {
                        self.breakers.record_failure(&route.target_service).await;
                    } else {
                        self.breakers.record_success(&route.target_service).await;
                    }
                }
                let open = self.breakers.allow(&route.target_service).await;
                self.health.set_circuit_open(&route.target_service, !open).await;

                Ok(OutboundResponse {
                    status: resp.status,
                    headers: resp.headers,
                    body: resp.body,
                    request_id,
                    rate_limit_verdict: verdict,
                })
            }
            DispatchOutcome::Failure(err) => {
                if route.circuit_breaker_enabled {
                    self.breakers.record_failure(&route.target_service).await;
                }
                Err(err)
            }
        }
    }

    async fn resolve_route(
        &self,
        path: &str,
        method: &str,
        log: &mut RequestLog,
    ) -> Result<Route, GatewayError> {
        match self.routes.resolve(path, method).await {
            Ok(route) => {
                log.matched_route_id = Some(route.id);
                log.target_service = Some(route.target_service.clone());
                Ok(route)
            }
            Err(RouteTableError::NotFound { path }) => Err(GatewayError::RouteNotFound { path }),
            Err(RouteTableError::MethodNotAllowed { path, method, allowed }) => {
                Err(GatewayError::MethodNotAllowed {
                    path,
                    method,
                    allowed: allowed.join(", "),
                })
            }
            Err(e) => Err(GatewayError::Internal { message: e.to_string() }),
        }
    }

    async fn authenticate(
        &self,
        route: &Route,
        authorization: Option<&str>,
    ) -> Result<Option<Identity>, GatewayError> {
        if !route.auth_required {
            return Ok(None);
        }
        match self.tokens.verify(authorization).await {
            Ok(identity) => Ok(Some(identity)),
            Err(TokenError::UpstreamUnavailable) => Err(GatewayError::IdentityServiceUnavailable),
            Err(e) => Err(GatewayError::Unauthorized { reason: e.to_string() }),
        }
    }

    async fn check_rate_limit(
        &self,
        route: &Route,
        req: &InboundRequest<'_>,
        identity: Option<&Identity>,
    ) -> Result<Verdict, GatewayError> {
        if !self.rate_limit_enabled {
            return Ok(Verdict::Allow(None));
        }
        let ctx = RateLimitContext {
            path: req.path,
            method: req.method,
            user_id: identity.map(|i| i.user_id.as_str()),
            client_ip: req.client_ip,
            matched_route_id: Some(route.id),
        };
        let verdict = self.rate_limiter.evaluate(ctx, Utc::now().timestamp()).await;
        match &verdict {
            Verdict::Deny(snapshot) => Err(GatewayError::RateLimited {
                rule: snapshot.rule_name.clone(),
                limit: snapshot.limit,
                remaining: snapshot.remaining,
                reset_at: snapshot.reset_at_unix,
                retry_after: (snapshot.reset_at_unix - Utc::now().timestamp()).max(0),
            }),
            Verdict::Allow(_) => Ok(verdict),
        }
    }

}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::JwtSettings;
    use crate::services::circuit_breaker::CircuitBreakerConfig;
    use std::time::Duration;

    fn pipeline() -> Pipeline {
        Pipeline {
            routes: Arc::new(RouteTable::new()),
            tokens: Arc::new(TokenVerifier::new(
                JwtSettings {
                    secret: "a-sufficiently-long-test-secret-value".to_string(),
                    algorithm: "HS256".to_string(),
                    issuer: None,
                    audience: None,
                },
                None,
            )),
            rate_limiter: Arc::new(RateLimitEngine::new()),
            breakers: Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
            health: Arc::new(HealthSupervisor::new(Duration::from_secs(1))),
            dispatcher: Arc::new(Dispatcher::new()),
            logs: Arc::new(LogSink::new(100)),
            rate_limit_enabled: true,
        }
    }

    #[tokio::test]
    async fn unmatched_path_logs_and_returns_not_found() {
        let p = pipeline();
        let headers = HeaderMap::new();
        let req = InboundRequest {
            method: "GET",
            path: "/nope",
            query: None,
            headers: &headers,
            body: bytes::Bytes::new(),
            client_ip: "127.0.0.1",
        };

        let result = p.handle(req).await;
        assert!(matches!(result, Err(GatewayError::RouteNotFound { .. })));

        let logs = p.logs.query(&crate::models::log::LogQuery::default()).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, Some(404));
    }
}
