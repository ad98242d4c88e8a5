//! Upstream dispatcher: forwards a resolved route's request to its backend
//! with timeout, retries, and header shaping.
//!
//! Hop-by-hop headers and any inbound `X-Gateway-*` headers are stripped
//! before forwarding; `X-Gateway-Request-ID`/`User-ID`/`User-Email`/`User-Roles`
//! are injected and the caller's IP is appended to `X-Forwarded-For`. Retries
//! only ever cover connection errors or idempotent-safe timeouts; a
//! non-idempotent method that might have reached the upstream is never
//! retried.

use crate::middleware::auth::Identity;
use crate::models::error::GatewayError;
use crate::models::route::Route;
use rand::Rng;
use reqwest::{
    header::{HeaderMap as ReqwestHeaderMap, HeaderName as ReqwestHeaderName, HeaderValue as ReqwestHeaderValue},
    Client, Method as ReqwestMethod,
};
use std::time::Duration;
use uuid::Uuid;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct DispatchRequest<'a> {
    pub route: &'a Route,
    pub method: &'a str,
    pub upstream_path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a actix_web::http::header::HeaderMap,
    pub body: bytes::Bytes,
    pub request_id: Uuid,
    pub client_ip: &'a str,
    pub identity: Option<&'a Identity>,
}

pub struct DispatchResponse {
    pub status: u16,
    pub headers: ReqwestHeaderMap,
    pub body: bytes::Bytes,
}

/// The only two outcomes the circuit breaker cares about: `Success` is any
/// response with status < 500; anything else is `Failure`.
pub enum DispatchOutcome {
    Success(DispatchResponse),
    Failure(GatewayError),
}

#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
}

impl Dispatcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()
            .expect("failed to build reqwest client");
        Self { client }
    }

    pub async fn dispatch(&self, req: DispatchRequest<'_>) -> DispatchOutcome {
        let url = self.build_url(req.route, req.upstream_path, req.query);
        let method = match req.method.parse::<ReqwestMethod>() {
            Ok(m) => m,
            Err(_) => {
                return DispatchOutcome::Failure(GatewayError::BadRequest {
                    message: format!("unsupported method {}", req.method),
                })
            }
        };
        let idempotent = matches!(method, ReqwestMethod::GET | ReqwestMethod::HEAD | ReqwestMethod::PUT | ReqwestMethod::DELETE | ReqwestMethod::OPTIONS);

        let headers = self.shape_headers(req.headers, req.request_id, req.client_ip, req.identity);
        let timeout = Duration::from_millis(req.route.timeout_ms);
        let max_attempts = req.route.retry_count + 1;

        let mut last_err: Option<GatewayError> = None;
        for attempt in 0..max_attempts {
            if attempt > 0 {
                let backoff = Self::backoff_delay(attempt);
                tokio::time::sleep(backoff).await;
            }

            let result = tokio::time::timeout(
                timeout,
                self.client
                    .request(method.clone(), &url)
                    .headers(headers.clone())
                    .body(req.body.clone())
                    .send(),
            )
            .await;

            match result {
                Ok(Ok(response)) => {
                    let status = response.status().as_u16();
                    let resp_headers = response.headers().clone();
                    let body = match response.bytes().await {
                        Ok(b) => b,
                        Err(e) => {
                            last_err = Some(GatewayError::UpstreamConnect { message: e.to_string() });
                            continue;
                        }
                    };
                    if status >= 500 && attempt + 1 < max_attempts && idempotent {
                        last_err = Some(GatewayError::Internal {
                            message: format!("upstream returned {}", status),
                        });
                        continue;
                    }
                    return DispatchOutcome::Success(DispatchResponse {
                        status,
                        headers: resp_headers,
                        body,
                    });
                }
                Ok(Err(e)) => {
                    let retryable = e.is_connect() || (idempotent && e.is_timeout());
                    last_err = Some(GatewayError::UpstreamConnect { message: e.to_string() });
                    if !retryable || attempt + 1 >= max_attempts {
                        break;
                    }
                }
                Err(_elapsed) => {
                    last_err = Some(GatewayError::UpstreamTimeout {
                        timeout_ms: req.route.timeout_ms,
                    });
                    if !idempotent || attempt + 1 >= max_attempts {
                        break;
                    }
                }
            }
        }

        DispatchOutcome::Failure(last_err.unwrap_or(GatewayError::Internal {
            message: "dispatch failed with no recorded error".to_string(),
        }))
    }

    fn build_url(&self, route: &Route, upstream_path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}{}", route.target_base_url, upstream_path);
        if let Some(q) = query {
            if !q.is_empty() {
                url.push('?');
                url.push_str(q);
            }
        }
        url
    }

    fn shape_headers(
        &self,
        inbound: &actix_web::http::header::HeaderMap,
        request_id: Uuid,
        client_ip: &str,
        identity: Option<&Identity>,
    ) -> ReqwestHeaderMap {
        let mut out = ReqwestHeaderMap::new();
        let mut forwarded_for = None;

        for (name, value) in inbound.iter() {
            let lower = name.as_str().to_ascii_lowercase();
            if HOP_BY_HOP.contains(&lower.as_str()) || lower.starts_with("x-gateway-") {
                continue;
            }
            if lower == "x-forwarded-for" {
                forwarded_for = value.to_str().ok().map(|s| s.to_string());
                continue;
            }
            if let (Ok(n), Ok(v)) = (
                ReqwestHeaderName::from_bytes(name.as_str().as_bytes()),
                ReqwestHeaderValue::from_bytes(value.as_bytes()),
            ) {
                out.append(n, v);
            }
        }

        let forwarded_for = match forwarded_for {
            Some(existing) => format!("{}, {}", existing, client_ip),
            None => client_ip.to_string(),
        };
        Self::insert(&mut out, "x-forwarded-for", &forwarded_for);
        Self::insert(&mut out, "x-gateway-request-id", &request_id.to_string());

        if let Some(identity) = identity {
            Self::insert(&mut out, "x-gateway-user-id", &identity.user_id);
            if let Some(email) = &identity.email {
                Self::insert(&mut out, "x-gateway-user-email", email);
            }
            if !identity.roles.is_empty() {
                Self::insert(&mut out, "x-gateway-user-roles", &identity.roles.join(","));
            }
        }

        out
    }

    fn insert(map: &mut ReqwestHeaderMap, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            ReqwestHeaderName::from_bytes(name.as_bytes()),
            ReqwestHeaderValue::from_str(value),
        ) {
            map.insert(n, v);
        }
    }

    /// Exponential backoff with base 100ms, doubling, capped at 2s, full jitter.
    fn backoff_delay(attempt: u32) -> Duration {
        let base_ms: u64 = 100u64.saturating_mul(1u64 << attempt.min(10));
        let capped_ms = base_ms.min(2_000);
        let jittered = rand::thread_rng().gen_range(0..=capped_ms);
        Duration::from_millis(jittered)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap() {
        for attempt in 0..8 {
            let d = Dispatcher::backoff_delay(attempt);
            assert!(d <= Duration::from_millis(2_000));
        }
    }
}
