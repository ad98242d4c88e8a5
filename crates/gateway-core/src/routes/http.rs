//! Data-plane proxy entrypoint: the catch-all route that feeds every
//! non-reserved path into the [`crate::pipeline::Pipeline`].

use crate::middleware::rate_limit;
use crate::models::error::GatewayError;
use crate::pipeline::{InboundRequest, Pipeline};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{web, HttpRequest, HttpResponse};
use std::net::IpAddr;
use std::sync::Arc;

/// Resolves the client IP: the immediate peer address, unless it is in the
/// trusted proxy list, in which case the left-most `X-Forwarded-For` entry
/// is used instead.
fn client_ip(req: &HttpRequest, trusted_proxy_cidrs: &[String]) -> String {
    let peer = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let peer_trusted = peer
        .parse::<IpAddr>()
        .map(|ip| trusted_proxy_cidrs.iter().any(|cidr| cidr_contains(cidr, &ip)))
        .unwrap_or(false);

    if !peer_trusted {
        return peer;
    }

    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or(peer)
}

/// Minimal CIDR containment check (IPv4 and IPv6), no external dependency.
fn cidr_contains(cidr: &str, ip: &IpAddr) -> bool {
    let mut parts = cidr.splitn(2, '/');
    let base = match parts.next().and_then(|s| s.parse::<IpAddr>().ok()) {
        Some(b) => b,
        None => return false,
    };
    let prefix_len: u32 = match parts.next() {
        Some(p) => match p.parse() {
            Ok(n) => n,
            Err(_) => return false,
        },
        None => match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        },
    };

    match (base, ip) {
        (IpAddr::V4(base), IpAddr::V4(ip)) => {
            let mask = if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len.min(32)) };
            u32::from(base) & mask == u32::from(*ip) & mask
        }
        (IpAddr::V6(base), IpAddr::V6(ip)) => {
            let mask = if prefix_len == 0 { 0 } else { u128::MAX << (128 - prefix_len.min(128)) };
            u128::from(base) & mask == u128::from(*ip) & mask
        }
        _ => false,
    }
}

pub async fn proxy(
    req: HttpRequest,
    body: web::Bytes,
    pipeline: web::Data<Arc<Pipeline>>,
    trusted_proxy_cidrs: web::Data<Vec<String>>,
) -> Result<HttpResponse, GatewayError> {
    let client_ip = client_ip(&req, &trusted_proxy_cidrs);
    let inbound = InboundRequest {
        method: req.method().as_str(),
        path: req.path(),
        query: req.uri().query(),
        headers: req.headers(),
        body: bytes::Bytes::from(body.to_vec()),
        client_ip: &client_ip,
    };

    let outbound = pipeline.handle(inbound).await?;

    let mut builder = HttpResponse::build(
        actix_web::http::StatusCode::from_u16(outbound.status)
            .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY),
    );
    builder.insert_header(("X-Gateway-Request-ID", outbound.request_id.to_string()));
    rate_limit::apply_headers(&mut builder, &outbound.rate_limit_verdict);

    for (name, value) in outbound.headers.iter() {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.insert_header((n, v));
        }
    }

    Ok(builder.body(outbound.body))
}

pub fn configure_proxy(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(10 * 1024 * 1024))
        .service(web::resource("/{tail:.*}").to(proxy));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_v4_prefix_match() {
        let ip: IpAddr = "10.0.5.7".parse().unwrap();
        assert!(cidr_contains("10.0.0.0/8", &ip));
        assert!(!cidr_contains("192.168.0.0/16", &ip));
    }

    #[test]
    fn cidr_exact_host_match() {
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(cidr_contains("127.0.0.1", &ip));
    }
}
