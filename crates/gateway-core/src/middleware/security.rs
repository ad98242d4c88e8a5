//! Security response headers and CORS header construction.
//!
//! These are applied as static `DefaultHeaders` layers rather than a dynamic
//! `Service` middleware: the header set does not depend on the request, only
//! on [`crate::models::settings::CorsSettings`] read once at startup.

use crate::models::settings::CorsSettings;
use actix_web::middleware::DefaultHeaders;

/// Baseline security headers applied to every response.
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("X-XSS-Protection", "1; mode=block"))
        .add(("Strict-Transport-Security", "max-age=31536000; includeSubDomains"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add(("Content-Security-Policy", "default-src 'self'"))
        .add(("Permissions-Policy", "geolocation=(), microphone=(), camera=()"))
}

/// CORS headers built from configured origins/methods/headers.
///
/// An empty `origins` list disables cross-origin access entirely rather than
/// falling back to a permissive `*`.
pub fn cors_headers(cors: &CorsSettings) -> DefaultHeaders {
    let origin = if cors.origins.is_empty() {
        "null".to_string()
    } else {
        cors.origins.join(", ")
    };
    let methods = if cors.methods.is_empty() {
        "GET, POST, PUT, DELETE".to_string()
    } else {
        cors.methods.join(", ")
    };
    let headers = if cors.headers.is_empty() {
        "Authorization, Content-Type".to_string()
    } else {
        cors.headers.join(", ")
    };

    let mut builder = DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", origin))
        .add(("Access-Control-Allow-Methods", methods))
        .add(("Access-Control-Allow-Headers", headers));

    if cors.allow_credentials {
        builder = builder.add(("Access-Control-Allow-Credentials", "true"));
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_origins_disable_cors() {
        let cors = CorsSettings {
            origins: vec![],
            methods: vec![],
            headers: vec![],
            allow_credentials: false,
        };
        let _ = cors_headers(&cors);
    }
}
