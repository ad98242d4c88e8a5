//! HTTP header shaping for rate-limit verdicts.
//!
//! The engine itself ([`crate::services::rate_limiter`]) is transport-agnostic;
//! this module turns its verdicts into the `X-RateLimit-*` / `Retry-After`
//! headers the pipeline attaches to responses.

use crate::services::rate_limiter::Verdict;
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::HttpResponseBuilder;
use chrono::Utc;

pub fn apply_headers(builder: &mut HttpResponseBuilder, verdict: &Verdict) {
    let snapshot = match verdict {
        Verdict::Allow(Some(s)) => s,
        Verdict::Deny(s) => s,
        Verdict::Allow(None) => return,
    };
    insert(builder, "X-RateLimit-Limit", snapshot.limit.to_string());
    insert(builder, "X-RateLimit-Remaining", snapshot.remaining.to_string());
    insert(builder, "X-RateLimit-Reset", snapshot.reset_at_unix.to_string());

    if matches!(verdict, Verdict::Deny(_)) {
        let retry_after = (snapshot.reset_at_unix - Utc::now().timestamp()).max(0);
        insert(builder, "Retry-After", retry_after.to_string());
    }
}

fn insert(builder: &mut HttpResponseBuilder, name: &'static str, value: String) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(&value),
    ) {
        builder.insert_header((name, value));
    }
}
