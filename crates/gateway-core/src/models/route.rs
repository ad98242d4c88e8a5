//! Route records: the durable binding between a URL pattern and an upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the routing table.
///
/// `pattern` is unique across active rows; see [`crate::utils::route_matcher`]
/// for the glob grammar it is compiled against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub pattern: String,
    pub methods: Vec<String>,
    pub target_service: String,
    pub target_base_url: String,
    pub auth_required: bool,
    pub priority: i32,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub circuit_breaker_enabled: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a route; server assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoute {
    pub pattern: String,
    pub methods: Vec<String>,
    pub target_service: String,
    pub target_base_url: String,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub priority: i32,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRoute {
    pub pattern: Option<String>,
    pub methods: Option<Vec<String>>,
    pub target_service: Option<String>,
    pub target_base_url: Option<String>,
    pub auth_required: Option<bool>,
    pub priority: Option<i32>,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
    pub circuit_breaker_enabled: Option<bool>,
    pub active: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl Route {
    pub const METHOD_WILDCARD: &'static str = "*";

    /// `true` if `methods` accepts the wildcard or contains `method` (case-insensitive on method).
    pub fn accepts_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == Self::METHOD_WILDCARD)
            || self
                .methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.pattern.starts_with('/') {
            return Err(format!("pattern must start with '/': {}", self.pattern));
        }
        if self.methods.is_empty() {
            return Err("methods must not be empty".to_string());
        }
        if self.target_base_url.ends_with('/') {
            return Err("target_base_url must not have a trailing slash".to_string());
        }
        if !self.target_base_url.starts_with("http://") && !self.target_base_url.starts_with("https://") {
            return Err(format!(
                "target_base_url must be an absolute http(s) URL: {}",
                self.target_base_url
            ));
        }
        if self.target_service.trim().is_empty() {
            return Err("target_service must not be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Route {
        Route {
            id: Uuid::new_v4(),
            pattern: "/api/v1/auth/*".to_string(),
            methods: vec!["GET".to_string(), "POST".to_string()],
            target_service: "auth".to_string(),
            target_base_url: "http://auth:8002".to_string(),
            auth_required: false,
            priority: 10,
            timeout_ms: 5000,
            retry_count: 1,
            circuit_breaker_enabled: true,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_listed_method() {
        let r = sample();
        assert!(r.accepts_method("GET"));
        assert!(!r.accepts_method("DELETE"));
    }

    #[test]
    fn wildcard_accepts_any_method() {
        let mut r = sample();
        r.methods = vec!["*".to_string()];
        assert!(r.accepts_method("DELETE"));
    }

    #[test]
    fn rejects_trailing_slash_base_url() {
        let mut r = sample();
        r.target_base_url = "http://auth:8002/".to_string();
        assert!(r.validate().is_err());
    }
}
