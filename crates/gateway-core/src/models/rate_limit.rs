//! Rate-limit rule records consumed by the rate-limit engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    PerUser,
    PerIp,
    PerEndpoint,
    Global,
}

/// A composable rate-limit rule; requests are denied iff any selected active
/// rule is over budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub id: Uuid,
    pub name: String,
    pub scope: RateLimitScope,
    pub pattern: Option<String>,
    pub max_requests: u64,
    pub window_seconds: u64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRateLimitRule {
    pub name: String,
    pub scope: RateLimitScope,
    pub pattern: Option<String>,
    pub max_requests: u64,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRateLimitRule {
    pub name: Option<String>,
    pub scope: Option<RateLimitScope>,
    pub pattern: Option<Option<String>>,
    pub max_requests: Option<u64>,
    pub window_seconds: Option<u64>,
    pub active: Option<bool>,
}

impl RateLimitRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.max_requests < 1 {
            return Err("max_requests must be >= 1".to_string());
        }
        if self.window_seconds < 1 {
            return Err("window_seconds must be >= 1".to_string());
        }
        Ok(())
    }
}
