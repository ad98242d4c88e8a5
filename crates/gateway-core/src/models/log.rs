//! The append-only per-request record produced by the request pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub request_id: Uuid,
    pub method: String,
    pub path: String,
    pub matched_route_id: Option<Uuid>,
    pub target_service: Option<String>,
    pub user_id: Option<String>,
    pub client_ip: String,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters accepted by the log query surface (`/api/v1/gateway/logs`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogQuery {
    pub service: Option<String>,
    pub status_min: Option<u16>,
    pub status_max: Option<u16>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}
