//! Per-service health records maintained by the health supervisor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Unknown
    }
}

/// The health record for one `target_service`, keyed by name, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service_name: String,
    pub status: HealthStatus,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub success_count: u64,
    pub error_count: u64,
    pub circuit_open: bool,
}

impl ServiceHealth {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            status: HealthStatus::Unknown,
            last_probe_at: None,
            last_response_time_ms: None,
            success_count: 0,
            error_count: 0,
            circuit_open: false,
        }
    }
}

/// Health rolled up across every registered service, per §4.6's aggregation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

pub fn aggregate(records: &[ServiceHealth]) -> AggregateHealth {
    if records.is_empty() {
        return AggregateHealth::Healthy;
    }
    let all_healthy = records.iter().all(|r| r.status == HealthStatus::Healthy);
    if all_healthy {
        return AggregateHealth::Healthy;
    }
    let any_unhealthy = records.iter().any(|r| r.status == HealthStatus::Unhealthy);
    let any_healthy = records.iter().any(|r| r.status == HealthStatus::Healthy);
    if !any_unhealthy && any_healthy {
        AggregateHealth::Degraded
    } else {
        AggregateHealth::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_healthy() {
        assert_eq!(aggregate(&[]), AggregateHealth::Healthy);
    }

    #[test]
    fn one_unhealthy_drags_down_aggregate() {
        let mut a = ServiceHealth::new("a");
        a.status = HealthStatus::Healthy;
        let mut b = ServiceHealth::new("b");
        b.status = HealthStatus::Unhealthy;
        assert_eq!(aggregate(&[a, b]), AggregateHealth::Unhealthy);
    }

    #[test]
    fn degraded_when_some_healthy_none_unhealthy() {
        let mut a = ServiceHealth::new("a");
        a.status = HealthStatus::Healthy;
        let mut b = ServiceHealth::new("b");
        b.status = HealthStatus::Degraded;
        assert_eq!(aggregate(&[a, b]), AggregateHealth::Degraded);
    }
}
