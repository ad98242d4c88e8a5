//! Health supervisor: periodically probes registered upstreams and maintains
//! their [`ServiceHealth`] records.
//!
//! The supervisor never opens a circuit breaker itself -- it only publishes
//! status. The breaker is driven exclusively by real dispatch outcomes, so
//! health and breaker state can disagree transiently (e.g. after a breaker
//! opens but before the next probe tick observes the failure).

use crate::models::health::{aggregate, AggregateHealth, HealthStatus, ServiceHealth};
use ahash::HashMap as AHashMap;
use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;

const HEALTH_PATH: &str = "/health";

pub struct HealthSupervisor {
    records: RwLock<AHashMap<String, ServiceHealth>>,
    base_urls: RwLock<AHashMap<String, String>>,
    http: reqwest::Client,
    probe_timeout: Duration,
}

impl HealthSupervisor {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            records: RwLock::new(AHashMap::default()),
            base_urls: RwLock::new(AHashMap::default()),
            http: reqwest::Client::builder()
                .timeout(probe_timeout + Duration::from_millis(500))
                .build()
                .expect("reqwest client for health probes"),
            probe_timeout,
        }
    }

    /// Registers (or updates the base URL for) a service to be probed.
    /// Created lazily on first observed dispatch too -- see [`Self::observe_dispatch`].
    pub async fn register(&self, service_name: &str, base_url: &str) {
        self.base_urls
            .write()
            .await
            .insert(service_name.to_string(), base_url.to_string());
        self.records
            .write()
            .await
            .entry(service_name.to_string())
            .or_insert_with(|| ServiceHealth::new(service_name));
    }

    /// Ensures a health record exists for a service observed via dispatch,
    /// even if it was never explicitly registered for probing.
    pub async fn observe_dispatch(&self, service_name: &str) {
        self.records
            .write()
            .await
            .entry(service_name.to_string())
            .or_insert_with(|| ServiceHealth::new(service_name));
    }

    pub async fn get(&self, service_name: &str) -> Option<ServiceHealth> {
        self.records.read().await.get(service_name).cloned()
    }

    pub async fn list(&self) -> Vec<ServiceHealth> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn aggregate_health(&self) -> AggregateHealth {
        let records: Vec<ServiceHealth> = self.records.read().await.values().cloned().collect();
        aggregate(&records)
    }

    pub async fn set_circuit_open(&self, service_name: &str, open: bool) {
        if let Some(record) = self.records.write().await.get_mut(service_name) {
            record.circuit_open = open;
        }
    }

    /// Spawns the background probe loop. Intended to run for the lifetime of
    /// the process; callers keep the returned handle to abort on shutdown.
    pub fn spawn(self: Arc<Self>, interval_seconds: u64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
            loop {
                ticker.tick().await;
                self.probe_all().await;
            }
        })
    }

    async fn probe_all(&self) {
        let targets: Vec<(String, String)> = self
            .base_urls
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (service_name, base_url) in targets {
            self.probe_one(&service_name, &base_url).await;
        }
    }

    async fn probe_one(&self, service_name: &str, base_url: &str) {
        let url = format!("{}{}", base_url, HEALTH_PATH);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout, self.http.get(&url).send()).await;

        let mut records = self.records.write().await;
        let record = records
            .entry(service_name.to_string())
            .or_insert_with(|| ServiceHealth::new(service_name));
        record.last_probe_at = Some(chrono::Utc::now());

        match outcome {
            Ok(Ok(response)) if response.status().as_u16() == 200 => {
                record.status = HealthStatus::Healthy;
                record.success_count += 1;
                record.last_response_time_ms = Some(started.elapsed().as_millis() as u64);
                debug!("health probe ok for {}", service_name);
            }
            Ok(Ok(response)) if response.status().as_u16() >= 500 => {
                record.status = HealthStatus::Degraded;
                record.error_count += 1;
                warn!("health probe degraded for {}: {}", service_name, response.status());
            }
            Ok(Ok(_)) => {
                record.status = HealthStatus::Degraded;
                record.error_count += 1;
            }
            _ => {
                record.status = HealthStatus::Unhealthy;
                record.error_count += 1;
                warn!("health probe failed for {}", service_name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_service_reports_unknown_until_probed() {
        let supervisor = HealthSupervisor::new(Duration::from_secs(1));
        supervisor.observe_dispatch("auth").await;
        let record = supervisor.get("auth").await.unwrap();
        assert_eq!(record.status, HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn aggregate_reflects_registered_services() {
        let supervisor = HealthSupervisor::new(Duration::from_secs(1));
        supervisor.observe_dispatch("auth").await;
        assert_eq!(supervisor.aggregate_health().await, AggregateHealth::Unhealthy);
    }
}
