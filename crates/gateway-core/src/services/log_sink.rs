//! Bounded asynchronous log sink and windowed analytics.
//!
//! `RequestLog` records are pushed from the request pipeline into a bounded
//! in-memory buffer. When the buffer is full the oldest record is dropped and
//! `logs_dropped` is incremented -- logging must never stall the data plane.
//! Percentiles and aggregates are computed on demand over the buffer's
//! current contents.

use crate::models::log::{LogQuery, RequestLog};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

pub struct LogSink {
    buffer: RwLock<VecDeque<RequestLog>>,
    capacity: usize,
    logs_dropped: AtomicU64,
}

impl LogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            logs_dropped: AtomicU64::new(0),
        }
    }

    pub async fn record(&self, log: RequestLog) {
        let mut buffer = self.buffer.write().await;
        if buffer.len() >= self.capacity {
            buffer.pop_front();
            self.logs_dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(log);
    }

    pub fn logs_dropped(&self) -> u64 {
        self.logs_dropped.load(Ordering::Relaxed)
    }

    pub async fn query(&self, filter: &LogQuery) -> Vec<RequestLog> {
        let buffer = self.buffer.read().await;
        let mut results: Vec<RequestLog> = buffer
            .iter()
            .filter(|log| {
                if let Some(service) = &filter.service {
                    if log.target_service.as_deref() != Some(service.as_str()) {
                        return false;
                    }
                }
                if let Some(min) = filter.status_min {
                    if log.status_code.unwrap_or(0) < min {
                        return false;
                    }
                }
                if let Some(max) = filter.status_max {
                    if log.status_code.unwrap_or(u16::MAX) > max {
                        return false;
                    }
                }
                if let Some(since) = filter.since {
                    if log.created_at < since {
                        return false;
                    }
                }
                if let Some(until) = filter.until {
                    if log.created_at > until {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        results
    }

    pub async fn aggregates(&self) -> Aggregates {
        let buffer = self.buffer.read().await;
        let total = buffer.len() as u64;
        let errors = buffer
            .iter()
            .filter(|l| l.status_code.map(|s| s >= 500).unwrap_or(true))
            .count() as u64;

        let mut by_status_class: std::collections::HashMap<&'static str, u64> = std::collections::HashMap::new();
        let mut by_service: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        let mut by_endpoint: std::collections::HashMap<String, u64> = std::collections::HashMap::new();

        for log in buffer.iter() {
            let class = match log.status_code {
                Some(s) if s < 300 => "2xx",
                Some(s) if s < 400 => "3xx",
                Some(s) if s < 500 => "4xx",
                Some(_) => "5xx",
                None => "none",
            };
            *by_status_class.entry(class).or_insert(0) += 1;
            if let Some(service) = &log.target_service {
                *by_service.entry(service.clone()).or_insert(0) += 1;
            }
            *by_endpoint.entry(log.path.clone()).or_insert(0) += 1;
        }

        let mut top_endpoints: Vec<(String, u64)> = by_endpoint.into_iter().collect();
        top_endpoints.sort_by(|a, b| b.1.cmp(&a.1));
        top_endpoints.truncate(10);

        let mut response_times: Vec<u64> = buffer.iter().map(|l| l.response_time_ms).collect();
        response_times.sort_unstable();

        Aggregates {
            total_requests: total,
            error_rate: if total == 0 { 0.0 } else { errors as f64 / total as f64 },
            by_status_class,
            by_service,
            top_endpoints,
            p50_ms: percentile(&response_times, 0.50),
            p90_ms: percentile(&response_times, 0.90),
            p95_ms: percentile(&response_times, 0.95),
            p99_ms: percentile(&response_times, 0.99),
            logs_dropped: self.logs_dropped(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aggregates {
    pub total_requests: u64,
    pub error_rate: f64,
    pub by_status_class: std::collections::HashMap<&'static str, u64>,
    pub by_service: std::collections::HashMap<String, u64>,
    pub top_endpoints: Vec<(String, u64)>,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub logs_dropped: u64,
}

/// Nearest-rank percentile over an already-sorted sample.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p * sorted.len() as f64).ceil() as usize).saturating_sub(1);
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn log(status: u16, ms: u64) -> RequestLog {
        RequestLog {
            request_id: Uuid::new_v4(),
            method: "GET".to_string(),
            path: "/api/v1/items".to_string(),
            matched_route_id: None,
            target_service: Some("items".to_string()),
            user_id: None,
            client_ip: "127.0.0.1".to_string(),
            status_code: Some(status),
            response_time_ms: ms,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drop_oldest_increments_counter_when_full() {
        let sink = LogSink::new(2);
        sink.record(log(200, 10)).await;
        sink.record(log(200, 20)).await;
        sink.record(log(200, 30)).await;

        assert_eq!(sink.logs_dropped(), 1);
        let all = sink.query(&LogQuery::default()).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn percentiles_are_monotonic() {
        let sink = LogSink::new(100);
        for ms in [10, 20, 30, 40, 50, 600] {
            sink.record(log(200, ms)).await;
        }
        let agg = sink.aggregates().await;
        assert!(agg.p50_ms <= agg.p90_ms);
        assert!(agg.p90_ms <= agg.p95_ms);
        assert!(agg.p95_ms <= agg.p99_ms);
    }
}
