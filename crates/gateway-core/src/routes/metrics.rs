//! `GET /api/v1/gateway/metrics` -- windowed request aggregates, and a
//! Prometheus-text variant for scraping.

use crate::services::log_sink::LogSink;
use actix_web::{web, HttpResponse, Result};
use serde_json::json;
use std::sync::Arc;

pub async fn metrics_json(logs: web::Data<Arc<LogSink>>) -> Result<HttpResponse> {
    let agg = logs.aggregates().await;
    Ok(HttpResponse::Ok().json(json!({
        "total_requests": agg.total_requests,
        "error_rate": agg.error_rate,
        "by_status_class": agg.by_status_class,
        "by_service": agg.by_service,
        "top_endpoints": agg.top_endpoints,
        "latency_ms": {
            "p50": agg.p50_ms,
            "p90": agg.p90_ms,
            "p95": agg.p95_ms,
            "p99": agg.p99_ms,
        },
        "logs_dropped": agg.logs_dropped,
    })))
}

pub async fn metrics_prometheus(logs: web::Data<Arc<LogSink>>) -> HttpResponse {
    let agg = logs.aggregates().await;
    let mut out = String::new();

    out.push_str("# HELP gateway_requests_total Total proxied requests observed.\n");
    out.push_str("# TYPE gateway_requests_total counter\n");
    out.push_str(&format!("gateway_requests_total {}\n", agg.total_requests));

    out.push_str("# HELP gateway_error_rate Fraction of requests with status >= 500.\n");
    out.push_str("# TYPE gateway_error_rate gauge\n");
    out.push_str(&format!("gateway_error_rate {}\n", agg.error_rate));

    out.push_str("# HELP gateway_logs_dropped_total Log records dropped due to a full buffer.\n");
    out.push_str("# TYPE gateway_logs_dropped_total counter\n");
    out.push_str(&format!("gateway_logs_dropped_total {}\n", agg.logs_dropped));

    out.push_str("# HELP gateway_request_duration_ms Response time percentiles in milliseconds.\n");
    out.push_str("# TYPE gateway_request_duration_ms summary\n");
    out.push_str(&format!("gateway_request_duration_ms{{quantile=\"0.5\"}} {}\n", agg.p50_ms));
    out.push_str(&format!("gateway_request_duration_ms{{quantile=\"0.9\"}} {}\n", agg.p90_ms));
    out.push_str(&format!("gateway_request_duration_ms{{quantile=\"0.95\"}} {}\n", agg.p95_ms));
    out.push_str(&format!("gateway_request_duration_ms{{quantile=\"0.99\"}} {}\n", agg.p99_ms));

    for (class, count) in &agg.by_status_class {
        out.push_str(&format!(
            "gateway_requests_by_status_class{{class=\"{}\"}} {}\n",
            class, count
        ));
    }
    for (service, count) in &agg.by_service {
        out.push_str(&format!(
            "gateway_requests_by_service{{service=\"{}\"}} {}\n",
            service, count
        ));
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(out)
}

pub fn configure_metrics(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/gateway/metrics", web::get().to(metrics_json))
        .route("/metrics", web::get().to(metrics_prometheus));
}
