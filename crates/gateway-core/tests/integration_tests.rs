//! Integration tests for the gateway: end-to-end routing, health, and
//! metrics surfaces wired together the way the server binary assembles them.

use actix_web::{test, web, App};
use gateway_core::routes::{health, metrics};
use gateway_core::services::log_sink::LogSink;
use std::sync::Arc;

#[actix_web::test]
async fn test_health_endpoints() {
    let app = test::init_service(App::new().configure(health::configure_health)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get().uri("/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get().uri("/live").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_aggregate_health_with_no_registered_services() {
    use gateway_core::services::health::HealthSupervisor;
    use std::time::Duration;

    let supervisor = Arc::new(HealthSupervisor::new(Duration::from_secs(1)));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(supervisor))
            .configure(health::configure_health),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/gateway/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_metrics_endpoints_reflect_recorded_logs() {
    use gateway_core::models::log::RequestLog;
    use chrono::Utc;
    use uuid::Uuid;

    let logs = Arc::new(LogSink::new(100));
    logs.record(RequestLog {
        request_id: Uuid::new_v4(),
        method: "GET".to_string(),
        path: "/api/v1/content/items".to_string(),
        matched_route_id: None,
        target_service: Some("content".to_string()),
        user_id: None,
        client_ip: "127.0.0.1".to_string(),
        status_code: Some(200),
        response_time_ms: 42,
        error_message: None,
        created_at: Utc::now(),
    })
    .await;

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(logs))
            .configure(metrics::configure_metrics),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/gateway/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total_requests"], 1);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body = test::read_body(resp).await;
    let body_str = std::str::from_utf8(&body).unwrap();
    assert!(body_str.contains("gateway_requests_total 1"));
}

#[actix_web::test]
async fn test_management_api_requires_admin_role() {
    use gateway_core::middleware::auth::TokenVerifier;
    use gateway_core::models::settings::JwtSettings;
    use gateway_core::routes::management::{configure_management, ManagementState};
    use gateway_core::services::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
    use gateway_core::services::health::HealthSupervisor;
    use gateway_core::services::rate_limiter::RateLimitEngine;
    use gateway_core::services::route_table::RouteTable;
    use std::time::Duration;

    let state = Arc::new(ManagementState {
        routes: Arc::new(RouteTable::new()),
        rate_limits: Arc::new(RateLimitEngine::new()),
        breakers: Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
        health: Arc::new(HealthSupervisor::new(Duration::from_secs(1))),
        logs: Arc::new(LogSink::new(100)),
        tokens: Arc::new(TokenVerifier::new(
            JwtSettings {
                secret: "a-sufficiently-long-test-secret-value".to_string(),
                algorithm: "HS256".to_string(),
                issuer: None,
                audience: None,
            },
            None,
        )),
    });

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(configure_management),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/gateway/routes").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}
