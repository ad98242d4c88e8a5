//! Gateway server entry point.
//!
//! Loads configuration, validates it, wires the routing table, token
//! verifier, rate-limit engine, circuit breaker registry, health supervisor,
//! and upstream dispatcher into a [`gateway_core::pipeline::Pipeline`], and
//! serves it behind the data-plane proxy, health, management, and metrics
//! route configs.

use gateway_core::config::settings::load_settings;
use gateway_core::config::validation::ConfigValidator;
use gateway_core::logs::logger::configure_logger;
use gateway_core::middleware::auth::TokenVerifier;
use gateway_core::middleware::security::{cors_headers, security_headers};
use gateway_core::pipeline::Pipeline;
use gateway_core::routes::health::configure_health;
use gateway_core::routes::http::configure_proxy;
use gateway_core::routes::management::{configure_management, ManagementState};
use gateway_core::routes::metrics::configure_metrics;
use gateway_core::services::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use gateway_core::services::health::HealthSupervisor;
use gateway_core::services::http::Dispatcher;
use gateway_core::services::log_sink::LogSink;
use gateway_core::services::rate_limiter::RateLimitEngine;
use gateway_core::services::route_table::RouteTable;

use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let settings = load_settings().unwrap_or_else(|e| {
        error!("failed to load configuration: {}", e);
        std::process::exit(1);
    });

    info!("starting gateway on port {}", settings.listen_port);

    let routes = Arc::new(RouteTable::new());
    let validation = ConfigValidator::validate_comprehensive(&settings, &routes.list(false).await);
    if !validation.is_valid {
        error!("configuration validation failed:");
        for err in &validation.errors {
            error!("  - {}", err);
        }
        std::process::exit(1);
    }
    info!(
        "configuration validated with {} warnings, {} recommendations",
        validation.warnings.len(),
        validation.recommendations.len()
    );

    let tokens = Arc::new(TokenVerifier::new(
        settings.jwt.clone(),
        settings.identity_service_url.clone(),
    ));
    let rate_limiter = Arc::new(RateLimitEngine::new());
    let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: settings.failure_threshold,
        success_threshold: settings.success_threshold,
        open_timeout: Duration::from_secs(settings.open_timeout_seconds),
    }));
    let health = Arc::new(HealthSupervisor::new(Duration::from_secs(
        settings.health_check_timeout_seconds,
    )));
    let dispatcher = Arc::new(Dispatcher::new());
    let logs = Arc::new(LogSink::new(settings.log_buffer_size));

    let pipeline = Arc::new(Pipeline {
        routes: routes.clone(),
        tokens: tokens.clone(),
        rate_limiter: rate_limiter.clone(),
        breakers: breakers.clone(),
        health: health.clone(),
        dispatcher,
        logs: logs.clone(),
        rate_limit_enabled: settings.rate_limit_enabled,
    });

    let management_state = Arc::new(ManagementState {
        routes: routes.clone(),
        rate_limits: rate_limiter,
        breakers,
        health: health.clone(),
        logs: logs.clone(),
        tokens,
    });

    let health_interval = settings.health_check_interval_seconds;
    let probe_handle = health.clone().spawn(health_interval);

    let trusted_proxy_cidrs = web::Data::new(settings.trusted_proxy_cidrs.clone());
    let cors = settings.cors.clone();
    let listen_port = settings.listen_port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pipeline.clone()))
            .app_data(web::Data::new(management_state.clone()))
            .app_data(web::Data::new(health.clone()))
            .app_data(web::Data::new(logs.clone()))
            .app_data(trusted_proxy_cidrs.clone())
            .wrap(Logger::new(r#"%a "%r" %s %b "%{Referer}i" "%{User-Agent}i" %T"#))
            .wrap(actix_web::middleware::Compress::default())
            .wrap(security_headers())
            .wrap(cors_headers(&cors))
            .configure(configure_health)
            .configure(configure_metrics)
            .configure(configure_management)
            .configure(configure_proxy)
    })
    .bind(("0.0.0.0", listen_port))?
    .run();

    info!("server listening on 0.0.0.0:{}", listen_port);

    tokio::select! {
        result = server => {
            match result {
                Ok(_) => info!("server stopped gracefully"),
                Err(e) => error!("server error: {}", e),
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, stopping server");
        }
    }

    probe_handle.abort();

    Ok(())
}
