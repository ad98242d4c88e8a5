//! Service layer: the stateful engines that back the request pipeline.
//!
//! - [`route_table`] - C2 routing table with compiled-pattern resolution and a resolve cache
//! - [`rate_limiter`] - C4 composable sliding-window rate-limit engine
//! - [`circuit_breaker`] - C5 per-service circuit breaker registry
//! - [`health`] - C6 background health supervisor
//! - [`http`] - C7 upstream dispatcher
//! - [`log_sink`] - C10 bounded request log buffer and windowed analytics

pub mod circuit_breaker;
pub mod health;
pub mod http;
pub mod log_sink;
pub mod rate_limiter;
pub mod route_table;
