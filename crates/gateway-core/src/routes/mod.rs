//! HTTP route handlers: the data-plane proxy, liveness/readiness probes,
//! the management API, and metrics export.
//!
//! - [`http`] - catch-all proxy entrypoint feeding the request pipeline
//! - [`health`] - `/health`, `/ready`, `/live` and the aggregated health view
//! - [`management`] - C9 CRUD surface over routes and rate-limit rules
//! - [`metrics`] - C10 JSON and Prometheus-text aggregates

pub mod health;
pub mod http;
pub mod management;
pub mod metrics;
