//! Data models and domain types for the gateway.
//!
//! # Module Organization
//!
//! - [`error`] - `GatewayError` and its HTTP response mapping
//! - [`route`] - routing-table records
//! - [`rate_limit`] - rate-limit rule records
//! - [`health`] - per-service health records
//! - [`log`] - request-log records
//! - [`settings`] - application configuration

pub mod error;
pub mod health;
pub mod log;
pub mod rate_limit;
pub mod route;
pub mod settings;
