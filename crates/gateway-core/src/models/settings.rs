//! Application configuration for the gateway.

use serde::{Deserialize, Serialize};

/// JWT verification settings used by the local verification mode of the
/// token verifier.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub algorithm: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: std::env::var("GATEWAY_JWT_SECRET")
                .unwrap_or_else(|_| "please-change-this-secret".to_string()),
            algorithm: "HS256".to_string(),
            issuer: None,
            audience: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CorsSettings {
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub allow_credentials: bool,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origins: vec![],
            methods: vec!["GET".into(), "POST".into(), "PUT".into(), "DELETE".into()],
            headers: vec!["Authorization".into(), "Content-Type".into()],
            allow_credentials: false,
        }
    }
}

/// Complete gateway configuration, loaded from a JSON file and overridden by
/// a small set of environment variables (see [`crate::config::settings::load_settings`]).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GatewaySettings {
    pub listen_port: u16,

    pub jwt: JwtSettings,
    pub identity_service_url: Option<String>,

    pub store_dsn: String,

    pub gateway_timeout_ms: u64,
    pub gateway_retry_count: u32,

    pub rate_limit_enabled: bool,

    pub circuit_breaker_enabled: bool,
    pub failure_threshold: u64,
    pub success_threshold: u64,
    pub open_timeout_seconds: u64,

    pub health_check_interval_seconds: u64,
    pub health_check_timeout_seconds: u64,

    pub log_retention_days: u32,
    pub log_buffer_size: usize,
    pub log_sampling_ratio: f32,

    #[serde(default)]
    pub trusted_proxy_cidrs: Vec<String>,

    #[serde(default)]
    pub cors: CorsSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            listen_port: 8000,
            jwt: JwtSettings::default(),
            identity_service_url: None,
            store_dsn: "memory://local".to_string(),
            gateway_timeout_ms: 5_000,
            gateway_retry_count: 1,
            rate_limit_enabled: true,
            circuit_breaker_enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout_seconds: 30,
            health_check_interval_seconds: 15,
            health_check_timeout_seconds: 2,
            log_retention_days: 14,
            log_buffer_size: 10_000,
            log_sampling_ratio: 1.0,
            trusted_proxy_cidrs: vec![],
            cors: CorsSettings::default(),
        }
    }
}

impl GatewaySettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_port == 0 {
            return Err("listen_port must be nonzero".to_string());
        }
        if self.jwt.secret.is_empty() {
            return Err("jwt.secret must not be empty".to_string());
        }
        if self.jwt.secret == "please-change-this-secret" {
            return Err("jwt.secret must be changed from its default value".to_string());
        }
        if self.jwt.secret.len() < 32 {
            return Err("jwt.secret should be at least 32 characters".to_string());
        }
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be >= 1".to_string());
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be >= 1".to_string());
        }
        if self.log_sampling_ratio < 0.0 || self.log_sampling_ratio > 1.0 {
            return Err("log_sampling_ratio must be within [0, 1]".to_string());
        }
        Ok(())
    }
}
