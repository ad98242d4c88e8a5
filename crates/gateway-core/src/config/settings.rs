//! Configuration loading: a JSON file on disk, overridden by a small set of
//! environment variables.
//!
//! The file path defaults to `./config.json` and is overridable via
//! `GATEWAY_CONFIG_PATH`. Environment overrides are applied after the file is
//! parsed so deployments can keep secrets (`GATEWAY_JWT_SECRET`) and
//! per-environment values (listen port, identity service URL) out of the
//! checked-in file.

use crate::models::settings::GatewaySettings;
use std::fs;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads [`GatewaySettings`] from `GATEWAY_CONFIG_PATH` (default `./config.json`),
/// then applies environment overrides, then validates the result.
pub fn load_settings() -> Result<GatewaySettings, SettingsError> {
    let path = std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());

    let mut settings = match fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str::<GatewaySettings>(&contents)
            .map_err(|source| SettingsError::Parse { path: path.clone(), source })?,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("config file {} not found, using defaults", path);
            GatewaySettings::default()
        }
        Err(source) => return Err(SettingsError::Read { path, source }),
    };

    apply_env_overrides(&mut settings);

    settings
        .validate()
        .map_err(SettingsError::Invalid)?;

    Ok(settings)
}

fn apply_env_overrides(settings: &mut GatewaySettings) {
    if let Ok(port) = std::env::var("GATEWAY_LISTEN_PORT") {
        if let Ok(port) = port.parse() {
            settings.listen_port = port;
        }
    }
    if let Ok(secret) = std::env::var("GATEWAY_JWT_SECRET") {
        settings.jwt.secret = secret;
    }
    if let Ok(url) = std::env::var("GATEWAY_IDENTITY_SERVICE_URL") {
        settings.identity_service_url = Some(url);
    }
    if let Ok(dsn) = std::env::var("GATEWAY_STORE_DSN") {
        settings.store_dsn = dsn;
    }
    if let Ok(flag) = std::env::var("GATEWAY_RATE_LIMIT_ENABLED") {
        if let Ok(flag) = flag.parse() {
            settings.rate_limit_enabled = flag;
        }
    }
    if let Ok(flag) = std::env::var("GATEWAY_CIRCUIT_BREAKER_ENABLED") {
        if let Ok(flag) = flag.parse() {
            settings.circuit_breaker_enabled = flag;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // load_settings() reads process-wide env vars; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_file_falls_back_to_defaults_and_applies_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GATEWAY_CONFIG_PATH", "/nonexistent/gateway-config-test.json");
        std::env::set_var("GATEWAY_JWT_SECRET", "an-env-provided-secret-that-is-long-enough");
        let settings = load_settings().expect("defaults plus env override must validate");
        assert_eq!(settings.jwt.secret, "an-env-provided-secret-that-is-long-enough");
        std::env::remove_var("GATEWAY_CONFIG_PATH");
        std::env::remove_var("GATEWAY_JWT_SECRET");
    }

    #[test]
    fn file_values_are_overridden_by_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut settings = GatewaySettings::default();
        settings.jwt.secret = "a-file-provided-secret-that-is-long-enough".to_string();
        settings.listen_port = 9000;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&settings).unwrap().as_bytes()).unwrap();

        std::env::set_var("GATEWAY_CONFIG_PATH", file.path());
        std::env::set_var("GATEWAY_LISTEN_PORT", "9100");
        let loaded = load_settings().expect("file plus env override must validate");
        assert_eq!(loaded.listen_port, 9100);
        assert_eq!(loaded.jwt.secret, "a-file-provided-secret-that-is-long-enough");

        std::env::remove_var("GATEWAY_CONFIG_PATH");
        std::env::remove_var("GATEWAY_LISTEN_PORT");
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"listen_port": 0}"#).unwrap();
        std::env::set_var("GATEWAY_CONFIG_PATH", file.path());
        let result = load_settings();
        std::env::remove_var("GATEWAY_CONFIG_PATH");
        assert!(result.is_err());
    }
}
