//! Advanced configuration validation with detailed error reporting.
//!
//! This runs in addition to [`crate::models::settings::GatewaySettings::validate`]
//! (which only checks structural invariants): it inspects the seeded route
//! set for security, performance, and conflict issues and categorizes
//! findings as errors, warnings, or recommendations.

use crate::models::route::Route;
use crate::models::settings::GatewaySettings;
use log::{info, warn};
use std::collections::HashSet;

/// Result of configuration validation containing errors, warnings, and recommendations.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn add_recommendation(&mut self, recommendation: String) {
        self.recommendations.push(recommendation);
    }
}

/// Enhanced configuration validator with security and performance checks.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates gateway settings plus the seeded route set. `settings` alone
    /// cannot catch route-level issues, since routes are managed separately
    /// through the routing table once the gateway is running; this is meant
    /// to be run once against the initial seed set at startup.
    pub fn validate_comprehensive(settings: &GatewaySettings, routes: &[Route]) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_settings(settings, &mut result);
        Self::validate_security(routes, &mut result);
        Self::validate_performance(routes, &mut result);
        Self::validate_route_conflicts(routes, &mut result);
        Self::log_validation_results(&result);

        result
    }

    fn validate_settings(settings: &GatewaySettings, result: &mut ValidationResult) {
        if let Err(e) = settings.validate() {
            result.add_error(e);
        }
        if settings.identity_service_url.is_none() {
            result.add_recommendation(
                "no identity_service_url configured -- remote JWT fallback is disabled".to_string(),
            );
        }
        if settings.trusted_proxy_cidrs.is_empty() {
            result.add_recommendation(
                "no trusted_proxy_cidrs configured -- X-Forwarded-For will never be trusted".to_string(),
            );
        }
        if settings.cors.origins.is_empty() {
            result.add_warning(
                "cors.origins is empty -- all cross-origin requests will be rejected".to_string(),
            );
        }
    }

    fn validate_security(routes: &[Route], result: &mut ValidationResult) {
        let mut http_routes = 0;
        let mut https_routes = 0;

        for route in routes {
            if route.target_base_url.starts_with("http://") {
                http_routes += 1;
                if route.target_base_url.contains("localhost") || route.target_base_url.contains("127.0.0.1") {
                    result.add_warning(format!(
                        "HTTP backend to localhost detected: {} -- consider HTTPS for production",
                        route.target_base_url
                    ));
                } else {
                    result.add_warning(format!(
                        "insecure HTTP backend detected: {} -- consider HTTPS",
                        route.target_base_url
                    ));
                }
            } else if route.target_base_url.starts_with("https://") {
                https_routes += 1;
            }

            if route.methods.len() > 4 {
                result.add_warning(format!(
                    "route {} allows many HTTP methods ({}) -- consider restricting for security",
                    route.pattern,
                    route.methods.len()
                ));
            }

            if route.pattern.contains("..") {
                result.add_error(format!("path traversal detected in route pattern: {}", route.pattern));
            }

            if !route.auth_required && route.pattern.contains("/admin") {
                result.add_warning(format!(
                    "route {} looks administrative but does not require auth",
                    route.pattern
                ));
            }
        }

        if http_routes > 0 && https_routes == 0 {
            result.add_warning("all routes use HTTP -- consider HTTPS for production security".to_string());
        }
    }

    fn validate_performance(routes: &[Route], result: &mut ValidationResult) {
        let dynamic_routes = routes.iter().filter(|r| r.pattern.contains('*')).count();
        let static_routes = routes.len() - dynamic_routes;

        if routes.len() > 200 {
            result.add_warning(format!(
                "high number of routes ({}) may impact resolve-cache effectiveness",
                routes.len()
            ));
        }

        if static_routes == 0 && dynamic_routes > 0 {
            result.add_recommendation(
                "consider adding static routes for frequently accessed endpoints to improve matching performance"
                    .to_string(),
            );
        }

        for route in routes {
            if route.timeout_ms > 30_000 {
                result.add_warning(format!(
                    "route {} has a timeout of {}ms -- unusually high, check the upstream's actual latency",
                    route.pattern, route.timeout_ms
                ));
            }
            if route.retry_count > 3 {
                result.add_warning(format!(
                    "route {} retries {} times -- may amplify load on a struggling upstream",
                    route.pattern, route.retry_count
                ));
            }
        }
    }

    fn validate_route_conflicts(routes: &[Route], result: &mut ValidationResult) {
        let mut seen_patterns = HashSet::new();
        let mut potential_conflicts = Vec::new();

        for route in routes {
            if !route.active {
                continue;
            }
            if seen_patterns.contains(&route.pattern) {
                result.add_error(format!("duplicate route pattern detected: {}", route.pattern));
            }
            seen_patterns.insert(&route.pattern);

            for other in routes {
                if route.pattern != other.pattern
                    && other.active
                    && Self::patterns_may_conflict(&route.pattern, &other.pattern)
                {
                    potential_conflicts.push((route.pattern.clone(), other.pattern.clone()));
                }
            }
        }

        for (p1, p2) in potential_conflicts {
            result.add_warning(format!(
                "potential route conflict between '{}' and '{}' -- priority and updated_at decide resolution",
                p1, p2
            ));
        }
    }

    /// Heuristic: patterns of equal segment count where every non-wildcard
    /// segment matches could both match the same path.
    fn patterns_may_conflict(p1: &str, p2: &str) -> bool {
        let seg1: Vec<&str> = p1.split('/').collect();
        let seg2: Vec<&str> = p2.split('/').collect();

        if seg1.len() != seg2.len() {
            return false;
        }

        for (a, b) in seg1.iter().zip(seg2.iter()) {
            if *a == "*" || *b == "*" {
                continue;
            }
            if a != b {
                return false;
            }
        }
        true
    }

    fn log_validation_results(result: &ValidationResult) {
        if result.is_valid {
            info!("configuration validation passed");
        } else {
            for error in &result.errors {
                log::error!("validation error: {}", error);
            }
        }
        for warning in &result.warnings {
            warn!("validation warning: {}", warning);
        }
        for recommendation in &result.recommendations {
            info!("recommendation: {}", recommendation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn route(pattern: &str, base_url: &str) -> Route {
        let now = Utc::now();
        Route {
            id: Uuid::new_v4(),
            pattern: pattern.to_string(),
            methods: vec!["GET".to_string()],
            target_service: "svc".to_string(),
            target_base_url: base_url.to_string(),
            auth_required: false,
            priority: 0,
            timeout_ms: 5_000,
            retry_count: 1,
            circuit_breaker_enabled: true,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn flags_http_backend_as_warning_not_error() {
        let mut result = ValidationResult::new();
        ConfigValidator::validate_security(&[route("/api/v1/*", "http://svc:8080")], &mut result);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn duplicate_active_pattern_is_an_error() {
        let routes = vec![route("/api/v1/*", "http://svc:8080"), route("/api/v1/*", "http://svc2:8080")];
        let mut result = ValidationResult::new();
        ConfigValidator::validate_route_conflicts(&routes, &mut result);
        assert!(!result.is_valid);
    }

    #[test]
    fn wildcard_and_static_same_shape_is_a_conflict_warning() {
        let routes = vec![route("/api/v1/*", "http://svc:8080"), route("/api/v1/items", "http://svc2:8080")];
        let mut result = ValidationResult::new();
        ConfigValidator::validate_route_conflicts(&routes, &mut result);
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
