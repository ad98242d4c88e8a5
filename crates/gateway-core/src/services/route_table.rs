//! The routing table: CRUD over route records plus `(path, method)` resolution.
//!
//! Resolution evaluates every active route whose compiled pattern matches the
//! path, keeps the ones whose `methods` accept the request method, and
//! returns the one with the highest `priority`. Ties break on most-recent
//! `updated_at`, then lexicographically on `pattern`.

use crate::models::route::{CreateRoute, Route, UpdateRoute};
use crate::utils::route_matcher::CompiledPattern;
use ahash::HashMap as AHashMap;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum RouteTableError {
    #[error("no route matches path: {path}")]
    NotFound { path: String },

    #[error("method {method} not allowed for {path}")]
    MethodNotAllowed {
        path: String,
        method: String,
        allowed: Vec<String>,
    },

    #[error("a route with this pattern already exists")]
    DuplicatePattern,

    #[error("no route with id {0}")]
    NoSuchRoute(Uuid),

    #[error("invalid route: {0}")]
    Invalid(String),
}

struct Entry {
    route: Route,
    compiled: CompiledPattern,
}

/// In-process implementation of the persistent route store's CRUD/resolve
/// contract. Readers never block writers nor each other for longer than it
/// takes to clone the small route vector; the lock is held only to snapshot.
pub struct RouteTable {
    entries: RwLock<Vec<Entry>>,
    resolve_cache: RwLock<AHashMap<(String, String), Uuid>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            resolve_cache: RwLock::new(AHashMap::default()),
        }
    }

    pub async fn seed(&self, routes: Vec<Route>) -> Result<(), RouteTableError> {
        let mut entries = Vec::with_capacity(routes.len());
        for route in routes {
            let compiled = CompiledPattern::compile(&route.pattern)
                .map_err(|e| RouteTableError::Invalid(e.to_string()))?;
            entries.push(Entry { route, compiled });
        }
        *self.entries.write().await = entries;
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn list(&self, active_only: bool) -> Vec<Route> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| !active_only || e.route.active)
            .map(|e| e.route.clone())
            .collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<Route> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.route.id == id)
            .map(|e| e.route.clone())
    }

    pub async fn create(&self, input: CreateRoute) -> Result<Route, RouteTableError> {
        let now = Utc::now();
        let route = Route {
            id: Uuid::new_v4(),
            pattern: input.pattern,
            methods: input.methods,
            target_service: input.target_service,
            target_base_url: input.target_base_url,
            auth_required: input.auth_required,
            priority: input.priority,
            timeout_ms: input.timeout_ms.unwrap_or(5_000),
            retry_count: input.retry_count.unwrap_or(1),
            circuit_breaker_enabled: input.circuit_breaker_enabled,
            active: true,
            created_at: now,
            updated_at: now,
        };
        route.validate().map_err(RouteTableError::Invalid)?;

        let compiled = CompiledPattern::compile(&route.pattern)
            .map_err(|e| RouteTableError::Invalid(e.to_string()))?;

        let mut entries = self.entries.write().await;
        if entries
            .iter()
            .any(|e| e.route.active && e.route.pattern == route.pattern)
        {
            return Err(RouteTableError::DuplicatePattern);
        }
        entries.push(Entry { route: route.clone(), compiled });
        drop(entries);
        self.invalidate_cache().await;
        Ok(route)
    }

    pub async fn update(&self, id: Uuid, patch: UpdateRoute) -> Result<Route, RouteTableError> {
        let mut entries = self.entries.write().await;
        let idx = entries
            .iter()
            .position(|e| e.route.id == id)
            .ok_or(RouteTableError::NoSuchRoute(id))?;

        let mut route = entries[idx].route.clone();
        if let Some(pattern) = patch.pattern {
            if entries
                .iter()
                .enumerate()
                .any(|(i, e)| i != idx && e.route.active && e.route.pattern == pattern)
            {
                return Err(RouteTableError::DuplicatePattern);
            }
            route.pattern = pattern;
        }
        if let Some(v) = patch.methods {
            route.methods = v;
        }
        if let Some(v) = patch.target_service {
            route.target_service = v;
        }
        if let Some(v) = patch.target_base_url {
            route.target_base_url = v;
        }
        if let Some(v) = patch.auth_required {
            route.auth_required = v;
        }
        if let Some(v) = patch.priority {
            route.priority = v;
        }
        if let Some(v) = patch.timeout_ms {
            route.timeout_ms = v;
        }
        if let Some(v) = patch.retry_count {
            route.retry_count = v;
        }
        if let Some(v) = patch.circuit_breaker_enabled {
            route.circuit_breaker_enabled = v;
        }
        if let Some(v) = patch.active {
            route.active = v;
        }
        route.updated_at = Utc::now();
        route.validate().map_err(RouteTableError::Invalid)?;

        let compiled = CompiledPattern::compile(&route.pattern)
            .map_err(|e| RouteTableError::Invalid(e.to_string()))?;
        entries[idx] = Entry { route: route.clone(), compiled };
        drop(entries);
        self.invalidate_cache().await;
        Ok(route)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RouteTableError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.route.id != id);
        if entries.len() == before {
            return Err(RouteTableError::NoSuchRoute(id));
        }
        drop(entries);
        self.invalidate_cache().await;
        Ok(())
    }

    /// Resolve `(path, method)` to a route per §4.2's priority and tie-break rules.
    pub async fn resolve(&self, path: &str, method: &str) -> Result<Route, RouteTableError> {
        if let Some(id) = self.resolve_cache.read().await.get(&(path.to_string(), method.to_string())) {
            if let Some(route) = self.get(*id).await {
                return Ok(route);
            }
        }

        let entries = self.entries.read().await;
        let matching: Vec<&Entry> = entries
            .iter()
            .filter(|e| e.route.active && e.compiled.matches(path))
            .collect();

        if matching.is_empty() {
            return Err(RouteTableError::NotFound { path: path.to_string() });
        }

        let accepting: Vec<&Entry> = matching
            .iter()
            .copied()
            .filter(|e| e.route.accepts_method(method))
            .collect();

        if accepting.is_empty() {
            let mut allowed: Vec<String> = matching
                .iter()
                .flat_map(|e| e.route.methods.clone())
                .collect();
            allowed.sort();
            allowed.dedup();
            return Err(RouteTableError::MethodNotAllowed {
                path: path.to_string(),
                method: method.to_string(),
                allowed,
            });
        }

        let best = accepting
            .into_iter()
            .max_by(|a, b| {
                a.route
                    .priority
                    .cmp(&b.route.priority)
                    .then(a.route.updated_at.cmp(&b.route.updated_at))
                    .then(b.route.pattern.cmp(&a.route.pattern))
            })
            .expect("accepting is non-empty");

        let route = best.route.clone();
        drop(entries);
        self.resolve_cache
            .write()
            .await
            .insert((path.to_string(), method.to_string()), route.id);
        Ok(route)
    }

    async fn invalidate_cache(&self) {
        self.resolve_cache.write().await.clear();
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(pattern: &str, priority: i32) -> CreateRoute {
        CreateRoute {
            pattern: pattern.to_string(),
            methods: vec!["GET".to_string()],
            target_service: "svc".to_string(),
            target_base_url: "http://svc:8080".to_string(),
            auth_required: false,
            priority,
            timeout_ms: None,
            retry_count: None,
            circuit_breaker_enabled: true,
        }
    }

    #[tokio::test]
    async fn resolves_highest_priority_on_ambiguous_match() {
        let table = RouteTable::new();
        table.create(create("/api/*", 1)).await.unwrap();
        table.create(create("/api/v1/*", 5)).await.unwrap();

        let route = table.resolve("/api/v1/items", "GET").await.unwrap();
        assert_eq!(route.pattern, "/api/v1/*");
    }

    #[tokio::test]
    async fn not_found_vs_method_not_allowed() {
        let table = RouteTable::new();
        table.create(create("/api/v1/*", 1)).await.unwrap();

        assert!(matches!(
            table.resolve("/other", "GET").await,
            Err(RouteTableError::NotFound { .. })
        ));
        assert!(matches!(
            table.resolve("/api/v1/items", "DELETE").await,
            Err(RouteTableError::MethodNotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn rejects_duplicate_active_pattern() {
        let table = RouteTable::new();
        table.create(create("/api/v1/*", 1)).await.unwrap();
        let result = table.create(create("/api/v1/*", 2)).await;
        assert!(matches!(result, Err(RouteTableError::DuplicatePattern)));
    }

    #[tokio::test]
    async fn mutation_invalidates_resolve_cache() {
        let table = RouteTable::new();
        let created = table.create(create("/api/v1/*", 1)).await.unwrap();
        table.resolve("/api/v1/items", "GET").await.unwrap();

        table.delete(created.id).await.unwrap();
        assert!(matches!(
            table.resolve("/api/v1/items", "GET").await,
            Err(RouteTableError::NotFound { .. })
        ));
    }
}
