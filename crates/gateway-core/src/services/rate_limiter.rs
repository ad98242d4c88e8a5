//! Rate-limit engine: evaluates the active rule set against a request and
//! reports an allow/deny verdict plus a meter snapshot.
//!
//! Each `(rule_id, bucket_key)` pair owns a sliding-window counter
//! approximated by a current/previous window pair with a weighted rollover,
//! bounding drift to one window step as required. Evaluation is
//! test-then-commit: if any selected rule is over budget, none of the
//! selected buckets are incremented for that request.

use crate::models::rate_limit::{CreateRateLimitRule, RateLimitRule, RateLimitScope, UpdateRateLimitRule};
use crate::utils::route_matcher::CompiledPattern;
use ahash::HashMap as AHashMap;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum RateLimitRuleError {
    #[error("no rule with id {0}")]
    NoSuchRule(Uuid),

    #[error("a rule with this name already exists")]
    DuplicateName,

    #[error("invalid rule: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
struct Window {
    current_count: u64,
    current_start_secs: u64,
    previous_count: u64,
}

impl Window {
    fn new(now_secs: u64) -> Self {
        Self {
            current_count: 0,
            current_start_secs: now_secs,
            previous_count: 0,
        }
    }

    /// Weighted count of requests attributable to the trailing `window_seconds`.
    fn weighted_count(&self, now_secs: u64, window_seconds: u64) -> f64 {
        let elapsed_in_current = now_secs.saturating_sub(self.current_start_secs) as f64;
        let fraction_of_previous = if window_seconds == 0 {
            0.0
        } else {
            (1.0 - (elapsed_in_current / window_seconds as f64)).clamp(0.0, 1.0)
        };
        self.current_count as f64 + self.previous_count as f64 * fraction_of_previous
    }

    fn roll_if_needed(&mut self, now_secs: u64, window_seconds: u64) {
        let elapsed = now_secs.saturating_sub(self.current_start_secs);
        if elapsed >= window_seconds {
            let windows_elapsed = elapsed / window_seconds.max(1);
            if windows_elapsed >= 2 {
                self.previous_count = 0;
            } else {
                self.previous_count = self.current_count;
            }
            self.current_count = 0;
            self.current_start_secs = now_secs;
        }
    }
}

/// Bucket-level result for the tightest rule involved in a verdict.
#[derive(Debug, Clone)]
pub struct MeterSnapshot {
    pub rule_name: String,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at_unix: i64,
}

#[derive(Debug)]
pub enum Verdict {
    Allow(Option<MeterSnapshot>),
    Deny(MeterSnapshot),
}

struct CompiledRule {
    rule: RateLimitRule,
    pattern: Option<CompiledPattern>,
}

/// In-process counter store behind the same `incr`/`peek` contract a
/// distributed counter service would expose, so that swapping in a remote
/// implementation for `§4.4`'s storage seam needs no caller change.
pub struct RateLimitEngine {
    rules: Mutex<Vec<CompiledRule>>,
    buckets: Mutex<AHashMap<(uuid::Uuid, String), Window>>,
}

pub struct RateLimitContext<'a> {
    pub path: &'a str,
    pub method: &'a str,
    pub user_id: Option<&'a str>,
    pub client_ip: &'a str,
    pub matched_route_id: Option<uuid::Uuid>,
}

impl RateLimitEngine {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            buckets: Mutex::new(AHashMap::default()),
        }
    }

    pub async fn set_rules(&self, rules: Vec<RateLimitRule>) {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let pattern = match &rule.pattern {
                Some(p) => CompiledPattern::compile(p).ok(),
                None => None,
            };
            compiled.push(CompiledRule { rule, pattern });
        }
        *self.rules.lock().await = compiled;
    }

    pub async fn list(&self) -> Vec<RateLimitRule> {
        self.rules.lock().await.iter().map(|c| c.rule.clone()).collect()
    }

    pub async fn get(&self, id: Uuid) -> Option<RateLimitRule> {
        self.rules.lock().await.iter().find(|c| c.rule.id == id).map(|c| c.rule.clone())
    }

    pub async fn create(&self, input: CreateRateLimitRule) -> Result<RateLimitRule, RateLimitRuleError> {
        let now = Utc::now();
        let rule = RateLimitRule {
            id: Uuid::new_v4(),
            name: input.name,
            scope: input.scope,
            pattern: input.pattern,
            max_requests: input.max_requests,
            window_seconds: input.window_seconds,
            active: true,
            created_at: now,
            updated_at: now,
        };
        rule.validate().map_err(RateLimitRuleError::Invalid)?;

        let pattern = match &rule.pattern {
            Some(p) => Some(CompiledPattern::compile(p).map_err(|e| RateLimitRuleError::Invalid(e.to_string()))?),
            None => None,
        };

        let mut rules = self.rules.lock().await;
        if rules.iter().any(|c| c.rule.name == rule.name) {
            return Err(RateLimitRuleError::DuplicateName);
        }
        rules.push(CompiledRule { rule: rule.clone(), pattern });
        Ok(rule)
    }

    pub async fn update(&self, id: Uuid, patch: UpdateRateLimitRule) -> Result<RateLimitRule, RateLimitRuleError> {
        let mut rules = self.rules.lock().await;
        let idx = rules
            .iter()
            .position(|c| c.rule.id == id)
            .ok_or(RateLimitRuleError::NoSuchRule(id))?;

        let mut rule = rules[idx].rule.clone();
        if let Some(name) = patch.name {
            if rules.iter().enumerate().any(|(i, c)| i != idx && c.rule.name == name) {
                return Err(RateLimitRuleError::DuplicateName);
            }
            rule.name = name;
        }
        if let Some(v) = patch.scope {
            rule.scope = v;
        }
        if let Some(v) = patch.pattern {
            rule.pattern = v;
        }
        if let Some(v) = patch.max_requests {
            rule.max_requests = v;
        }
        if let Some(v) = patch.window_seconds {
            rule.window_seconds = v;
        }
        if let Some(v) = patch.active {
            rule.active = v;
        }
        rule.updated_at = Utc::now();
        rule.validate().map_err(RateLimitRuleError::Invalid)?;

        let pattern = match &rule.pattern {
            Some(p) => Some(CompiledPattern::compile(p).map_err(|e| RateLimitRuleError::Invalid(e.to_string()))?),
            None => None,
        };
        rules[idx] = CompiledRule { rule: rule.clone(), pattern };
        Ok(rule)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), RateLimitRuleError> {
        let mut rules = self.rules.lock().await;
        let before = rules.len();
        rules.retain(|c| c.rule.id != id);
        if rules.len() == before {
            return Err(RateLimitRuleError::NoSuchRule(id));
        }
        Ok(())
    }

    fn bucket_key(scope: RateLimitScope, ctx: &RateLimitContext) -> Option<String> {
        match scope {
            RateLimitScope::PerUser => ctx.user_id.map(|u| u.to_string()),
            RateLimitScope::PerIp => Some(ctx.client_ip.to_string()),
            RateLimitScope::PerEndpoint => Some(
                ctx.matched_route_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| ctx.path.to_string()),
            ),
            RateLimitScope::Global => Some("*".to_string()),
        }
    }

    fn selects(rule: &CompiledRule, ctx: &RateLimitContext) -> bool {
        if !rule.rule.active {
            return false;
        }
        match &rule.pattern {
            Some(p) => p.matches(ctx.path),
            None => true,
        }
    }

    /// Evaluates the current rule set against a request, per the §4.4 contract.
    pub async fn evaluate(&self, ctx: RateLimitContext<'_>, now_unix: i64) -> Verdict {
        let rules = self.rules.lock().await;
        let now_secs = now_unix.max(0) as u64;

        let mut selections: Vec<(&CompiledRule, String)> = Vec::new();
        for rule in rules.iter() {
            if !Self::selects(rule, &ctx) {
                continue;
            }
            if let Some(key) = Self::bucket_key(rule.rule.scope, &ctx) {
                selections.push((rule, key));
            }
        }

        if selections.is_empty() {
            return Verdict::Allow(None);
        }

        let mut buckets = self.buckets.lock().await;
        let mut tightest: Option<MeterSnapshot> = None;
        let mut denied = false;

        for (rule, key) in &selections {
            let window = buckets
                .entry((rule.rule.id, key.clone()))
                .or_insert_with(|| Window::new(now_secs));
            window.roll_if_needed(now_secs, rule.rule.window_seconds);

            let projected = window.weighted_count(now_secs, rule.rule.window_seconds) + 1.0;
            let over_budget = projected > rule.rule.max_requests as f64;

            let reset_at = (window.current_start_secs + rule.rule.window_seconds) as i64;
            let remaining = if over_budget {
                0
            } else {
                rule.rule.max_requests.saturating_sub(window.current_count + 1)
            };

            let snapshot = MeterSnapshot {
                rule_name: rule.rule.name.clone(),
                limit: rule.rule.max_requests,
                remaining,
                reset_at_unix: reset_at,
            };

            let tighter = match &tightest {
                None => true,
                Some(t) => snapshot.remaining < t.remaining,
            };
            if tighter {
                tightest = Some(snapshot);
            }
            if over_budget {
                denied = true;
            }
        }

        if denied {
            return Verdict::Deny(tightest.expect("at least one selected rule"));
        }

        // Commit: increment every selected bucket now that all passed.
        for (rule, key) in &selections {
            if let Some(window) = buckets.get_mut(&(rule.rule.id, key.clone())) {
                window.current_count += 1;
            }
        }

        Verdict::Allow(tightest)
    }
}

impl Default for RateLimitEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn rule(name: &str, scope: RateLimitScope, max: u64, window: u64) -> RateLimitRule {
        let now = Utc::now();
        RateLimitRule {
            id: Uuid::new_v4(),
            name: name.to_string(),
            scope,
            pattern: Some("/api/v1/*".to_string()),
            max_requests: max,
            window_seconds: window,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn allows_up_to_max_then_denies() {
        let engine = RateLimitEngine::new();
        engine.set_rules(vec![rule("ip-limit", RateLimitScope::PerIp, 5, 60)]).await;

        let now = Utc::now().timestamp();
        for _ in 0..5 {
            let ctx = RateLimitContext {
                path: "/api/v1/content/items",
                method: "GET",
                user_id: None,
                client_ip: "1.2.3.4",
                matched_route_id: None,
            };
            assert!(matches!(engine.evaluate(ctx, now).await, Verdict::Allow(_)));
        }

        let ctx = RateLimitContext {
            path: "/api/v1/content/items",
            method: "GET",
            user_id: None,
            client_ip: "1.2.3.4",
            matched_route_id: None,
        };
        assert!(matches!(engine.evaluate(ctx, now).await, Verdict::Deny(_)));
    }

    #[tokio::test]
    async fn denial_does_not_consume_other_bucket() {
        let engine = RateLimitEngine::new();
        engine
            .set_rules(vec![
                rule("tight", RateLimitScope::PerIp, 1, 60),
                rule("loose", RateLimitScope::Global, 1000, 60),
            ])
            .await;
        let now = Utc::now().timestamp();

        let ctx = |ip: &'static str| RateLimitContext {
            path: "/api/v1/content/items",
            method: "GET",
            user_id: None,
            client_ip: ip,
            matched_route_id: None,
        };

        assert!(matches!(engine.evaluate(ctx("1.2.3.4"), now).await, Verdict::Allow(_)));
        assert!(matches!(engine.evaluate(ctx("1.2.3.4"), now).await, Verdict::Deny(_)));

        // the global rule's bucket must not have been incremented by the denied request
        let ctx2 = ctx("5.6.7.8");
        assert!(matches!(engine.evaluate(ctx2, now).await, Verdict::Allow(_)));
    }

    #[tokio::test]
    async fn per_user_rule_skipped_when_unauthenticated() {
        let engine = RateLimitEngine::new();
        engine.set_rules(vec![rule("user-limit", RateLimitScope::PerUser, 1, 60)]).await;
        let now = Utc::now().timestamp();

        let ctx = RateLimitContext {
            path: "/api/v1/content/items",
            method: "GET",
            user_id: None,
            client_ip: "1.2.3.4",
            matched_route_id: None,
        };
        assert!(matches!(engine.evaluate(ctx, now).await, Verdict::Allow(None)));
    }
}
