//! The per-request [`InvocationContext`] (spec §3, §5).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::VmcpError;
use crate::ids::VmcpId;

/// Default end-to-end deadline (spec §5).
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(120);

/// Default template recursion bound (spec §4.4).
pub const DEFAULT_TEMPLATE_MAX_DEPTH: usize = 8;

/// One environment variable binding. `secret` mirrors the vMCP's
/// `Environment Variables (name -> value, optionally secret)` field (spec
/// §3); secret values must never be echoed back (§4.6, §8 property 7).
#[derive(Debug, Clone)]
pub struct EnvValue {
    pub value: String,
    pub secret: bool,
}

/// An immutable environment map, frozen once into an [`InvocationContext`]
/// (spec §4.6 "Environment binding").
#[derive(Debug, Clone, Default)]
pub struct EnvMap(Arc<HashMap<String, EnvValue>>);

impl EnvMap {
    pub fn new(vars: HashMap<String, EnvValue>) -> Self {
        Self(Arc::new(vars))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.value.as_str())
    }

    /// All values flagged secret, for redaction before errors/logs leave
    /// the composer (spec §4.6, §8 property 7).
    pub fn secret_values(&self) -> Vec<String> {
        self.0
            .values()
            .filter(|v| v.secret)
            .map(|v| v.value.clone())
            .collect()
    }

    /// Merge vMCP-level defaults with request-supplied overrides; overrides
    /// win (spec §4.6).
    pub fn merge_overrides(&self, overrides: &HashMap<String, String>) -> Self {
        let mut merged = (*self.0).clone();
        for (k, v) in overrides {
            let secret = merged.get(k).map(|existing| existing.secret).unwrap_or(false);
            merged.insert(
                k.clone(),
                EnvValue {
                    value: v.clone(),
                    secret,
                },
            );
        }
        Self(Arc::new(merged))
    }
}

/// The kind of nested template invocation a memo-cache entry covers (spec
/// §4.4: `(kind, name, canonical_args_json)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NestedKind {
    Tool,
    Prompt,
}

/// A request-scoped memoization cache: nested `@tool`/`@prompt` results
/// keyed by `(kind, name, canonical_args)`, and `@resource` reads keyed by
/// canonical URI (SPEC_FULL Open Question 2: shared across the whole
/// request, not just one expression). Private to one [`InvocationContext`]
/// — no external synchronization needed (spec §5).
#[derive(Debug, Default)]
pub struct MemoCache {
    calls: DashMap<(NestedKind, String, String), String>,
    resources: DashMap<String, String>,
}

impl MemoCache {
    pub fn get_call(&self, kind: NestedKind, name: &str, canonical_args: &str) -> Option<String> {
        self.calls
            .get(&(kind, name.to_string(), canonical_args.to_string()))
            .map(|v| v.clone())
    }

    pub fn put_call(&self, kind: NestedKind, name: &str, canonical_args: &str, rendered: String) {
        self.calls
            .insert((kind, name.to_string(), canonical_args.to_string()), rendered);
    }

    pub fn get_resource(&self, uri: &str) -> Option<String> {
        self.resources.get(uri).map(|v| v.clone())
    }

    pub fn put_resource(&self, uri: &str, rendered: String) {
        self.resources.insert(uri.to_string(), rendered);
    }
}

/// A recursion-depth guard: increments on creation, decrements on drop.
/// Exceeding `max_depth` fails before the guard is created (spec §4.4, §8
/// property 6 — no stack exhaustion possible since the counter is checked
/// up front, not discovered via a stack overflow).
pub struct DepthGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> Drop for DepthGuard<'a> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bundle threaded through one inbound MCP call (spec §3 "Invocation
/// Context").
pub struct InvocationContext {
    pub vmcp_id: VmcpId,
    pub env: EnvMap,
    pub deadline: Instant,
    pub cancellation: CancellationToken,
    pub max_depth: usize,
    depth: AtomicUsize,
    pub memo: MemoCache,
}

impl InvocationContext {
    pub fn new(vmcp_id: VmcpId, env: EnvMap, request_deadline: Duration, max_depth: usize) -> Self {
        Self {
            vmcp_id,
            env,
            deadline: Instant::now() + request_deadline,
            cancellation: CancellationToken::new(),
            max_depth,
            depth: AtomicUsize::new(0),
            memo: MemoCache::default(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn time_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Enter one level of nested template evaluation. Fails with
    /// `TemplateRecursion` once `max_depth` would be exceeded (spec §4.4).
    pub fn enter_nested(&self, location: &str) -> Result<DepthGuard<'_>, VmcpError> {
        let previous = self.depth.fetch_add(1, Ordering::AcqRel);
        if previous >= self.max_depth {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(VmcpError::TemplateRecursion {
                max_depth: self.max_depth,
                location: location.to_string(),
            });
        }
        Ok(DepthGuard { counter: &self.depth })
    }

    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(max_depth: usize) -> InvocationContext {
        InvocationContext::new(
            VmcpId::new("v1"),
            EnvMap::default(),
            DEFAULT_REQUEST_DEADLINE,
            max_depth,
        )
    }

    #[test]
    fn recursion_bound_trips_at_max_depth() {
        let c = ctx(2);
        let g1 = c.enter_nested("a").unwrap();
        let g2 = c.enter_nested("b").unwrap();
        assert!(c.enter_nested("c").is_err());
        drop(g2);
        drop(g1);
        assert_eq!(c.current_depth(), 0);
    }

    #[test]
    fn memo_cache_round_trips_calls_and_resources() {
        let memo = MemoCache::default();
        assert!(memo.get_call(NestedKind::Tool, "search", "{}").is_none());
        memo.put_call(NestedKind::Tool, "search", "{}", "X,Y,Z".to_string());
        assert_eq!(
            memo.get_call(NestedKind::Tool, "search", "{}"),
            Some("X,Y,Z".to_string())
        );

        memo.put_resource("file:///a.txt", "hello".to_string());
        assert_eq!(memo.get_resource("file:///a.txt"), Some("hello".to_string()));
    }

    #[test]
    fn env_override_wins_and_preserves_secret_flag() {
        let mut vars = HashMap::new();
        vars.insert(
            "API_KEY".to_string(),
            EnvValue {
                value: "s3cr3t".to_string(),
                secret: true,
            },
        );
        let env = EnvMap::new(vars);
        let mut overrides = HashMap::new();
        overrides.insert("API_KEY".to_string(), "other".to_string());
        let merged = env.merge_overrides(&overrides);
        assert_eq!(merged.get("API_KEY"), Some("other"));
        assert_eq!(merged.secret_values(), vec!["other".to_string()]);
    }
}
