//! Hook Registry (§4.2) — named, priority-ordered async extension points.
//!
//! Grounded on `agentcore_tools::ToolRegistry`'s `HashMap<String, ...>` shape,
//! generalized to one vector of handlers per event name, kept sorted by
//! priority on registration. A handler's return value, if non-null, replaces
//! the context passed to the next handler — modeled as a pure
//! `(ctx) -> Option<ctx>` function rather than shared mutable state (§9).

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::warn;

pub type HookContext = Value;
pub type HookFn = Arc<dyn Fn(HookContext) -> BoxFuture<'static, Option<HookContext>> + Send + Sync>;

const MAX_HANDLERS_PER_EVENT: usize = 20;
const HANDLER_TIMEOUT: Duration = Duration::from_secs(5);

struct Handler {
    name: String,
    priority: i32,
    handler: HookFn,
}

/// Priority-ordered, timeout-bounded async extension points (§4.2).
#[derive(Default)]
pub struct HookRegistry {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
    error_counters: HashMap<String, AtomicU64>,
    counters_lock: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Handlers sharing `name` for the same `event`
    /// replace each other (no duplicates). Refuses beyond
    /// `MAX_HANDLERS_PER_EVENT` (logged, not an error — matches the
    /// source's "refused, logged" behavior).
    pub fn register(
        &self,
        event: impl Into<String>,
        name: impl Into<String>,
        priority: i32,
        handler: HookFn,
    ) -> bool {
        let event = event.into();
        let name = name.into();
        let mut guard = self.handlers.write().expect("hook registry lock poisoned");
        let bucket = guard.entry(event.clone()).or_default();
        bucket.retain(|h| h.name != name);
        if bucket.len() >= MAX_HANDLERS_PER_EVENT {
            warn!(event = %event, name = %name, "hook registration refused: event at capacity");
            return false;
        }
        bucket.push(Handler {
            name,
            priority,
            handler,
        });
        bucket.sort_by_key(|h| h.priority);
        true
    }

    pub fn unregister(&self, event: &str, name: &str) -> bool {
        let mut guard = self.handlers.write().expect("hook registry lock poisoned");
        if let Some(bucket) = guard.get_mut(event) {
            let before = bucket.len();
            bucket.retain(|h| h.name != name);
            return bucket.len() != before;
        }
        false
    }

    fn counter(&self, event: &str) -> Arc<AtomicU64> {
        if let Some(c) = self.counters_lock.read().unwrap().get(event) {
            return c.clone();
        }
        let mut guard = self.counters_lock.write().unwrap();
        guard
            .entry(event.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }

    pub fn error_count(&self, event: &str) -> u64 {
        self.counters_lock
            .read()
            .unwrap()
            .get(event)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Run handlers in ascending priority order, sequentially, threading the
    /// evolving context through. Timeouts and handler panics/errors are
    /// caught and counted, never abort the sequence (§4.2, §7).
    pub async fn emit(&self, event: &str, ctx: HookContext) -> HookContext {
        let handlers: Vec<(String, HookFn)> = {
            let guard = self.handlers.read().expect("hook registry lock poisoned");
            guard
                .get(event)
                .map(|v| v.iter().map(|h| (h.name.clone(), h.handler.clone())).collect())
                .unwrap_or_default()
        };

        let mut current = ctx;
        for (name, handler) in handlers {
            match tokio::time::timeout(HANDLER_TIMEOUT, handler(current.clone())).await {
                Ok(Some(next)) => current = next,
                Ok(None) => {}
                Err(_) => {
                    warn!(event = %event, handler = %name, "hook handler timed out");
                    self.counter(event).fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        current
    }

    /// Fire-and-forget variant. Must never propagate: errors/timeouts are
    /// swallowed the same as `emit`, and the call itself does not block the
    /// caller beyond spawning the task.
    pub fn emit_async(self: &Arc<Self>, event: impl Into<String>, ctx: HookContext) {
        let this = self.clone();
        let event = event.into();
        tokio::spawn(async move {
            this.emit(&event, ctx).await;
        });
    }
}
