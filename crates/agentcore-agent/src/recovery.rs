//! Recovery Strategies (§4.4) — wraps tool execution with retry,
//! param-adjustment, and alternative-tool fallback, backed by the
//! Idempotency Cache and Error Analyzer.

use crate::error_analyzer::{self, ErrorAnalysis, RecoveryStrategyKind};
use crate::idempotency::{canonical_key, DuplicateCheck, IdempotencyCache};
use agentcore_core::AgentId;
use agentcore_tools::{is_side_effect_tool, remap_params, ToolRegistry, ToolResult};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const TOTAL_ATTEMPT_CAP: u32 = 3;

#[derive(Debug, Clone)]
pub struct RecoveryTrail {
    pub strategy: String,
    pub attempts: u32,
    pub analysis: Option<ErrorAnalysis>,
}

pub enum Outcome {
    Success {
        result: ToolResult,
        cached: bool,
        trail: Option<RecoveryTrail>,
    },
    Exhausted {
        total_attempts: u32,
        original_error: String,
    },
}

/// Wraps `ToolRegistry::execute` with the recovery sequence from §4.4.
pub struct RecoveryStrategies<'a> {
    registry: &'a ToolRegistry,
    idempotency: &'a IdempotencyCache,
}

impl<'a> RecoveryStrategies<'a> {
    pub fn new(registry: &'a ToolRegistry, idempotency: &'a IdempotencyCache) -> Self {
        Self {
            registry,
            idempotency,
        }
    }

    pub async fn execute(
        &self,
        agent_id: AgentId,
        tool_id: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> Outcome {
        let side_effect = is_side_effect_tool(tool_id);
        let key = canonical_key(agent_id, tool_id, &params);

        // Step 1: atomically consult-and-reserve the idempotency cache for
        // side-effect tools. Must be one atomic step, not check-then-insert,
        // so two concurrent retries of the same call can't both slip through.
        if side_effect {
            match self.idempotency.check_duplicate_and_reserve(&key) {
                DuplicateCheck::Completed(result) => {
                    return Outcome::Success {
                        result: ToolResult::Json(serde_json::json!({
                            "cached": true,
                            "result": result,
                        })),
                        cached: true,
                        trail: None,
                    };
                }
                DuplicateCheck::Pending => {
                    return Outcome::Success {
                        result: ToolResult::text(format!("{tool_id} is already in progress")),
                        cached: true,
                        trail: None,
                    };
                }
                DuplicateCheck::None => {}
            }
        }

        let alternatives: Vec<String> = self
            .registry
            .get(tool_id)
            .map(|t| t.alternatives().iter().map(|s| s.to_string()).collect())
            .unwrap_or_default();

        let mut attempts = 0u32;
        let mut current_tool = tool_id.to_string();
        let mut current_params = params.clone();
        let mut last_error = String::new();

        while attempts < TOTAL_ATTEMPT_CAP {
            attempts += 1;
            let result = self
                .registry
                .execute_cancellable(&current_tool, current_params.clone(), cancel.clone())
                .await;

            match result {
                ToolResult::Error(err) => {
                    last_error = err.clone();
                    let analysis = error_analyzer::analyze(&err, &alternatives);
                    if !analysis.recoverable || attempts >= TOTAL_ATTEMPT_CAP {
                        break;
                    }
                    match analysis.strategy {
                        RecoveryStrategyKind::RetryBackoff | RecoveryStrategyKind::RetryDelay => {
                            if let Some(cfg) = &analysis.retry_config {
                                tokio::time::sleep(Duration::from_millis(cfg.base_delay_ms)).await;
                            }
                            // retry same tool/params
                        }
                        RecoveryStrategyKind::AdjustParams => {
                            if let Some(adjusted) = error_analyzer::adjust_params(&current_params) {
                                current_params = adjusted;
                            } else {
                                break;
                            }
                        }
                        RecoveryStrategyKind::TryAlternative => {
                            if let Some(alt) = analysis.alternatives.first() {
                                current_params = remap_params(&current_tool, alt, &current_params);
                                current_tool = alt.clone();
                            } else {
                                break;
                            }
                        }
                        RecoveryStrategyKind::Escalate | RecoveryStrategyKind::FailGraceful => {
                            return Outcome::Exhausted {
                                total_attempts: attempts,
                                original_error: err,
                            };
                        }
                    }
                }
                success => {
                    if side_effect {
                        self.idempotency
                            .record_complete(&key, success.to_content_string());
                    }
                    let trail = if attempts > 1 {
                        Some(RecoveryTrail {
                            strategy: "recovered".to_string(),
                            attempts,
                            analysis: None,
                        })
                    } else {
                        None
                    };
                    return Outcome::Success {
                        result: success,
                        cached: false,
                        trail,
                    };
                }
            }
        }

        Outcome::Exhausted {
            total_attempts: attempts,
            original_error: last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_tools::{Tool, ToolCategory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FlakyTool {
        fail_times: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "searchWeb"
        }
        fn description(&self) -> &str {
            "flaky search"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({})
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Observation
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            let remaining = self.fail_times.fetch_sub(1, Ordering::SeqCst);
            if remaining > 0 {
                ToolResult::Error("fetch failed: ECONNRESET".to_string())
            } else {
                ToolResult::text("ok")
            }
        }
    }

    #[tokio::test]
    async fn network_error_retries_with_backoff_and_succeeds() {
        let mut registry = ToolRegistry::new();
        registry.register(FlakyTool {
            fail_times: Arc::new(AtomicUsize::new(1)),
        });
        let idempotency = IdempotencyCache::new();
        let recovery = RecoveryStrategies::new(&registry, &idempotency);

        let outcome = recovery
            .execute(
                AgentId::new(),
                "searchWeb",
                serde_json::json!({}),
                CancellationToken::new(),
            )
            .await;

        match outcome {
            Outcome::Success { result, trail, .. } => {
                assert!(!result.is_error());
                assert_eq!(trail.unwrap().attempts, 2);
            }
            Outcome::Exhausted { .. } => panic!("expected recovery to succeed"),
        }
    }

    #[tokio::test]
    async fn duplicate_side_effect_call_returns_cached_result() {
        let mut registry = ToolRegistry::new();
        struct AlwaysOk;
        #[async_trait::async_trait]
        impl Tool for AlwaysOk {
            fn name(&self) -> &str {
                "sendWhatsApp"
            }
            fn description(&self) -> &str {
                "send"
            }
            fn input_schema(&self) -> Value {
                serde_json::json!({})
            }
            fn is_side_effect(&self) -> bool {
                true
            }
            async fn execute(&self, _args: Value) -> ToolResult {
                ToolResult::text("sent")
            }
        }
        registry.register(AlwaysOk);
        let idempotency = IdempotencyCache::new();
        let recovery = RecoveryStrategies::new(&registry, &idempotency);
        let agent = AgentId::new();
        let params = serde_json::json!({"to": "+62", "message": "hi"});

        let first = recovery
            .execute(agent, "sendWhatsApp", params.clone(), CancellationToken::new())
            .await;
        assert!(matches!(first, Outcome::Success { cached: false, .. }));

        let second = recovery
            .execute(agent, "sendWhatsApp", params, CancellationToken::new())
            .await;
        assert!(matches!(second, Outcome::Success { cached: true, .. }));
    }
}
