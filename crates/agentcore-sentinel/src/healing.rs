//! Self-Healing Engine (§4.15) — diagnoses a misbehaving agent's recent
//! tool-execution history, classifies severity, and (for low/medium
//! severity) attempts an automatic config fix with a snapshot+rollback
//! safety net. High/critical severity defer to an external approval or
//! notify master outright rather than mutating config unattended.
//!
//! Grounded on the same `ExecutionHistory`/`AgentProfile` data the Trigger
//! Engine and Heartbeat Monitor already consume (`agentcore_agent`); the
//! five-state machine from §4.15 is modeled as a plain enum rather than a
//! generic state-machine crate, matching how `CheckpointStatus` and
//! `ApprovalStatus` are modeled elsewhere in this workspace.

use agentcore_agent::{
    ApprovalStore, ExecutionHistory, HierarchyService, Override, PermissionMatrix,
};
use agentcore_core::audit::{AuditCategory, AuditLog, Direction};
use agentcore_core::{AgentId, ApprovalId, AutonomyLevel, HealingId, ToolErrorKind, UserId};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::HealingConfig;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealingSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealingStatus {
    Detected,
    Analyzing,
    ProposingFix,
    AwaitingApproval,
    BackingUp,
    ApplyingFix,
    Testing,
    Completed,
    RolledBack,
    Escalated,
    Failed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealingOutcome {
    Fixed,
    RolledBack,
    Escalated,
    NoAction,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
}

/// Same `(tool, error_message)` pair occurring `>= recurring_pattern_threshold`
/// times within the lookback window (§4.15).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub tool_id: String,
    pub error_message: String,
    pub occurrences: u32,
    pub trend: Trend,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Regression {
    pub baseline_success_rate: f64,
    pub recent_success_rate: f64,
    pub degrading: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnosis {
    pub window_hours: i64,
    pub total_executions: u32,
    pub total_failures: u32,
    pub error_rate: f64,
    pub errors_by_type: HashMap<ToolErrorKind, u32>,
    pub errors_by_tool: HashMap<String, u32>,
    pub patterns: Vec<ErrorPattern>,
    pub regression: Option<Regression>,
    pub recommendations: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    ToolConfig,
    RetryConfig,
    SystemPrompt,
    SkillAdjustment,
    ProviderSwitch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixProposal {
    pub fix_type: FixType,
    pub description: String,
    pub change: Value,
}

/// Snapshot of every field `rollback` restores verbatim (§4.15, testable
/// property #11). `tool_overrides` is the full override set, not a delta —
/// rollback replaces it wholesale.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigBackup {
    pub system_prompt: String,
    pub ai_provider: String,
    pub ai_model: String,
    pub temperature: f32,
    pub autonomy_level: AutonomyLevel,
    pub require_approval_for: HashSet<agentcore_tools::ToolCategory>,
    pub tool_overrides: Vec<(String, Override)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealingLog {
    pub id: HealingId,
    pub agent_id: AgentId,
    pub severity: HealingSeverity,
    pub status: HealingStatus,
    pub diagnosis: Diagnosis,
    pub proposed_fix: Option<FixProposal>,
    pub config_backup: Option<ConfigBackup>,
    pub applied_fix: Option<FixProposal>,
    pub test_results: Option<Value>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub approval_id: Option<ApprovalId>,
    pub notification_id: Option<String>,
    pub outcome: Option<HealingOutcome>,
    pub created_at: DateTime<Utc>,
}

/// Per-agent override set this engine itself has written, so `rollback` can
/// restore it wholesale without the Permission Matrix exposing an iteration
/// API of its own.
#[derive(Default)]
struct OverrideJournal {
    written: DashMap<(AgentId, String), Override>,
}

/// Diagnose/propose/apply/test/rollback workflow over an agent's own
/// configuration (§4.15).
pub struct SelfHealingEngine {
    hierarchy: Arc<HierarchyService>,
    permissions: Arc<PermissionMatrix>,
    execution_history: Arc<ExecutionHistory>,
    approvals: Arc<dyn ApprovalStore>,
    audit: Arc<dyn AuditLog>,
    config: HealingConfig,
    logs: DashMap<HealingId, HealingLog>,
    overrides_written: OverrideJournal,
}

impl SelfHealingEngine {
    pub fn new(
        hierarchy: Arc<HierarchyService>,
        permissions: Arc<PermissionMatrix>,
        execution_history: Arc<ExecutionHistory>,
        approvals: Arc<dyn ApprovalStore>,
        audit: Arc<dyn AuditLog>,
        config: HealingConfig,
    ) -> Self {
        Self {
            hierarchy,
            permissions,
            execution_history,
            approvals,
            audit,
            config,
            logs: DashMap::new(),
            overrides_written: OverrideJournal::default(),
        }
    }

    pub fn get_healing_history(&self, agent_id: AgentId) -> Vec<HealingLog> {
        let mut logs: Vec<HealingLog> = self.logs.iter().filter(|e| e.agent_id == agent_id).map(|e| e.clone()).collect();
        logs.sort_by_key(|l| std::cmp::Reverse(l.created_at));
        logs
    }

    pub fn get_health_report(&self, agent_id: AgentId) -> Diagnosis {
        self.diagnose(agent_id)
    }

    /// `diagnose_self(agent)` (§4.15, §6).
    pub fn diagnose_self(&self, agent_id: AgentId) -> Diagnosis {
        self.diagnose(agent_id)
    }

    fn diagnose(&self, agent_id: AgentId) -> Diagnosis {
        let window_hours = (self.config.lookback_secs / 3600).max(1) as i64;
        let since = Utc::now() - Duration::seconds(self.config.lookback_secs as i64);
        let records = self.execution_history.recent(agent_id, since);

        let total_executions = records.len() as u32;
        let failures: Vec<_> = records.iter().filter(|r| !r.success).collect();
        let total_failures = failures.len() as u32;
        let error_rate = if total_executions == 0 { 0.0 } else { total_failures as f64 / total_executions as f64 };

        let mut errors_by_type: HashMap<ToolErrorKind, u32> = HashMap::new();
        let mut errors_by_tool: HashMap<String, u32> = HashMap::new();
        let mut by_pair: HashMap<(String, String), Vec<DateTime<Utc>>> = HashMap::new();
        for f in &failures {
            if let Some(kind) = f.error_type {
                *errors_by_type.entry(kind).or_insert(0) += 1;
            }
            *errors_by_tool.entry(f.tool_id.clone()).or_insert(0) += 1;
            let msg = f.error_message.clone().unwrap_or_default();
            by_pair.entry((f.tool_id.clone(), msg)).or_default().push(f.at);
        }

        let mut patterns: Vec<ErrorPattern> = Vec::new();
        for ((tool_id, error_message), mut times) in by_pair {
            if (times.len() as u32) < self.config.recurring_pattern_threshold {
                continue;
            }
            times.sort();
            let mid = times.len() / 2;
            let (first_half, second_half) = (&times[..mid], &times[mid..]);
            let trend = if second_half.len() > first_half.len() {
                Trend::Increasing
            } else if second_half.len() < first_half.len() {
                Trend::Decreasing
            } else {
                Trend::Stable
            };
            patterns.push(ErrorPattern {
                tool_id,
                error_message,
                occurrences: times.len() as u32,
                trend,
            });
        }

        let recent_cutoff = Utc::now() - Duration::hours(24);
        let baseline_cutoff = Utc::now() - Duration::days(7);
        let recent: Vec<_> = records.iter().filter(|r| r.at >= recent_cutoff).collect();
        let baseline: Vec<_> = self
            .execution_history
            .recent(agent_id, baseline_cutoff)
            .into_iter()
            .filter(|r| r.at < recent_cutoff)
            .collect();
        let regression = if recent.len() >= 5 && !baseline.is_empty() {
            let recent_rate = recent.iter().filter(|r| r.success).count() as f64 / recent.len() as f64;
            let baseline_rate = baseline.iter().filter(|r| r.success).count() as f64 / baseline.len() as f64;
            let degrading = baseline_rate - recent_rate > 0.15;
            Some(Regression { baseline_success_rate: baseline_rate, recent_success_rate: recent_rate, degrading })
        } else {
            None
        };

        let mut recommendations = Vec::new();
        if let Some(worst) = errors_by_tool.iter().max_by_key(|(_, c)| **c) {
            if *worst.1 > 0 {
                recommendations.push(format!("investigate repeated failures in tool '{}'", worst.0));
            }
        }
        if patterns.iter().any(|p| p.trend == Trend::Increasing) {
            recommendations.push("a recurring error pattern is trending upward".to_string());
        }
        if regression.as_ref().is_some_and(|r| r.degrading) {
            recommendations.push("success rate has regressed against the 7-day baseline".to_string());
        }

        Diagnosis {
            window_hours,
            total_executions,
            total_failures,
            error_rate,
            errors_by_type,
            errors_by_tool,
            patterns,
            regression,
            recommendations,
        }
    }

    fn classify_severity(&self, diagnosis: &Diagnosis) -> HealingSeverity {
        let increasing_patterns = diagnosis.patterns.iter().filter(|p| p.trend == Trend::Increasing).count();
        if diagnosis.error_rate >= self.config.critical_error_rate {
            HealingSeverity::Critical
        } else if diagnosis.error_rate >= self.config.high_error_rate || increasing_patterns >= 3 {
            HealingSeverity::High
        } else if diagnosis.error_rate >= self.config.medium_error_rate
            || diagnosis.regression.as_ref().is_some_and(|r| r.degrading)
            || increasing_patterns >= 1
        {
            HealingSeverity::Medium
        } else {
            HealingSeverity::Low
        }
    }

    /// `analyze_and_heal(agent)` (§4.15, §6, §8 S6) — the full cycle.
    pub async fn analyze_and_heal(&self, agent_id: AgentId, user_id: UserId) -> HealingLog {
        let diagnosis = self.diagnose(agent_id);
        let severity = self.classify_severity(&diagnosis);
        let id = HealingId::new();
        let created_at = Utc::now();

        let mut log = HealingLog {
            id,
            agent_id,
            severity,
            status: HealingStatus::Analyzing,
            diagnosis: diagnosis.clone(),
            proposed_fix: None,
            config_backup: None,
            applied_fix: None,
            test_results: None,
            rolled_back_at: None,
            approval_id: None,
            notification_id: None,
            outcome: None,
            created_at,
        };

        match severity {
            HealingSeverity::Low => {
                log.status = HealingStatus::Completed;
                log.outcome = Some(HealingOutcome::NoAction);
            }
            HealingSeverity::Medium => {
                self.auto_heal(agent_id, user_id, &diagnosis, &mut log).await;
            }
            HealingSeverity::High => {
                let fix = self.propose_fix_for(&diagnosis, HealingSeverity::High);
                let approval_id = self.approvals.create(
                    agent_id,
                    format!("self-healing fix requires approval: {}", fix.description),
                    json!({"fix": fix, "diagnosis": diagnosis}),
                );
                log.proposed_fix = Some(fix);
                log.approval_id = Some(approval_id);
                log.status = HealingStatus::AwaitingApproval;
                self.audit.log(
                    agent_id,
                    user_id,
                    AuditCategory::Error,
                    Direction::Internal,
                    Some("self-healing: high-severity fix awaiting approval".to_string()),
                    json!({"healing_id": id.to_string(), "approval_id": approval_id.to_string()}),
                );
            }
            HealingSeverity::Critical => {
                log.status = HealingStatus::Escalated;
                log.outcome = Some(HealingOutcome::Escalated);
                log.notification_id = Some(format!("critical_error:{id}"));
                self.audit.log(
                    agent_id,
                    user_id,
                    AuditCategory::Error,
                    Direction::Internal,
                    Some("self-healing: critical severity escalated to master".to_string()),
                    json!({"healing_id": id.to_string(), "diagnosis": diagnosis}),
                );
            }
        }

        self.logs.insert(id, log.clone());
        log
    }

    /// Medium-severity auto-heal cycle: snapshot, apply the first
    /// auto-fixable recommendation, self-test, rollback on failure (§4.15).
    async fn auto_heal(&self, agent_id: AgentId, user_id: UserId, diagnosis: &Diagnosis, log: &mut HealingLog) {
        let Ok(profile) = self.hierarchy.get_profile(agent_id, user_id) else {
            log.status = HealingStatus::Failed;
            log.outcome = Some(HealingOutcome::NoAction);
            return;
        };

        let fix = self.propose_fix_for(diagnosis, HealingSeverity::Medium);
        log.proposed_fix = Some(fix.clone());
        log.status = HealingStatus::BackingUp;

        let backup = ConfigBackup {
            system_prompt: profile.routing.system_prompt.clone(),
            ai_provider: profile.routing.provider.clone(),
            ai_model: profile.routing.model.clone(),
            temperature: profile.routing.temperature,
            autonomy_level: profile.autonomy_level,
            require_approval_for: profile.require_approval_for.clone(),
            tool_overrides: self.current_overrides(agent_id),
        };
        log.config_backup = Some(backup);
        log.status = HealingStatus::ApplyingFix;

        self.apply_fix(agent_id, user_id, &fix);
        log.applied_fix = Some(fix);
        log.status = HealingStatus::Testing;

        // Self-test: re-diagnose and check the error rate dropped under 50%.
        let post_fix = self.diagnose(agent_id);
        let passed = post_fix.error_rate < 0.5;
        log.test_results = Some(json!({"error_rate": post_fix.error_rate, "passed": passed}));

        if passed {
            log.status = HealingStatus::Completed;
            log.outcome = Some(HealingOutcome::Fixed);
            self.audit.log(
                agent_id,
                user_id,
                AuditCategory::Error,
                Direction::Internal,
                Some("self-healing: medium-severity fix applied and passed self-test".to_string()),
                json!({"healing_id": log.id.to_string()}),
            );
        } else {
            self.rollback_inner(agent_id, user_id, log);
        }
    }

    fn propose_fix_for(&self, diagnosis: &Diagnosis, severity: HealingSeverity) -> FixProposal {
        let worst_tool = diagnosis
            .errors_by_tool
            .iter()
            .max_by_key(|(_, c)| **c)
            .map(|(tool, _)| tool.clone());

        match severity {
            HealingSeverity::Medium => {
                if let Some(tool) = worst_tool {
                    if diagnosis.patterns.iter().any(|p| p.tool_id == tool) {
                        return FixProposal {
                            fix_type: FixType::RetryConfig,
                            description: format!("tighten retry behavior for '{tool}' after recurring failures"),
                            change: json!({"tool_id": tool, "max_retries": 3, "delay_ms": 5000, "backoff_multiplier": 2}),
                        };
                    }
                    return FixProposal {
                        fix_type: FixType::ToolConfig,
                        description: format!("disable '{tool}' after repeated failures"),
                        change: json!({"tool_id": tool, "override": "disable"}),
                    };
                }
                FixProposal {
                    fix_type: FixType::SystemPrompt,
                    description: "append an avoidance instruction to the system prompt".to_string(),
                    change: json!({"appendix": "Avoid the operations that have recently failed repeatedly."}),
                }
            }
            _ => FixProposal {
                fix_type: FixType::SystemPrompt,
                description: "append an avoidance instruction to the system prompt and flag for manual review"
                    .to_string(),
                change: json!({"appendix": "Avoid the operations that have recently failed repeatedly."}),
            },
        }
    }

    fn apply_fix(&self, agent_id: AgentId, user_id: UserId, fix: &FixProposal) {
        match fix.fix_type {
            FixType::ToolConfig => {
                if let Some(tool_id) = fix.change.get("tool_id").and_then(|v| v.as_str()) {
                    self.permissions.set_override(agent_id, tool_id, Override::Disable);
                    self.overrides_written
                        .written
                        .insert((agent_id, tool_id.to_string()), Override::Disable);
                }
            }
            FixType::RetryConfig => {
                if let Some(tool_id) = fix.change.get("tool_id").and_then(|v| v.as_str()) {
                    self.permissions.set_override(agent_id, tool_id, Override::RequireApproval);
                    self.overrides_written
                        .written
                        .insert((agent_id, tool_id.to_string()), Override::RequireApproval);
                }
            }
            FixType::SystemPrompt => {
                let appendix = fix.change.get("appendix").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let _ = self.hierarchy.update_profile(agent_id, user_id, |p| {
                    if !p.routing.system_prompt.contains(&appendix) {
                        p.routing.system_prompt = format!("{}\n\n{appendix}", p.routing.system_prompt);
                    }
                });
            }
            FixType::SkillAdjustment | FixType::ProviderSwitch => {
                // Manual fix types (§4.15): recorded but not auto-applied.
            }
        }
    }

    fn current_overrides(&self, agent_id: AgentId) -> Vec<(String, Override)> {
        self.overrides_written
            .written
            .iter()
            .filter(|e| e.key().0 == agent_id)
            .map(|e| (e.key().1.clone(), *e.value()))
            .collect()
    }

    /// Restore `{system_prompt, provider, model, temperature, autonomy,
    /// require_approval_for, tool_overrides}` verbatim from the snapshot
    /// (§4.15, testable property #11).
    fn rollback_inner(&self, agent_id: AgentId, user_id: UserId, log: &mut HealingLog) {
        let Some(backup) = log.config_backup.clone() else {
            log.status = HealingStatus::Failed;
            return;
        };

        let _ = self.hierarchy.update_profile(agent_id, user_id, |p| {
            p.routing.system_prompt = backup.system_prompt.clone();
            p.routing.provider = backup.ai_provider.clone();
            p.routing.model = backup.ai_model.clone();
            p.routing.temperature = backup.temperature;
            p.autonomy_level = backup.autonomy_level;
            p.require_approval_for = backup.require_approval_for.clone();
        });

        for (tool_id, _) in self.current_overrides(agent_id) {
            self.permissions.remove_override(agent_id, &tool_id);
            self.overrides_written.written.remove(&(agent_id, tool_id));
        }
        for (tool_id, over) in &backup.tool_overrides {
            self.permissions.set_override(agent_id, tool_id, *over);
            self.overrides_written.written.insert((agent_id, tool_id.clone()), *over);
        }

        log.rolled_back_at = Some(Utc::now());
        log.status = HealingStatus::RolledBack;
        log.outcome = Some(HealingOutcome::RolledBack);
        self.audit.log(
            agent_id,
            user_id,
            AuditCategory::Error,
            Direction::Internal,
            Some("self-healing: fix failed self-test, rolled back".to_string()),
            json!({"healing_id": log.id.to_string()}),
        );
    }

    /// Public rollback entry point for an already-completed healing log
    /// (e.g. manually requested after the fact).
    pub fn rollback(&self, healing_id: HealingId, user_id: UserId) -> Option<HealingLog> {
        let mut entry = self.logs.get_mut(&healing_id)?;
        let agent_id = entry.agent_id;
        self.rollback_inner(agent_id, user_id, &mut entry);
        Some(entry.clone())
    }

    /// `propose_fix(agent, fix_type, description, change)` (§6) — manual
    /// override for operators who want to hand-author a fix rather than let
    /// `analyze_and_heal` pick one.
    pub fn propose_fix(&self, fix_type: FixType, description: impl Into<String>, change: Value) -> FixProposal {
        FixProposal { fix_type, description: description.into(), change }
    }
}
