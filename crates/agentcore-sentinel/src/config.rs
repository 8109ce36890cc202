//! Sentinel configuration — tunables for the Trigger Engine, Heartbeat
//! Monitor and Self-Healing Engine.
//!
//! Loaded from TOML at startup, falls back to defaults if no config file
//! exists.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level sentinel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub trigger: TriggerConfig,
    pub heartbeat: HeartbeatMonitorConfig,
    pub healing: HealingConfig,
}

/// Trigger Engine scan parameters (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// How often the scanner evaluates all agents.
    pub scan_interval_secs: u64,
    /// Idle duration before `idle_detection` fires.
    pub idle_threshold_secs: u64,
    /// Interval between `reflection_schedule` fires, per agent.
    pub reflection_interval_secs: u64,
    /// Default max self-initiated prompts per hour, per agent (overridable
    /// per `AgentProfile`).
    pub default_max_prompts_per_hour: u32,
    /// Default confidence above which a trigger-spawned prompt is
    /// auto-approved rather than queued for HITL approval.
    pub default_auto_approve_threshold: f64,
}

/// Heartbeat Monitor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatMonitorConfig {
    /// Default heartbeat interval for agents with heartbeats enabled.
    pub default_interval_ms: u64,
    /// Default number of consecutive misses before escalation.
    pub default_escalate_after_misses: u32,
}

/// Self-Healing Engine thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Error rate (errors / total tool calls) over the lookback window
    /// that classifies severity as "medium" or above.
    pub medium_error_rate: f64,
    pub high_error_rate: f64,
    pub critical_error_rate: f64,
    /// Lookback window for error-rate computation.
    pub lookback_secs: u64,
    /// Same tool + error pair occurring at least this many times within
    /// the lookback window is a "recurring pattern" (escalates severity
    /// one level, per §4.12).
    pub recurring_pattern_threshold: u32,
    /// Per-handler timeout for proposing/applying/testing a fix.
    pub fix_step_timeout_secs: u64,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerConfig::default(),
            heartbeat: HeartbeatMonitorConfig::default(),
            healing: HealingConfig::default(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            idle_threshold_secs: 30 * 60,
            reflection_interval_secs: 6 * 60 * 60,
            default_max_prompts_per_hour: 10,
            default_auto_approve_threshold: 0.9,
        }
    }
}

impl Default for HeartbeatMonitorConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 5 * 60 * 1000,
            default_escalate_after_misses: 3,
        }
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            // §4.15 severity thresholds: medium >=30%, high >=50%, critical >=70%.
            medium_error_rate: 0.3,
            high_error_rate: 0.5,
            critical_error_rate: 0.7,
            lookback_secs: 72 * 60 * 60,
            recurring_pattern_threshold: 3,
            fix_step_timeout_secs: 30,
        }
    }
}

impl SentinelConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded sentinel config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}
