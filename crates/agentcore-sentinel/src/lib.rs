//! Trigger Engine, Heartbeat Monitor, and Self-Healing Engine (§4.13–§4.15) —
//! the background processes that decide when an agent should think without
//! being asked, notice when one has gone quiet, and diagnose/repair a
//! misbehaving agent's own configuration.

pub mod config;
pub mod healing;
pub mod heartbeat;
pub mod trigger;

pub use config::{HealingConfig, HeartbeatMonitorConfig, SentinelConfig, TriggerConfig};
pub use healing::{
    ConfigBackup, Diagnosis, ErrorPattern, FixProposal, FixType, HealingLog, HealingOutcome,
    HealingSeverity, HealingStatus, Regression, SelfHealingEngine, Trend,
};
pub use heartbeat::HeartbeatMonitor;
pub use trigger::{SelfPrompt, SelfPromptStatus, TriggerEngine, TriggerKind};
