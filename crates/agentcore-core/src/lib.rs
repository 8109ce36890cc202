//! agentcore-core — shared error taxonomy, protocol types, entity ids, and
//! the Audit Log.

pub mod audit;
pub mod error;
pub mod ids;
pub mod types;

pub use audit::{AuditCategory, AuditEvent, AuditLog, Direction, InMemoryAuditLog};
pub use error::{Error, Result, ToolErrorKind};
pub use ids::{AgentId, ApprovalId, AutonomyLevel, CheckpointId, HealingId, MemoryId, PlanId, SelfPromptId, UserId};
pub use types::*;
