//! Error taxonomy shared across the core.
//!
//! Tool-level failures are recovered locally by Recovery Strategies and only
//! surface as `Error::Tool` once every attempt is exhausted (see
//! `agentcore_agent::recovery`). Everything else here terminates the current
//! operation with a structured result rather than an exception.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    #[error("network error")]
    Network,
    #[error("timeout")]
    Timeout,
    #[error("rate limited")]
    RateLimit,
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    Permission,
    #[error("validation error")]
    Validation,
    #[error("internal error")]
    Internal,
    #[error("unknown error")]
    Unknown,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("capacity timeout after {0:?}")]
    CapacityTimeout(std::time::Duration),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("cancelled")]
    Cancelled,

    #[error("tool error ({kind}): {message}")]
    Tool {
        kind: ToolErrorKind,
        message: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("llm error: {provider} - {message}")]
    Llm { provider: String, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn policy_violation(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    pub fn budget_exceeded(msg: impl Into<String>) -> Self {
        Self::BudgetExceeded(msg.into())
    }

    pub fn tool(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self::Tool {
            kind,
            message: message.into(),
        }
    }

    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Llm {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error represents a condition Recovery Strategies should
    /// never retry (policy/access/input errors are terminal by construction).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::AccessDenied(_)
                | Error::PolicyViolation(_)
                | Error::Cancelled
        )
    }
}
