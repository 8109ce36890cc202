//! Agenticlaw LLM - Provider adapters with streaming support

pub mod anthropic;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use provider::LlmProvider;
pub use types::*;
