//! Error Analyzer (§4.3) — classifies tool errors and picks a recovery
//! strategy.
//!
//! Classification is ordered, case-insensitive regex over the error text —
//! order matters, since e.g. a rate-limit message can also mention "timeout"
//! in prose. `regex` is already a dependency of `agentcore-tools` (grep); reused
//! here rather than adding a new ecosystem crate for the same job.

use agentcore_core::ToolErrorKind;
use once_cell_style::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

mod once_cell_style {
    use std::sync::OnceLock;

    /// Minimal lazily-initialized static, avoiding a dependency on
    /// `once_cell`/`lazy_static` for a handful of compiled regexes.
    pub struct Lazy<T> {
        cell: OnceLock<T>,
        init: fn() -> T,
    }

    impl<T> Lazy<T> {
        pub const fn new(init: fn() -> T) -> Self {
            Self {
                cell: OnceLock::new(),
                init,
            }
        }
    }

    impl<T> std::ops::Deref for Lazy<T> {
        type Target = T;
        fn deref(&self) -> &T {
            self.cell.get_or_init(self.init)
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecoveryStrategyKind {
    RetryBackoff,
    RetryDelay,
    AdjustParams,
    TryAlternative,
    Escalate,
    FailGraceful,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
}

#[derive(Clone, Debug)]
pub struct ErrorAnalysis {
    pub error_type: ToolErrorKind,
    pub recoverable: bool,
    pub strategy: RecoveryStrategyKind,
    pub alternatives: Vec<String>,
    pub suggestion: String,
    pub retry_config: Option<RetryConfig>,
}

// Ordered classification patterns. First match wins (§4.3).
static RATE_LIMIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)rate.?limit|too many requests|429").unwrap());
static NETWORK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)econnreset|econnrefused|enotfound|fetch failed|network error|socket hang up")
        .unwrap()
});
static TIMEOUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)timed?.?out|etimedout|deadline exceeded").unwrap());
static NOT_FOUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)not found|404|no such|does not exist").unwrap());
static PERMISSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)permission denied|forbidden|403|unauthorized|401").unwrap());
static VALIDATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)invalid|validation|bad request|400|required field").unwrap());
static INTERNAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)internal server error|500|internal error").unwrap());

pub fn classify_error_text(text: &str) -> ToolErrorKind {
    if RATE_LIMIT_RE.is_match(text) {
        ToolErrorKind::RateLimit
    } else if NETWORK_RE.is_match(text) {
        ToolErrorKind::Network
    } else if TIMEOUT_RE.is_match(text) {
        ToolErrorKind::Timeout
    } else if NOT_FOUND_RE.is_match(text) {
        ToolErrorKind::NotFound
    } else if PERMISSION_RE.is_match(text) {
        ToolErrorKind::Permission
    } else if VALIDATION_RE.is_match(text) {
        ToolErrorKind::Validation
    } else if INTERNAL_RE.is_match(text) {
        ToolErrorKind::Internal
    } else {
        ToolErrorKind::Unknown
    }
}

fn retry_config_for(kind: ToolErrorKind) -> Option<RetryConfig> {
    match kind {
        ToolErrorKind::Network => Some(RetryConfig {
            max_retries: 2,
            base_delay_ms: 1000,
            backoff_multiplier: 2,
        }),
        ToolErrorKind::RateLimit => Some(RetryConfig {
            max_retries: 2,
            base_delay_ms: 3000,
            backoff_multiplier: 3,
        }),
        ToolErrorKind::Timeout => Some(RetryConfig {
            max_retries: 1,
            base_delay_ms: 2000,
            backoff_multiplier: 2,
        }),
        ToolErrorKind::Internal => Some(RetryConfig {
            max_retries: 1,
            base_delay_ms: 1500,
            backoff_multiplier: 2,
        }),
        ToolErrorKind::Unknown => Some(RetryConfig {
            max_retries: 1,
            base_delay_ms: 1000,
            backoff_multiplier: 2,
        }),
        ToolErrorKind::NotFound | ToolErrorKind::Validation | ToolErrorKind::Permission => None,
    }
}

/// Classify `(tool_id, error, {agent_id, attempt})` into a full analysis
/// (§4.3). `alternatives` comes from the tool catalogue entry, passed in by
/// the caller since the Error Analyzer has no registry of its own.
pub fn analyze(error_text: &str, alternatives: &[String]) -> ErrorAnalysis {
    let error_type = classify_error_text(error_text);
    let retry_config = retry_config_for(error_type);

    let (recoverable, strategy) = match error_type {
        ToolErrorKind::Network => (true, RecoveryStrategyKind::RetryBackoff),
        ToolErrorKind::RateLimit => (true, RecoveryStrategyKind::RetryBackoff),
        ToolErrorKind::Timeout => (true, RecoveryStrategyKind::RetryDelay),
        ToolErrorKind::Internal => (true, RecoveryStrategyKind::RetryBackoff),
        ToolErrorKind::Unknown => (true, RecoveryStrategyKind::RetryBackoff),
        ToolErrorKind::NotFound => (!alternatives.is_empty(), RecoveryStrategyKind::AdjustParams),
        ToolErrorKind::Validation => (true, RecoveryStrategyKind::AdjustParams),
        ToolErrorKind::Permission => (false, RecoveryStrategyKind::Escalate),
    };

    let strategy = if !alternatives.is_empty()
        && matches!(
            error_type,
            ToolErrorKind::NotFound | ToolErrorKind::Network | ToolErrorKind::Internal
        )
        && retry_config.is_none()
    {
        RecoveryStrategyKind::TryAlternative
    } else {
        strategy
    };

    let suggestion = match error_type {
        ToolErrorKind::Network => "transient network failure; retrying with backoff".to_string(),
        ToolErrorKind::RateLimit => "rate limited upstream; back off and retry".to_string(),
        ToolErrorKind::Timeout => "operation timed out; retrying once".to_string(),
        ToolErrorKind::NotFound => "resource not found; consider adjusting parameters".to_string(),
        ToolErrorKind::Permission => "permission denied; escalate to approval".to_string(),
        ToolErrorKind::Validation => "invalid parameters; attempting automatic adjustment".to_string(),
        ToolErrorKind::Internal => "upstream internal error; retrying".to_string(),
        ToolErrorKind::Unknown => "unrecognized error; best-effort retry".to_string(),
    };

    ErrorAnalysis {
        error_type,
        recoverable,
        strategy,
        alternatives: alternatives.to_vec(),
        suggestion,
        retry_config,
    }
}

/// Parameter adjustment on VALIDATION/NOT_FOUND (§4.3): shorten over-long
/// queries to the first 3 tokens, grow `limit`/`topK`, strip punctuation from
/// phone-like fields, truncate strings over 5000 chars. Returns `None` if no
/// adjustment applies.
pub fn adjust_params(params: &serde_json::Value) -> Option<serde_json::Value> {
    let obj = params.as_object()?;
    let mut out = obj.clone();
    let mut changed = false;

    if let Some(q) = out.get("query").and_then(|v| v.as_str()) {
        let tokens: Vec<&str> = q.split_whitespace().collect();
        if tokens.len() > 3 {
            out.insert(
                "query".to_string(),
                serde_json::Value::String(tokens[..3].join(" ")),
            );
            changed = true;
        }
    }

    for (field, cap) in [("limit", 50i64), ("topK", 20i64)] {
        if let Some(n) = out.get(field).and_then(|v| v.as_i64()) {
            if n < cap {
                out.insert(field.to_string(), serde_json::Value::from((n * 2).min(cap)));
                changed = true;
            }
        }
    }

    for (key, value) in out.clone().iter() {
        if key.to_lowercase().contains("phone") {
            if let Some(s) = value.as_str() {
                let cleaned: String = s
                    .chars()
                    .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
                    .collect();
                if cleaned != s {
                    out.insert(key.clone(), serde_json::Value::String(cleaned));
                    changed = true;
                }
            }
        }
    }

    for (key, value) in out.clone().iter() {
        if let Some(s) = value.as_str() {
            if s.len() > 5000 {
                out.insert(
                    key.clone(),
                    serde_json::Value::String(s.chars().take(5000).collect()),
                );
                changed = true;
            }
        }
    }

    changed.then(|| serde_json::Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_econnreset_as_network() {
        // §8 S3: `searchWeb` fails with "fetch failed: ECONNRESET".
        let analysis = analyze("fetch failed: ECONNRESET", &[]);
        assert_eq!(analysis.error_type, ToolErrorKind::Network);
        assert_eq!(analysis.strategy, RecoveryStrategyKind::RetryBackoff);
        assert_eq!(analysis.retry_config.as_ref().unwrap().base_delay_ms, 1000);
    }

    #[test]
    fn classifies_rate_limit_before_network() {
        // Contains both a network marker and rate-limit phrasing; rate limit
        // wins because it is checked first in the ordered chain.
        let kind = classify_error_text("rate limit exceeded after ECONNRESET");
        assert_eq!(kind, ToolErrorKind::RateLimit);
    }

    #[test]
    fn not_found_and_validation_have_no_retry_budget() {
        assert!(retry_config_for(ToolErrorKind::NotFound).is_none());
        assert!(retry_config_for(ToolErrorKind::Validation).is_none());
        assert!(retry_config_for(ToolErrorKind::Permission).is_none());
    }

    #[test]
    fn adjust_params_shortens_long_queries_to_three_tokens() {
        let params = serde_json::json!({"query": "one two three four five"});
        let adjusted = adjust_params(&params).unwrap();
        assert_eq!(adjusted["query"], "one two three");
    }

    #[test]
    fn adjust_params_strips_phone_punctuation() {
        let params = serde_json::json!({"phone": "+62 (812) 345-6789"});
        let adjusted = adjust_params(&params).unwrap();
        assert_eq!(adjusted["phone"], "+628123456789");
    }

    #[test]
    fn adjust_params_returns_none_when_nothing_to_change() {
        let params = serde_json::json!({"query": "short"});
        assert!(adjust_params(&params).is_none());
    }
}
