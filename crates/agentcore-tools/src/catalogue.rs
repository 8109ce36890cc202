//! Tool Catalogue — permission categories and side-effect classification.
//!
//! Dynamic tool metadata modeled as a typed registry entry rather than a
//! loose string tag, per the tagged-variant guidance for this system: each
//! tool knows its own `ToolCategory` and `is_side_effect` flag; the
//! Tool-Permission Matrix and Idempotency Cache consume them without
//! re-deriving them from the tool name.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Observation,
    MemoryRead,
    MemoryWrite,
    MemoryDelete,
    KnowledgeRead,
    KnowledgeIngest,
    SelfManagement,
    SubagentManage,
    CommunicationRespond,
    CommunicationOutbound,
    SelfImprovement,
    SelfModification,
}

impl ToolCategory {
    /// Unknown tools default to Observation (read-only, always permitted).
    pub const DEFAULT: ToolCategory = ToolCategory::Observation;
}

/// Fixed enumeration of side-effect tools subject to the Idempotency Cache
/// (message sends, task creation, schedule creation, approvals, broadcasts).
/// Kept here — not derived from `is_side_effect()` at call time — so the
/// Idempotency Cache's "which tools are keyed" question has one answer.
pub const SIDE_EFFECT_TOOLS: &[&str] = &[
    "sendMessage",
    "sendWhatsApp",
    "sendEmail",
    "createTask",
    "createSchedule",
    "createApproval",
    "broadcast",
    "orchestrate",
    "spawn",
];

pub fn is_side_effect_tool(tool_id: &str) -> bool {
    SIDE_EFFECT_TOOLS.contains(&tool_id)
}

/// Fixed alias table used by Recovery Strategies when falling back to an
/// alternative tool (step 6 of the recovery sequence): maps the failed
/// tool's param names onto the alternative's, filling defaults where the
/// alternative requires a field the original didn't have.
pub fn remap_params(
    from_tool: &str,
    to_tool: &str,
    params: &serde_json::Value,
) -> serde_json::Value {
    use serde_json::json;
    match (from_tool, to_tool) {
        ("sendWhatsApp", "sendEmail") => {
            let message = params.get("message").and_then(|v| v.as_str()).unwrap_or("");
            json!({
                "subject": params.get("subject").and_then(|v| v.as_str()).unwrap_or("Message"),
                "body": message,
            })
        }
        _ => params.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_effect_tools_are_fixed_enumeration() {
        assert!(is_side_effect_tool("sendWhatsApp"));
        assert!(!is_side_effect_tool("read"));
    }

    #[test]
    fn remap_whatsapp_to_email_maps_message_to_body() {
        let params = serde_json::json!({"to": "+62", "message": "hi"});
        let remapped = remap_params("sendWhatsApp", "sendEmail", &params);
        assert_eq!(remapped["body"], "hi");
        assert_eq!(remapped["subject"], "Message");
    }
}
