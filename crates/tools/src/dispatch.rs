//! Tool dispatch — single match from tool name to handler, grounded on the
//! teacher gateway's `dispatch_tool` shape (name in, `(content, is_error)`
//! out so the Orchestrator can fold either into a `TurnEntry::ToolResult`).

use serde_json::Value;

use crate::directory::Directory;
use crate::handlers;

/// Dispatch a single tool call by name. Returns `(result_content, is_error)`.
pub fn dispatch_tool(dir: &Directory, tool_name: &str, arguments: &Value) -> (String, bool) {
    match tool_name {
        "authenticate_user" => (handlers::authenticate_user(dir, arguments), false),
        "schedule_appointment" => (handlers::schedule_appointment(dir, arguments), false),
        "refill_prescription" => (handlers::refill_prescription(dir, arguments), false),
        "medication_info" => (handlers::medication_info(dir, arguments), false),
        "prior_auth_evaluation" => (handlers::prior_auth_evaluation(arguments), false),
        "emergency_escalate" => (handlers::emergency_escalate(arguments), false),
        "handoff" => (handlers::handoff(), false),
        other => (format!("unknown tool: {other}"), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tool_is_an_error() {
        let dir = Directory::default();
        let (content, is_error) = dispatch_tool(&dir, "not_a_tool", &serde_json::json!({}));
        assert!(is_error);
        assert!(content.contains("not_a_tool"));
    }

    #[test]
    fn handoff_has_no_arguments_to_validate() {
        let dir = Directory::default();
        let (content, is_error) = dispatch_tool(&dir, "handoff", &serde_json::json!({}));
        assert!(!is_error);
        assert!(content.contains("Handing off"));
    }
}
