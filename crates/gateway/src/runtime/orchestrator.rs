//! Orchestrator (§4.8) — two-stage dialog: an auth agent gates an intake
//! agent. Each agent keeps its own named turn history in the session store;
//! the only channel between them is `SessionContext`.

use std::sync::Arc;

use serde_json::Value;

use va_domain::error::Result;
use va_domain::session::{Session, SessionContext, TurnEntry};
use va_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use va_providers::LlmProvider;
use va_sessions::SessionStore;
use va_tools::Directory;

use super::llm_consumer::{ConsumerEvent, LlmConsumer};
use va_domain::config::DialogConfig;

pub const AUTH_AGENT: &str = "auth";
pub const INTAKE_AGENT: &str = "intake";

const AUTH_TOOLS: &[&str] = &["authenticate_user", "emergency_escalate", "handoff"];
const INTAKE_TOOLS: &[&str] = &[
    "schedule_appointment",
    "refill_prescription",
    "medication_info",
    "prior_auth_evaluation",
    "emergency_escalate",
    "handoff",
];

/// What happened to the session as a result of one orchestrated turn, so
/// the Turn Controller can react (e.g. emit a completion event, allow the
/// caller to hang up).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorOutcome {
    pub agent: String,
    pub promoted_to_intake: bool,
    pub intake_completed: bool,
}

pub struct Orchestrator {
    store: Arc<SessionStore>,
    consumer: LlmConsumer,
    tools: Vec<ToolDefinition>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn LlmProvider>,
        directory: Arc<Directory>,
        dialog: DialogConfig,
    ) -> Self {
        Self {
            store,
            consumer: LlmConsumer::new(provider, directory, dialog),
            tools: va_tools::build_tool_definitions(),
        }
    }

    /// Route one user turn to the session's active agent, run it to
    /// completion (including any tool round-trips), persist the result,
    /// and report what changed.
    pub async fn handle_user_turn(
        &self,
        call_id: &str,
        text: &str,
        on_event: &mut dyn FnMut(ConsumerEvent),
    ) -> Result<OrchestratorOutcome> {
        let (mut session, _) = self.store.load(call_id).await?;
        let agent = if session.authenticated { INTAKE_AGENT } else { AUTH_AGENT };

        ensure_system_prompt(&mut session, agent);
        session.append_turn(agent, TurnEntry::User { text: text.to_owned() });

        let tools = tool_defs_for(agent, &self.tools);
        let messages = history_to_messages(session.history_for(agent));

        let llm_start_ms = chrono::Utc::now().timestamp_millis();
        let new_entries = self.consumer.run_turn(messages, &tools, None, None, on_event).await?;
        let llm_end_ms = chrono::Utc::now().timestamp_millis();
        let _ = self.store.note_latency(call_id, "llm", llm_start_ms, llm_end_ms).await;

        let mut outcome = OrchestratorOutcome {
            agent: agent.to_owned(),
            ..Default::default()
        };

        for entry in &new_entries {
            let TurnEntry::ToolResult {
                tool_name,
                result_json,
                is_error,
                ..
            } = entry
            else {
                continue;
            };
            if *is_error || !tool_succeeded(tool_name, result_json) {
                continue;
            }
            if agent == AUTH_AGENT && tool_name == "authenticate_user" {
                session.context.authenticated = true;
                if let Some(name) = caller_name_from_entries(&new_entries) {
                    session.context.caller_name = Some(name);
                }
                session.active_agent = Some(INTAKE_AGENT.to_owned());
                outcome.promoted_to_intake = true;
            } else if agent == INTAKE_AGENT && is_completion_tool(tool_name) {
                session.context.intake_completed = true;
                outcome.intake_completed = true;
            }
            session
                .context
                .tool_outputs
                .insert(tool_name.clone(), Value::String(result_json.clone()));
        }

        for entry in new_entries {
            session.append_turn(agent, entry);
        }

        self.store.persist(&session, None).await?;
        Ok(outcome)
    }
}

/// Before an agent's first turn, make sure a system entry sits at index 0,
/// templated with live context. If the rendered template differs from the
/// existing entry, replace it in place (§4.8).
fn ensure_system_prompt(session: &mut Session, agent: &str) {
    let rendered = match agent {
        AUTH_AGENT => auth_system_prompt(&session.context),
        _ => intake_system_prompt(&session.context),
    };
    let needs_update = match session.history_for(agent).first() {
        Some(TurnEntry::System { text }) => text != &rendered,
        _ => true,
    };
    if needs_update {
        session.append_turn(agent, TurnEntry::System { text: rendered });
    }
}

fn auth_system_prompt(_context: &SessionContext) -> String {
    "You are the authentication agent for XYMZ Insurance. Before helping the caller with \
     anything else, collect their first name, last name, and phone number, then call the \
     `authenticate_user` tool. If authentication fails, apologize and ask the caller to repeat \
     or correct the information — do not guess. Do not discuss appointments, prescriptions, or \
     medical information until authentication succeeds. If the caller describes a medical \
     emergency, call `emergency_escalate` immediately regardless of authentication state."
        .to_string()
}

fn intake_system_prompt(context: &SessionContext) -> String {
    let caller_name = context.caller_name.clone().unwrap_or_else(|| "the caller".to_string());
    let policy_id = context.policy_id.clone().unwrap_or_else(|| "unknown".to_string());
    let slots = if context.slots.is_empty() {
        "(none recorded)".to_string()
    } else {
        serde_json::to_string(&context.slots).unwrap_or_default()
    };
    let tool_outputs = if context.tool_outputs.is_empty() {
        "(none recorded)".to_string()
    } else {
        serde_json::to_string(&context.tool_outputs).unwrap_or_default()
    };
    format!(
        "You are the intake agent for XYMZ Insurance, now speaking with {caller_name} \
         (policy {policy_id}). Help them schedule appointments, refill prescriptions, look up \
         medication information, or evaluate prior authorizations. Known slots: {slots}. Prior \
         tool outputs this call: {tool_outputs}. Call `handoff` once the caller's need is \
         resolved or they ask for a human, or `emergency_escalate` for a medical emergency."
    )
}

fn tool_defs_for(agent: &str, all: &[ToolDefinition]) -> Vec<ToolDefinition> {
    let allow: &[&str] = if agent == AUTH_AGENT { AUTH_TOOLS } else { INTAKE_TOOLS };
    all.iter().filter(|t| allow.contains(&t.name.as_str())).cloned().collect()
}

/// The shipped tool handlers return free-text results rather than
/// structured JSON (see `va_tools::handlers`), so success is read off a
/// fixed prefix per tool rather than a `success` field.
fn tool_succeeded(tool_name: &str, result: &str) -> bool {
    match tool_name {
        "authenticate_user" => result.starts_with("Authentication successful"),
        "schedule_appointment" => result.starts_with("Appointment for"),
        "refill_prescription" => result.starts_with("Prescription refill for"),
        "prior_auth_evaluation" => result.starts_with("Prior authorization for"),
        "emergency_escalate" => result.starts_with("Emergency escalation triggered"),
        "medication_info" => !result.ends_with("not found in our system."),
        "handoff" => true,
        _ => false,
    }
}

fn is_completion_tool(tool_name: &str) -> bool {
    matches!(
        tool_name,
        "schedule_appointment" | "refill_prescription" | "prior_auth_evaluation" | "emergency_escalate" | "handoff"
    )
}

fn caller_name_from_entries(entries: &[TurnEntry]) -> Option<String> {
    entries.iter().find_map(|e| match e {
        TurnEntry::AssistantToolRequest {
            tool_name,
            arguments_json,
            ..
        } if tool_name == "authenticate_user" => {
            let args: Value = serde_json::from_str(arguments_json).ok()?;
            let first = args.get("first_name")?.as_str()?.trim();
            let last = args.get("last_name")?.as_str()?.trim();
            if first.is_empty() || last.is_empty() {
                return None;
            }
            Some(format!("{} {}", title_case(first), title_case(last)))
        }
        _ => None,
    })
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn history_to_messages(entries: &[TurnEntry]) -> Vec<Message> {
    entries
        .iter()
        .map(|entry| match entry {
            TurnEntry::System { text } => Message::system(text.clone()),
            TurnEntry::User { text } => Message::user(text.clone()),
            TurnEntry::Assistant { text } => Message::assistant(text.clone()),
            TurnEntry::AssistantToolRequest {
                call_id,
                tool_name,
                arguments_json,
            } => {
                let input = serde_json::from_str(arguments_json).unwrap_or(Value::Null);
                Message {
                    role: Role::Assistant,
                    content: MessageContent::Parts(vec![ContentPart::ToolUse {
                        id: call_id.clone(),
                        name: tool_name.clone(),
                        input,
                    }]),
                }
            }
            TurnEntry::ToolResult {
                call_id,
                result_json,
                is_error,
                ..
            } => Message {
                role: Role::Tool,
                content: MessageContent::Parts(vec![ContentPart::ToolResult {
                    tool_use_id: call_id.clone(),
                    content: result_json.clone(),
                    is_error: *is_error,
                }]),
            },
        })
        .collect()
}
