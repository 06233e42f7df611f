//! LLM Streaming Consumer (§4.9).
//!
//! Drives one LLM turn to completion: streams tokens, flushing accumulated
//! text at dialog sentence boundaries so the turn controller can start
//! speaking before the whole reply has arrived; assembles tool calls from
//! their started/delta fragments (the shipped OpenAI-compatible provider
//! never emits `ToolCallFinished` itself); dispatches tools with a timeout
//! and loops for the follow-up completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;

use va_domain::config::DialogConfig;
use va_domain::error::{Error, Result};
use va_domain::session::TurnEntry;
use va_domain::stream::StreamEvent;
use va_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use va_providers::{ChatRequest, LlmProvider};
use va_tools::Directory;

/// Hard ceiling on tool-call round-trips within one user turn, so a model
/// that never stops calling tools can't wedge the call open forever.
const MAX_TOOL_LOOPS: usize = 8;

/// Lifecycle events the turn controller reacts to as a turn runs.
pub enum ConsumerEvent {
    /// A sentence-boundary-flushed chunk of assistant text, ready for TTS.
    TextChunk(String),
    ToolStarted {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolFinished {
        call_id: String,
        tool_name: String,
        elapsed_ms: u64,
        result: String,
        is_error: bool,
    },
}

pub struct LlmConsumer {
    provider: Arc<dyn LlmProvider>,
    directory: Arc<Directory>,
    dialog: DialogConfig,
}

impl LlmConsumer {
    pub fn new(provider: Arc<dyn LlmProvider>, directory: Arc<Directory>, dialog: DialogConfig) -> Self {
        Self {
            provider,
            directory,
            dialog,
        }
    }

    /// Run one user turn to completion. `messages` is the full history to
    /// send (system + prior turns + the new user message); `tools` is the
    /// stage-scoped tool subset the caller (the Orchestrator) resolved for
    /// the active agent. Returns the sequence of turn entries the caller
    /// should append and persist.
    pub async fn run_turn(
        &self,
        mut messages: Vec<Message>,
        tools: &[ToolDefinition],
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        on_event: &mut dyn FnMut(ConsumerEvent),
    ) -> Result<Vec<TurnEntry>> {
        let mut new_entries = Vec::new();

        for _ in 0..MAX_TOOL_LOOPS {
            let req = ChatRequest {
                messages: messages.clone(),
                tools: tools.to_vec(),
                temperature,
                top_p: None,
                max_tokens,
                model: None,
            };

            let mut stream = self.provider.chat_stream(req).await?;

            let mut text_buf = String::new();
            let mut sentence_buf = String::new();
            let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();
            let mut finished_calls: Vec<AssembledCall> = Vec::new();

            while let Some(event) = stream.next().await {
                match event? {
                    StreamEvent::Token { text } => {
                        let has_boundary =
                            text.chars().last().is_some_and(|c| self.dialog.boundary_chars.contains(&c));
                        text_buf.push_str(&text);
                        sentence_buf.push_str(&text);
                        if has_boundary {
                            on_event(ConsumerEvent::TextChunk(std::mem::take(&mut sentence_buf)));
                        }
                    }
                    StreamEvent::ToolCallStarted { call_id, tool_name } => {
                        tc_bufs.insert(call_id, (tool_name, String::new()));
                    }
                    StreamEvent::ToolCallDelta { call_id, delta } => {
                        if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                            args.push_str(&delta);
                        }
                    }
                    StreamEvent::ToolCallFinished {
                        call_id,
                        tool_name,
                        arguments,
                    } => {
                        tc_bufs.remove(&call_id);
                        finished_calls.push(AssembledCall {
                            call_id,
                            tool_name,
                            raw_args: arguments.to_string(),
                            parsed: Some(arguments),
                        });
                    }
                    StreamEvent::Done { .. } => break,
                    StreamEvent::Error { message } => return Err(Error::LlmStream(message)),
                }
            }

            if !sentence_buf.is_empty() {
                on_event(ConsumerEvent::TextChunk(std::mem::take(&mut sentence_buf)));
            }

            for (call_id, (tool_name, args_json)) in tc_bufs.drain() {
                let parsed = serde_json::from_str::<Value>(&args_json).ok();
                finished_calls.push(AssembledCall {
                    call_id,
                    tool_name,
                    raw_args: args_json,
                    parsed,
                });
            }

            if finished_calls.is_empty() {
                if !text_buf.is_empty() {
                    new_entries.push(TurnEntry::Assistant { text: text_buf });
                }
                return Ok(new_entries);
            }

            for call in &finished_calls {
                new_entries.push(TurnEntry::AssistantToolRequest {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    arguments_json: call.raw_args.clone(),
                });
                if let Some(arguments) = &call.parsed {
                    on_event(ConsumerEvent::ToolStarted {
                        call_id: call.call_id.clone(),
                        tool_name: call.tool_name.clone(),
                        arguments: arguments.clone(),
                    });
                }
            }
            messages.push(assistant_tool_message(&text_buf, &finished_calls));

            for call in finished_calls {
                let (result_text, is_error) = match call.parsed {
                    Some(arguments) => {
                        let tool_call = ToolCall {
                            call_id: call.call_id.clone(),
                            tool_name: call.tool_name.clone(),
                            arguments,
                        };
                        let started = std::time::Instant::now();
                        let (result_text, is_error) = self.dispatch_with_timeout(&tool_call).await;
                        on_event(ConsumerEvent::ToolFinished {
                            call_id: call.call_id.clone(),
                            tool_name: call.tool_name.clone(),
                            elapsed_ms: started.elapsed().as_millis() as u64,
                            result: result_text.clone(),
                            is_error,
                        });
                        (result_text, is_error)
                    }
                    None => {
                        tracing::warn!(
                            call_id = %call.call_id,
                            tool_name = %call.tool_name,
                            raw_args = %call.raw_args,
                            "tool call arguments failed to parse; tool not invoked"
                        );
                        let result_text = "tool call arguments were not valid JSON".to_string();
                        on_event(ConsumerEvent::ToolFinished {
                            call_id: call.call_id.clone(),
                            tool_name: call.tool_name.clone(),
                            elapsed_ms: 0,
                            result: result_text.clone(),
                            is_error: true,
                        });
                        (result_text, true)
                    }
                };

                new_entries.push(TurnEntry::ToolResult {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    result_json: result_text.clone(),
                    is_error,
                });
                messages.push(tool_result_message(&call.call_id, &result_text, is_error));
            }
        }

        Err(Error::Other(format!(
            "tool loop exceeded {MAX_TOOL_LOOPS} iterations without a final answer"
        )))
    }

    /// `va_tools::dispatch_tool` is synchronous (the tool catalog is an
    /// in-memory mock); it is still run under the configured tool timeout
    /// so a future real dispatcher with network calls fits the same seam.
    async fn dispatch_with_timeout(&self, call: &ToolCall) -> (String, bool) {
        let directory = self.directory.clone();
        let tool_name = call.tool_name.clone();
        let arguments = call.arguments.clone();
        let budget = Duration::from_secs(self.dialog.tool_timeout_sec);

        match tokio::time::timeout(budget, async move {
            va_tools::dispatch_tool(&directory, &tool_name, &arguments)
        })
        .await
        {
            Ok(result) => result,
            Err(_) => (
                format!(
                    "tool '{}' timed out after {}s",
                    call.tool_name, self.dialog.tool_timeout_sec
                ),
                true,
            ),
        }
    }
}

/// A tool call assembled from streamed fragments. `parsed` is `None` when
/// the concatenated argument fragments were not valid JSON — per §4.9 the
/// call is still recorded in history, but the tool must not be invoked.
struct AssembledCall {
    call_id: String,
    tool_name: String,
    raw_args: String,
    parsed: Option<Value>,
}

fn assistant_tool_message(text: &str, calls: &[AssembledCall]) -> Message {
    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(ContentPart::Text { text: text.to_owned() });
    }
    for call in calls {
        let input = call.parsed.clone().unwrap_or_else(|| Value::String(call.raw_args.clone()));
        parts.push(ContentPart::ToolUse {
            id: call.call_id.clone(),
            name: call.tool_name.clone(),
            input,
        });
    }
    Message {
        role: Role::Assistant,
        content: MessageContent::Parts(parts),
    }
}

fn tool_result_message(call_id: &str, content: &str, is_error: bool) -> Message {
    Message {
        role: Role::Tool,
        content: MessageContent::Parts(vec![ContentPart::ToolResult {
            tool_use_id: call_id.to_owned(),
            content: content.to_owned(),
            is_error,
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use va_domain::stream::BoxStream;
    use va_providers::LlmProvider;

    struct ScriptedProvider {
        batches: std::sync::Mutex<Vec<Vec<Result<StreamEvent>>>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let batch = self.batches.lock().unwrap().remove(0);
            Ok(Box::pin(futures_util::stream::iter(batch)))
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    fn ok(ev: StreamEvent) -> Result<StreamEvent> {
        Ok(ev)
    }

    #[tokio::test]
    async fn flushes_text_at_sentence_boundaries() {
        let provider = Arc::new(ScriptedProvider {
            batches: std::sync::Mutex::new(vec![vec![
                ok(StreamEvent::Token { text: "Hello".into() }),
                ok(StreamEvent::Token { text: " there.".into() }),
                ok(StreamEvent::Token { text: " Bye.".into() }),
                ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }),
            ]]),
        });
        let consumer = LlmConsumer::new(provider, Arc::new(Directory::default()), DialogConfig::default());

        let mut chunks = Vec::new();
        let mut on_event = |ev: ConsumerEvent| {
            if let ConsumerEvent::TextChunk(t) = ev {
                chunks.push(t);
            }
        };

        let entries = consumer
            .run_turn(vec![Message::user("hi")], &[], None, None, &mut on_event)
            .await
            .unwrap();

        assert_eq!(chunks, vec!["Hello there.".to_string(), " Bye.".to_string()]);
        assert!(matches!(entries.as_slice(), [TurnEntry::Assistant { .. }]));
    }

    #[tokio::test]
    async fn assembles_tool_call_from_started_and_delta_and_dispatches() {
        let provider = Arc::new(ScriptedProvider {
            batches: std::sync::Mutex::new(vec![
                vec![
                    ok(StreamEvent::ToolCallStarted {
                        call_id: "tc_1".into(),
                        tool_name: "medication_info".into(),
                    }),
                    ok(StreamEvent::ToolCallDelta {
                        call_id: "tc_1".into(),
                        delta: "{\"medication_name\":\"ibuprofen\"}".into(),
                    }),
                    ok(StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) }),
                ],
                vec![
                    ok(StreamEvent::Token { text: "All set.".into() }),
                    ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) }),
                ],
            ]),
        });

        let consumer = LlmConsumer::new(provider, Arc::new(Directory::default()), DialogConfig::default());
        let tools = va_tools::build_tool_definitions();

        let mut tool_events = Vec::new();
        let mut on_event = |ev: ConsumerEvent| {
            if let ConsumerEvent::ToolFinished { tool_name, is_error, .. } = ev {
                tool_events.push((tool_name, is_error));
            }
        };

        let entries = consumer
            .run_turn(vec![Message::user("what is ibuprofen")], &tools, None, None, &mut on_event)
            .await
            .unwrap();

        assert_eq!(tool_events.len(), 1);
        assert_eq!(tool_events[0].0, "medication_info");
        assert!(entries
            .iter()
            .any(|e| matches!(e, TurnEntry::AssistantToolRequest { tool_name, .. } if tool_name == "medication_info")));
        assert!(entries
            .iter()
            .any(|e| matches!(e, TurnEntry::ToolResult { tool_name, .. } if tool_name == "medication_info")));
    }

    #[tokio::test]
    async fn unparseable_tool_arguments_are_not_dispatched() {
        let provider = Arc::new(ScriptedProvider {
            batches: std::sync::Mutex::new(vec![
                vec![
                    ok(StreamEvent::ToolCallStarted {
                        call_id: "tc_1".into(),
                        tool_name: "emergency_escalate".into(),
                    }),
                    ok(StreamEvent::ToolCallDelta {
                        call_id: "tc_1".into(),
                        delta: "not json".into(),
                    }),
                    ok(StreamEvent::Done { usage: None, finish_reason: Some("tool_calls".into()) }),
                ],
                vec![ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) })],
            ]),
        });

        let consumer = LlmConsumer::new(provider, Arc::new(Directory::default()), DialogConfig::default());
        let tools = va_tools::build_tool_definitions();

        let mut tool_started = false;
        let mut finished_is_error = false;
        let mut on_event = |ev: ConsumerEvent| match ev {
            ConsumerEvent::ToolStarted { .. } => tool_started = true,
            ConsumerEvent::ToolFinished { is_error, .. } => finished_is_error = is_error,
            _ => {}
        };
        let entries = consumer
            .run_turn(vec![Message::user("help")], &tools, None, None, &mut on_event)
            .await
            .unwrap();

        assert!(!tool_started, "a call with unparseable arguments must not be dispatched");
        assert!(finished_is_error);

        let request = entries
            .iter()
            .find(|e| matches!(e, TurnEntry::AssistantToolRequest { .. }))
            .unwrap();
        if let TurnEntry::AssistantToolRequest { arguments_json, .. } = request {
            assert_eq!(arguments_json, "not json");
        }

        let result = entries
            .iter()
            .find(|e| matches!(e, TurnEntry::ToolResult { .. }))
            .unwrap();
        assert!(matches!(result, TurnEntry::ToolResult { is_error: true, .. }));
    }
}
