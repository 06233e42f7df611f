//! OpenAI-compatible LLM adapter — the one concrete `LlmProvider` shipped.
//!
//! Works with OpenAI, Azure OpenAI, vLLM, or any endpoint following the
//! OpenAI chat completions contract, since `LlmConfig` points at an
//! arbitrary `base_url`.

use crate::traits::{ChatRequest, LlmProvider};
use crate::util::from_reqwest;
use serde_json::Value;
use va_domain::config::LlmConfig;
use va_domain::error::{Error, Result};
use va_domain::stream::{BoxStream, StreamEvent, Usage};
use va_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    default_temperature: f32,
    default_top_p: f32,
    default_max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = crate::util::resolve_env_credential(&cfg.api_key_env)?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.stream_ceiling_sec + 10))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "openai-compat".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            default_temperature: cfg.temperature,
            default_top_p: cfg.top_p,
            default_max_tokens: cfg.max_tokens,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": self.effective_model(req),
            "messages": messages,
            "stream": stream,
            "temperature": req.temperature.unwrap_or(self.default_temperature),
            "top_p": req.top_p.unwrap_or(self.default_top_p),
            "max_tokens": req.max_tokens.unwrap_or(self.default_max_tokens),
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

// ── Message serialization ───────────────────────────────────────────

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": input.to_string() }
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Parts(parts) => {
            for part in parts {
                if let ContentPart::ToolResult { tool_use_id, content, .. } = part {
                    return serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    });
                }
            }
            serde_json::json!({"role": "tool", "tool_call_id": "", "content": ""})
        }
        MessageContent::Text(t) => {
            serde_json::json!({"role": "tool", "tool_call_id": "", "content": t})
        }
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ── SSE event parsing ────────────────────────────────────────────────

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

fn parse_sse_data(data: &str) -> Option<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(Error::Json(e))),
    };

    let choice = v.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first());

    if choice.is_none() {
        if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
            return Some(Ok(StreamEvent::Done { usage: Some(usage), finish_reason: None }));
        }
        return None;
    }
    let choice = choice?;
    let delta = choice.get("delta").unwrap_or(&Value::Null);

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        let usage = v.get("usage").and_then(parse_openai_usage);
        return Some(Ok(StreamEvent::Done { usage, finish_reason: Some(fr.to_string()) }));
    }

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
        for tc in tc_arr {
            let idx_str = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0).to_string();

            if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                return Some(Ok(StreamEvent::ToolCallStarted {
                    call_id: id.to_string(),
                    tool_name: name.to_string(),
                }));
            }
            if let Some(args) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|v| v.as_str())
            {
                return Some(Ok(StreamEvent::ToolCallDelta { call_id: idx_str, delta: args.to_string() }));
            }
        }
    }

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            return Some(Ok(StreamEvent::Token { text: text.to_string() }));
        }
    }

    None
}

fn parse_sse_data_vec(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) })];
    }
    match parse_sse_data(data) {
        Some(event) => vec![event],
        None => Vec::new(),
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(&req, true);

        tracing::debug!(provider = %self.id, url = %url, "llm stream request");

        let resp = self.authed_post(&url).json(&body).send().await.map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::LlmStream(format!("HTTP {} - {}", status.as_u16(), err_text)));
        }

        Ok(crate::sse::sse_response_stream(resp, parse_sse_data_vec))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_delta() {
        let event = parse_sse_data(r#"{"choices":[{"delta":{"content":"hi"}}]}"#).unwrap();
        assert!(matches!(event, Ok(StreamEvent::Token { text }) if text == "hi"));
    }

    #[test]
    fn parses_tool_call_started() {
        let event = parse_sse_data(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"refill_prescription"}}]}}]}"#,
        )
        .unwrap();
        assert!(matches!(
            event,
            Ok(StreamEvent::ToolCallStarted { call_id, tool_name })
                if call_id == "call_1" && tool_name == "refill_prescription"
        ));
    }

    #[test]
    fn parses_finish_reason_as_done() {
        let event = parse_sse_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert!(matches!(event, Ok(StreamEvent::Done { finish_reason: Some(fr), .. }) if fr == "stop"));
    }

    #[test]
    fn done_sentinel_vec_emits_done() {
        let events = parse_sse_data_vec("[DONE]");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(StreamEvent::Done { .. })));
    }

    #[test]
    fn build_chat_body_includes_sampling_defaults() {
        let cfg = LlmConfig {
            base_url: "https://example.test/v1".into(),
            api_key_env: "VA_TEST_LLM_KEY".into(),
            model: "gpt-4o".into(),
            temperature: 0.5,
            top_p: 1.0,
            max_tokens: 4096,
            stream_ceiling_sec: 30,
        };
        std::env::set_var("VA_TEST_LLM_KEY", "k");
        let provider = OpenAiCompatProvider::from_config(&cfg).unwrap();
        std::env::remove_var("VA_TEST_LLM_KEY");

        let req = ChatRequest { messages: vec![Message::user("hi")], ..Default::default() };
        let body = provider.build_chat_body(&req, false);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["model"], "gpt-4o");
    }
}
