//! OpenAI-compatible streaming chat model.
//!
//! Talks to any `/chat/completions` endpoint that speaks the OpenAI
//! server-sent-event protocol with `stream: true`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ChatModel, ChunkStream, ModelRequest, ToolSpec};
use crate::engine::EngineError;
use crate::message::{AiMessage, RawMessage};
use crate::normalize::gather_tool_calls;

/// Default API base.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Terminal data frame of an OpenAI stream.
const STREAM_DONE: &str = "[DONE]";

/// Chat model backed by an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "stream": true,
            "messages": to_wire_messages(request),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(to_wire_tool).collect());
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: ModelRequest) -> Result<ChunkStream, EngineError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&self.request_body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let mut source = builder
            .eventsource()
            .map_err(|e| EngineError::Model(format!("Failed to create event source: {}", e)))?;

        let chunk_stream = async_stream::stream! {
            // Tool call deltas keyed by their index in the response
            let mut calls: BTreeMap<u64, PartialCall> = BTreeMap::new();

            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data.is_empty() {
                            continue;
                        }
                        if message.data == STREAM_DONE {
                            break;
                        }

                        let chunk: CompletionChunk = match serde_json::from_str(&message.data) {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                yield Err(EngineError::Model(format!(
                                    "Failed to parse stream chunk: {} (data: {})",
                                    e, message.data
                                )));
                                break;
                            }
                        };

                        for choice in chunk.choices {
                            for delta in choice.delta.tool_calls {
                                calls.entry(delta.index).or_default().absorb(delta);
                            }
                            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                                yield Ok(AiMessage::text(text));
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, _)) => {
                        yield Err(EngineError::Model(format!("HTTP {}", status.as_u16())));
                        break;
                    }
                    Err(e) => {
                        yield Err(EngineError::Model(format!("Stream error: {}", e)));
                        break;
                    }
                }
            }
            source.close();

            if !calls.is_empty() {
                let mut message = AiMessage::default();
                for call in calls.into_values() {
                    let args = call.parsed_arguments();
                    message = message.with_tool_call(call.name, args, call.id);
                }
                yield Ok(message);
            }
        };

        Ok(Box::pin(chunk_stream))
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn absorb(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id {
            self.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                self.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                self.arguments.push_str(&arguments);
            }
        }
    }

    /// Arguments as a JSON object; unparseable or empty input becomes `{}`.
    fn parsed_arguments(&self) -> Value {
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(value @ Value::Object(_)) => value,
            _ => json!({}),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

fn to_wire_tool(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn to_wire_messages(request: &ModelRequest) -> Vec<Value> {
    let mut wire = Vec::with_capacity(request.messages.len() + 1);
    if let Some(prompt) = &request.system_prompt {
        wire.push(json!({"role": "system", "content": prompt}));
    }

    for message in &request.messages {
        match message {
            RawMessage::Human(human) => {
                wire.push(json!({"role": "user", "content": human.content.text()}));
            }
            RawMessage::Ai(ai) | RawMessage::AiChunk(ai) => {
                let mut entry = json!({"role": "assistant", "content": ai.content.text()});
                let calls: Vec<Value> = gather_tool_calls(ai)
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id.unwrap_or_default(),
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": Value::Object(call.args).to_string(),
                            }
                        })
                    })
                    .collect();
                if !calls.is_empty() {
                    entry["tool_calls"] = Value::Array(calls);
                }
                wire.push(entry);
            }
            RawMessage::Tool(tool) => {
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": tool.tool_call_id,
                    "content": tool.content.text(),
                }));
            }
            RawMessage::System(system) => {
                wire.push(json!({"role": "system", "content": system.content.text()}));
            }
            RawMessage::Chat(_) => {}
        }
    }

    wire
}
