//! Chat models for the reference engine
//!
//! This module contains the `ChatModel` trait and, behind the `openai`
//! feature, a client for OpenAI-compatible chat completion endpoints.

#[cfg(feature = "openai")]
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::EngineError;
use crate::message::{AiMessage, RawMessage};

#[cfg(feature = "openai")]
pub use openai::OpenAiChatModel;

/// A tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool input.
    pub parameters: Value,
}

/// One model invocation.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<RawMessage>,
    pub tools: Vec<ToolSpec>,
}

/// Stream of AI message chunks from one model call.
pub type ChunkStream = BoxStream<'static, Result<AiMessage, EngineError>>;

/// A streaming chat model.
///
/// Each chunk carries a text delta, tool calls, or both. The engine merges
/// the chunks of one call into a single AI message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model name, for logging.
    fn name(&self) -> &str;

    async fn stream(&self, request: ModelRequest) -> Result<ChunkStream, EngineError>;
}
