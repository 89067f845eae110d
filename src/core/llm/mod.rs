//! Streaming language-model abstraction
//!
//! A model call yields a stream of chunks: plain content tokens or
//! fragments of a structured tool call. Only one tool call per response is
//! honoured: the first fragment carries its id and name, later fragments
//! append to the argument string.

mod loopback;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::core::dialogue::Message;

pub use loopback::LoopbackModel;

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Fragment of a structured tool call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmChunk {
    Content(String),
    ToolCall(ToolCallDelta),
}

pub type LlmStream = BoxStream<'static, Result<LlmChunk, LlmError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Start a streaming completion.
    ///
    /// `tools` is the tool catalog in function-calling schema form, or
    /// `None` when tools are not offered.
    async fn stream_response(
        &self,
        session_id: &str,
        messages: Vec<Message>,
        tools: Option<Vec<Value>>,
    ) -> Result<LlmStream, LlmError>;
}
