use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use super::{LanguageModel, LlmChunk, LlmError, LlmStream};
use crate::core::dialogue::{Message, Role};

/// Model that answers by repeating the latest user or tool message.
///
/// Output is streamed word by word so the segmenter sees realistic token
/// boundaries.
#[derive(Debug, Clone, Default)]
pub struct LoopbackModel;

impl LoopbackModel {
    pub fn new() -> Self {
        Self
    }
}

fn answer_for(messages: &[Message]) -> String {
    let last = messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::User | Role::Tool));

    match last {
        Some(Message {
            role: Role::Tool,
            content: Some(content),
            ..
        }) => content.clone(),
        Some(Message {
            content: Some(content),
            ..
        }) if !content.trim().is_empty() => format!("You said: {}", content.trim()),
        _ => "I did not catch that.".to_string(),
    }
}

/// Split text into tokens that keep their trailing whitespace
fn tokenize(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl LanguageModel for LoopbackModel {
    async fn stream_response(
        &self,
        _session_id: &str,
        messages: Vec<Message>,
        _tools: Option<Vec<Value>>,
    ) -> Result<LlmStream, LlmError> {
        let chunks: Vec<Result<LlmChunk, LlmError>> = tokenize(&answer_for(&messages))
            .into_iter()
            .map(|t| Ok(LlmChunk::Content(t)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
