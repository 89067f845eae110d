//! Role-tagged dialogue history
//!
//! The history is append-only while a turn runs. A tool round trip appends
//! an assistant message carrying the tool-call descriptor followed by the
//! matching tool message before the model is asked again.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function part of a tool-call descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// Tool-call descriptor attached to an assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCallDescriptor {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    pub fn assistant_tool_call(call: ToolCallDescriptor) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![call],
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Dialogue history for one session
#[derive(Debug, Clone, Default)]
pub struct Dialogue {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

impl Dialogue {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.filter(|p| !p.trim().is_empty()),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages as sent to the language model.
    ///
    /// The system prompt goes first; retrieved memory context is appended to
    /// it without touching the stored history.
    pub fn for_model(&self, memory: Option<&str>) -> Vec<Message> {
        let memory = memory.map(str::trim).filter(|m| !m.is_empty());
        let system = match (&self.system_prompt, memory) {
            (Some(prompt), Some(memory)) => Some(format!("{prompt}\n\nRelevant memory:\n{memory}")),
            (Some(prompt), None) => Some(prompt.clone()),
            (None, Some(memory)) => Some(format!("Relevant memory:\n{memory}")),
            (None, None) => None,
        };

        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = system {
            out.push(Message::system(system));
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_messages_serialize_like_chat_completions() {
        let call = ToolCallDescriptor::function("call_1", "get_weather", "{\"city\":\"Paris\"}");
        let value = serde_json::to_value(Message::assistant_tool_call(call)).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "get_weather");
        assert!(value.get("content").is_none());

        let value = serde_json::to_value(Message::tool("call_1", "sunny")).unwrap();
        assert_eq!(value["role"], "tool");
        assert_eq!(value["tool_call_id"], "call_1");
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn test_for_model_prepends_system_and_memory() {
        let mut dialogue = Dialogue::new(Some("You are helpful.".to_string()));
        dialogue.push(Message::user("hi"));

        let messages = dialogue.for_model(Some("likes tea"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.as_deref().unwrap().contains("likes tea"));
        assert_eq!(dialogue.len(), 1);
    }

    #[test]
    fn test_for_model_without_prompt_or_memory() {
        let mut dialogue = Dialogue::new(Some("  ".to_string()));
        dialogue.push(Message::user("hi"));
        let messages = dialogue.for_model(Some(""));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }
}
