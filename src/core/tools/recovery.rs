use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Textual marker some models emit instead of a structured tool call
pub const TOOL_CALL_MARKER: &str = "<tool_call>";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?tool_call>").unwrap());

/// Tool call recovered from free text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredCall {
    pub name: String,
    pub arguments: String,
}

/// Best-effort recovery of a tool call from model text
pub trait ToolCallRecovery: Send + Sync {
    fn recover(&self, text: &str) -> Option<RecoveredCall>;
}

/// Recovers `{"name": .., "arguments": ..}` objects, optionally wrapped in
/// `<tool_call>` tags.
#[derive(Debug, Clone, Default)]
pub struct JsonToolCallRecovery;

impl ToolCallRecovery for JsonToolCallRecovery {
    fn recover(&self, text: &str) -> Option<RecoveredCall> {
        let stripped = TAG_RE.replace_all(text, "");
        let start = stripped.find('{')?;
        let end = stripped.rfind('}')?;
        if end < start {
            return None;
        }

        let value: Value = serde_json::from_str(&stripped[start..=end]).ok()?;
        let name = value.get("name")?.as_str()?.trim();
        if name.is_empty() {
            return None;
        }

        let arguments = match value.get("arguments") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(raw)) => raw.clone(),
            Some(other) => other.to_string(),
        };

        Some(RecoveredCall {
            name: name.to_string(),
            arguments,
        })
    }
}
