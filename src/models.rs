//! Core data models for conversation history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use uuid::Uuid;

//
// ================= Role =================
//

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Parse a stored role name. Unknown names yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };
        f.write_str(label)
    }
}

//
// ================= Usage =================
//

/// Token and cost counters reported by a model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Estimated monetary cost in USD
    pub cost_usd: f64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, cost_usd: f64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_usd,
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(mut self, rhs: Usage) -> Usage {
        self += rhs;
        self
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
        self.cost_usd += rhs.cost_usd;
    }
}

//
// ================= Tool Calls =================
//

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments matching the tool's JSON schema
    pub arguments: serde_json::Value,
}

//
// ================= Message =================
//

/// Structured payload carried alongside message content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The tool call a `Role::Tool` message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.usage.is_none()
            && self.tool_calls.is_empty()
            && self.tool_call_id.is_none()
            && self.extra.is_none()
    }
}

/// A single immutable entry in a session's history.
///
/// Fields are only readable from outside the crate; a "changed" message is
/// always a new value built through one of the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub(crate) message_id: Uuid,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) role: Role,
    pub(crate) content: String,
    /// Approximate token count for context window management
    pub(crate) token_count: usize,
    /// Synthetic message produced by summarization
    pub(crate) is_summary: bool,
    #[serde(default)]
    pub(crate) metadata: MessageMetadata,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_count = estimate_tokens(&content);

        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            role,
            content,
            token_count,
            is_summary: false,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Result of a tool call, linked back to the call that requested it
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.metadata.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Create a summary message
    pub fn summary(summary_content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::System, summary_content);
        msg.is_summary = true;
        msg
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.metadata.usage = Some(usage);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.metadata.tool_calls = tool_calls;
        self
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn is_summary(&self) -> bool {
        self.is_summary
    }

    pub fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.metadata.usage.as_ref()
    }
}

/// Rough token estimate: four bytes per token, rounded up
pub fn estimate_tokens(content: &str) -> usize {
    (content.len() + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hi I'm Nemo");
        assert_eq!(msg.role(), Role::User);
        assert_eq!(msg.content(), "Hi I'm Nemo");
        assert!(!msg.is_summary());
        assert_eq!(msg.token_count(), 3);
        assert!(msg.metadata().is_empty());
    }

    #[test]
    fn test_summary_message() {
        let summary = Message::summary("User introduced themselves as Nemo");
        assert!(summary.is_summary());
        assert_eq!(summary.role(), Role::System);
    }

    #[test]
    fn test_tool_message_links_call() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "multiply".to_string(),
            arguments: serde_json::json!({ "a": 3, "b": 12 }),
        };
        let request = Message::assistant("").with_tool_calls(vec![call]);
        let result = Message::tool("call_1", "36");

        assert_eq!(request.metadata().tool_calls[0].name, "multiply");
        assert_eq!(result.metadata().tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(result.role(), Role::Tool);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut total = Usage::new(10, 5, 0.001);
        total += Usage::new(20, 7, 0.002);

        assert_eq!(total.prompt_tokens, 30);
        assert_eq!(total.completion_tokens, 12);
        assert_eq!(total.total_tokens, 42);
        assert!((total.cost_usd - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_role_round_trips_through_storage_names() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("agent"), None);
    }

    #[test]
    fn test_metadata_omits_empty_fields() {
        let msg = Message::assistant("ok").with_usage(Usage::new(1, 1, 0.0));
        let json = serde_json::to_value(msg.metadata()).unwrap();
        assert!(json.get("usage").is_some());
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }
}
