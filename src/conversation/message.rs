//! Conversation message types

use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Wire name used by chat completion APIs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A structured function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id
    pub id: String,
    /// Registered tool name
    pub name: String,
    /// Parsed JSON arguments
    pub arguments: serde_json::Value,
}

/// Payload produced for one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this answers
    pub tool_call_id: String,
    /// Structured result (`{"success": bool, ...}`)
    pub payload: serde_json::Value,
}

impl ToolResult {
    /// Whether the payload reports success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.payload
            .get("success")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Assistant reply, either plain text or a tool request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssistantMessage {
    /// Natural-language reply
    Plain { content: String },
    /// Reply carrying tool calls, optionally with preamble text
    WithToolCalls {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
}

/// One entry in the conversation log
///
/// Each variant carries exactly the fields valid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant(AssistantMessage),
    Tool(ToolResult),
    /// In-progress recording/transcription status, never sent to the model
    Ephemeral { content: String },
}

impl Message {
    /// System prompt message
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Plain assistant reply
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(AssistantMessage::Plain {
            content: content.into(),
        })
    }

    /// Assistant message requesting tool calls
    #[must_use]
    pub const fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant(AssistantMessage::WithToolCalls {
            content,
            tool_calls,
        })
    }

    /// Tool result message
    #[must_use]
    pub const fn tool(result: ToolResult) -> Self {
        Self::Tool(result)
    }

    /// Role as seen by the model, `None` for ephemeral entries
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        match self {
            Self::System { .. } => Some(Role::System),
            Self::User { .. } => Some(Role::User),
            Self::Assistant(_) => Some(Role::Assistant),
            Self::Tool(_) => Some(Role::Tool),
            Self::Ephemeral { .. } => None,
        }
    }

    /// Text content, if any
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Ephemeral { content }
            | Self::Assistant(AssistantMessage::Plain { content }) => Some(content),
            Self::Assistant(AssistantMessage::WithToolCalls { content, .. }) => content.as_deref(),
            Self::Tool(_) => None,
        }
    }

    /// Tool calls carried by an assistant message
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant(AssistantMessage::WithToolCalls { tool_calls, .. }) => tool_calls,
            _ => &[],
        }
    }

    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral { .. })
    }
}
