//! Language model round trips
//!
//! The turn engine only sees the `CompletionClient` trait; `OpenAiChat`
//! speaks the OpenAI-compatible chat completions protocol.

mod openai;
pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiChat;

use crate::Result;
use crate::conversation::{Message, ToolCall};

/// Tool advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// One chat completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Prompt and history, oldest first
    pub messages: Vec<Message>,
    /// Tools the model may call; empty disables function calling
    pub tools: Vec<ToolDefinition>,
}

/// Model reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Reply text, absent when the model only called tools
    pub content: Option<String>,
    /// Requested tool calls in the order returned
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    /// Text reply with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Non-blank reply text
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Remote chat/function-calling endpoint
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one completion round trip
    ///
    /// # Errors
    ///
    /// Returns `Error::Completion` (or a transport error) if the call fails
    /// or times out
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}
