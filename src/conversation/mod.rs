//! Conversation log and message model

mod message;
mod store;

pub use message::{AssistantMessage, Message, Role, ToolCall, ToolResult};
pub use store::{ConversationStore, HistoryFilter};
