//! Harvest - conversational assistant for a farm-produce marketplace
//!
//! This library provides the assistant's turn-execution engine:
//! - Conversation log with a single ephemeral status slot
//! - LLM function calling with role-gated marketplace tools
//! - Voice input (capture, speech-to-text) and spoken replies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Session                         │
//! │   submit_user_input  │  record  │  stop  │  close   │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼──────────┐    ┌──────────▼──────────────┐
//! │  TurnOrchestrator   │◄───│  RecordingController    │
//! │  LLM │ Tools │ TTS  │    │  Mic │ STT              │
//! └──────────┬──────────┘    └──────────┬──────────────┘
//!            │                          │
//! ┌──────────▼──────────────────────────▼───────────────┐
//! │                 ConversationStore                    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod session;
pub mod tools;
pub mod voice;

pub use agent::{TurnOrchestrator, TurnOutcome, TurnState};
pub use config::Config;
pub use conversation::{ConversationStore, Message};
pub use error::{Error, Result};
pub use session::{Collaborators, Session, SessionSettings};
pub use tools::{SessionRole, UserContext};
