//! Conversational turn execution
//!
//! One turn is: user message, completion, optionally one tool round trip
//! and a follow-up completion, then the spoken reply. Turns are serialized
//! by a lock owned here, and every failure ends in a single apology so the
//! conversation is always left idle.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::config::{Phrases, SpeechConfig};
use crate::conversation::{ConversationStore, HistoryFilter, Message, ToolCall, ToolResult};
use crate::llm::{CompletionClient, CompletionRequest, prompt};
use crate::tools::{GENERIC_FAILURE_MESSAGE, ToolContext, ToolRegistry, UserContext, failure};
use crate::voice::{LanguageProfile, SpeechOutput};
use crate::{Error, Result};

/// Where a turn is in its round trips
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingCompletion,
    AwaitingTool,
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Model answered directly
    Replied,
    /// Model called a tool, then narrated its result
    RepliedAfterTool { tool: String, success: bool },
    /// A step failed; the apology was appended
    Failed,
    /// Another turn holds the lock; nothing was appended
    Busy,
    /// Input was blank; nothing was appended
    Ignored,
}

/// Who the assistant is talking to, and in what language
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub user: UserContext,
    pub language: LanguageProfile,
}

/// Whether and how replies are spoken
#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub enabled: bool,
    /// Longest reply spoken, in characters
    pub max_length: usize,
    /// Voice used instead of the language profile's
    pub voice_override: Option<String>,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self::from(&SpeechConfig::default())
    }
}

impl From<&SpeechConfig> for SpeechSettings {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_length: config.max_length,
            voice_override: config.voice_override.clone(),
        }
    }
}

/// Holds the turn lock; releasing it always returns the state to idle
struct TurnGuard<'a> {
    state: &'a Mutex<TurnState>,
}

impl TurnGuard<'_> {
    fn set(&self, next: TurnState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "turn state");
        *state = next;
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = TurnState::Idle;
        tracing::debug!("turn lock released");
    }
}

/// Runs turns against one conversation
pub struct TurnOrchestrator {
    store: Arc<ConversationStore>,
    completion: Arc<dyn CompletionClient>,
    tools: ToolRegistry,
    speech: Arc<SpeechOutput>,
    speech_settings: SpeechSettings,
    phrases: Phrases,
    context: RwLock<TurnContext>,
    state: Mutex<TurnState>,
}

impl TurnOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<ConversationStore>,
        completion: Arc<dyn CompletionClient>,
        tools: ToolRegistry,
        speech: Arc<SpeechOutput>,
        speech_settings: SpeechSettings,
        phrases: Phrases,
        context: TurnContext,
    ) -> Self {
        Self {
            store,
            completion,
            tools,
            speech,
            speech_settings,
            phrases,
            context: RwLock::new(context),
            state: Mutex::new(TurnState::Idle),
        }
    }

    /// Handle text typed by the user
    pub async fn submit_user_input(&self, text: &str) -> TurnOutcome {
        self.run_turn(text).await
    }

    /// Handle text recognized from a recording
    pub async fn submit_transcript(&self, text: &str) -> TurnOutcome {
        self.run_turn(text).await
    }

    /// Run one turn; rejected while another is in flight
    pub async fn run_turn(&self, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("ignoring blank input");
            return TurnOutcome::Ignored;
        }

        let Some(guard) = self.try_begin() else {
            tracing::warn!("turn rejected, another turn is in flight");
            return TurnOutcome::Busy;
        };

        let context = self.context();
        match self.execute(&guard, text, &context).await {
            Ok(outcome) => {
                tracing::info!(?outcome, "turn complete");
                outcome
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                self.apologize(&context).await;
                TurnOutcome::Failed
            }
        }
    }

    fn try_begin(&self) -> Option<TurnGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != TurnState::Idle {
            return None;
        }
        *state = TurnState::AwaitingCompletion;
        tracing::debug!("turn lock acquired");
        Some(TurnGuard { state: &self.state })
    }

    async fn execute(
        &self,
        guard: &TurnGuard<'_>,
        text: &str,
        context: &TurnContext,
    ) -> Result<TurnOutcome> {
        self.store.append(Message::user(text))?;
        let system = Message::system(prompt::system_prompt(&context.user, &context.language));

        guard.set(TurnState::AwaitingCompletion);
        let request = CompletionRequest {
            messages: self.request_messages(&system, HistoryFilter::DIALOGUE),
            tools: self.tools.definitions_for(&context.user),
        };
        let completion = self.completion.complete(request).await?;

        let Some(call) = completion.tool_calls.first().cloned() else {
            let reply = completion
                .text_content()
                .ok_or_else(|| Error::Completion("model returned an empty reply".to_string()))?;
            self.reply(reply, context).await?;
            return Ok(TurnOutcome::Replied);
        };

        if completion.tool_calls.len() > 1 {
            tracing::warn!(
                executed = %call.name,
                dropped = completion.tool_calls.len() - 1,
                "only the first tool call is executed"
            );
        }

        guard.set(TurnState::AwaitingTool);
        let result = self.execute_tool(&context.user, &call).await;
        let success = result.is_success();

        // Call and result are stored together once the tool has answered
        let preamble = completion.text_content().map(ToString::to_string);
        self.store.append_tool_exchange(
            Message::assistant_tool_calls(preamble, vec![call.clone()]),
            vec![result],
        )?;

        guard.set(TurnState::AwaitingCompletion);
        let request = CompletionRequest {
            messages: self.request_messages(&system, HistoryFilter::WITH_TOOLS),
            tools: Vec::new(),
        };
        let follow_up = self.completion.complete(request).await?;
        let reply = follow_up
            .text_content()
            .ok_or_else(|| Error::Completion("model returned an empty follow-up".to_string()))?;
        self.reply(reply, context).await?;

        Ok(TurnOutcome::RepliedAfterTool {
            tool: call.name,
            success,
        })
    }

    fn request_messages(&self, system: &Message, filter: HistoryFilter) -> Vec<Message> {
        std::iter::once(system.clone())
            .chain(self.store.history(filter))
            .collect()
    }

    /// Execute a tool, turning every error into a failure payload
    async fn execute_tool(&self, user: &UserContext, call: &ToolCall) -> ToolResult {
        let ctx = ToolContext { user: user.clone() };
        match self.tools.execute(&ctx, call).await {
            Ok(result) => {
                tracing::debug!(tool = %call.name, success = result.is_success(), "tool finished");
                result
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    payload: failure(GENERIC_FAILURE_MESSAGE),
                }
            }
        }
    }

    async fn reply(&self, text: &str, context: &TurnContext) -> Result<()> {
        let index = self.store.append(Message::assistant(text))?;
        self.speak(index, text, context).await;
        Ok(())
    }

    async fn apologize(&self, context: &TurnContext) {
        match self.store.append(Message::assistant(self.phrases.apology.as_str())) {
            Ok(index) => self.speak(index, &self.phrases.apology, context).await,
            Err(e) => tracing::error!(error = %e, "failed to record apology"),
        }
    }

    async fn speak(&self, index: usize, text: &str, context: &TurnContext) {
        if !self.speech_settings.enabled {
            return;
        }
        let voice = self
            .speech_settings
            .voice_override
            .as_deref()
            .unwrap_or(&context.language.voice_id);
        let outcome = self
            .speech
            .speak_message(Some(index), text, self.speech_settings.max_length, voice)
            .await;
        tracing::debug!(?outcome, index, "reply speech");
    }

    /// Current state of the turn machine
    #[must_use]
    pub fn state(&self) -> TurnState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the user and language
    #[must_use]
    pub fn context(&self) -> TurnContext {
        self.context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the user context; applies from the next turn
    pub fn set_user(&self, user: UserContext) {
        self.context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .user = user;
    }

    /// Switch the active language; applies from the next turn
    pub fn set_language(&self, language: LanguageProfile) {
        self.context
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .language = language;
    }
}
