//! One assistant conversation and the components bound to it
//!
//! A `Session` owns its conversation log and wires injected collaborators
//! into the turn orchestrator, recording controller and speech output.
//! Sessions share nothing, so several can run side by side.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::agent::{SpeechSettings, TurnContext, TurnOrchestrator, TurnOutcome, TurnState};
use crate::config::{Config, Phrases};
use crate::conversation::{ConversationStore, Message};
use crate::llm::{CompletionClient, prompt};
use crate::tools::{ToolRegistry, UserContext};
use crate::voice::{
    AudioSink, ControllerState, LanguageProfile, Microphone, PlaybackSession, RecordingController,
    RecordingOutcome, RecordingSession, SpeechOutput, Synthesizer, TranscriptionProvider,
};

/// External services a session talks to
pub struct Collaborators {
    pub completion: Arc<dyn CompletionClient>,
    pub transcriber: Arc<dyn TranscriptionProvider>,
    /// Absent when replies are not spoken
    pub synthesizer: Option<Arc<dyn Synthesizer>>,
    pub sink: Option<Arc<dyn AudioSink>>,
    pub microphone: Arc<dyn Microphone>,
    pub tools: ToolRegistry,
}

/// Per-session settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user: UserContext,
    pub language: LanguageProfile,
    /// Hard limit on one recording
    pub recording_timeout: Duration,
    pub speech: SpeechSettings,
    pub phrases: Phrases,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user: UserContext::default(),
            language: LanguageProfile::default(),
            recording_timeout: Duration::from_secs(10),
            speech: SpeechSettings::default(),
            phrases: Phrases::default(),
        }
    }
}

impl SessionSettings {
    /// Settings for `user` from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config, user: UserContext) -> Self {
        Self {
            user,
            language: config.language_profile(&config.language),
            recording_timeout: config.recording.timeout,
            speech: SpeechSettings::from(&config.speech),
            phrases: config.phrases.clone(),
        }
    }
}

/// A live conversation with the assistant
pub struct Session {
    id: Uuid,
    store: Arc<ConversationStore>,
    turns: Arc<TurnOrchestrator>,
    recorder: RecordingController,
    speech: Arc<SpeechOutput>,
    recording_timeout: Duration,
}

impl Session {
    /// Start a conversation, greeting the user
    #[must_use]
    pub fn open(collaborators: Collaborators, settings: SessionSettings) -> Self {
        let Collaborators {
            completion,
            transcriber,
            synthesizer,
            sink,
            microphone,
            tools,
        } = collaborators;

        let id = Uuid::new_v4();
        let store = Arc::new(ConversationStore::new());
        let speech = Arc::new(SpeechOutput::new(synthesizer, sink));

        let greeting = prompt::greeting(&settings.user);
        store.set_greeting(&greeting);

        let turns = Arc::new(TurnOrchestrator::new(
            Arc::clone(&store),
            completion,
            tools,
            Arc::clone(&speech),
            settings.speech,
            settings.phrases.clone(),
            TurnContext {
                user: settings.user,
                language: settings.language,
            },
        ));

        let recorder = RecordingController::new(
            microphone,
            transcriber,
            Arc::clone(&store),
            Arc::clone(&turns),
            settings.phrases,
        );

        tracing::info!(session = %id, "session opened");

        Self {
            id,
            store,
            turns,
            recorder,
            speech,
            recording_timeout: settings.recording_timeout,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Run a turn for typed input
    pub async fn submit_user_input(&self, text: &str) -> TurnOutcome {
        self.turns.submit_user_input(text).await
    }

    /// Record with the configured timeout in the active language
    pub async fn record(&self) -> RecordingOutcome {
        self.record_with(self.recording_timeout).await
    }

    /// Record with an explicit timeout
    pub async fn record_with(&self, timeout: Duration) -> RecordingOutcome {
        let language = self.turns.context().language;
        self.recorder.record(timeout, &language).await
    }

    /// Stop listening and transcribe; false when not listening
    pub fn stop_recording(&self) -> bool {
        self.recorder.stop()
    }

    /// Halt any reply being spoken
    pub fn stop_speaking(&self) {
        self.speech.stop();
    }

    /// Change who the assistant is talking to
    ///
    /// The greeting is regenerated while it is still the only message.
    pub fn set_user_context(&self, user: UserContext) {
        let greeting = prompt::greeting(&user);
        if self.store.set_greeting(&greeting) {
            tracing::debug!(session = %self.id, "greeting regenerated");
        }
        self.turns.set_user(user);
    }

    /// Switch the reply, recognition and voice language
    pub fn set_language(&self, language: LanguageProfile) {
        tracing::info!(session = %self.id, language = %language.code, "language changed");
        self.turns.set_language(language);
    }

    /// Conversation so far, including any ephemeral status
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.store.snapshot()
    }

    #[must_use]
    pub fn turn_state(&self) -> TurnState {
        self.turns.state()
    }

    #[must_use]
    pub fn recording_state(&self) -> ControllerState {
        self.recorder.state()
    }

    #[must_use]
    pub fn recording_session(&self) -> RecordingSession {
        self.recorder.session()
    }

    #[must_use]
    pub fn playback_session(&self) -> PlaybackSession {
        self.speech.session()
    }

    #[must_use]
    pub fn user(&self) -> UserContext {
        self.turns.context().user
    }

    #[must_use]
    pub fn language(&self) -> LanguageProfile {
        self.turns.context().language
    }

    /// Cancel recording and playback
    pub fn close(&self) {
        self.recorder.cancel();
        self.speech.stop();
        tracing::info!(session = %self.id, "session closed");
    }
}
