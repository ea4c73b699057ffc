//! Microphone recording lifecycle
//!
//! A recording listens until stopped or timed out, shows its progress in the
//! conversation's ephemeral slot, then hands the transcript to the turn
//! orchestrator. Starting a new recording cancels the previous one, and a
//! cancelled recording's audio is dropped without being transcribed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use super::capture::Microphone;
use super::language::LanguageProfile;
use super::stt::TranscriptionProvider;
use crate::agent::{TurnOrchestrator, TurnOutcome};
use crate::config::Phrases;
use crate::conversation::{ConversationStore, Message};

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Listening,
    Stopping,
}

/// User-visible progress of the latest recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingStatus {
    #[default]
    Idle,
    Listening,
    Processing,
    Transcribing,
    Completed,
    Error,
}

/// Snapshot of the latest recording
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordingSession {
    pub status: RecordingStatus,
    pub elapsed_seconds: u64,
    /// Language code the audio is transcribed in
    pub language: String,
}

/// How a recording attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Transcript was passed to the turn orchestrator
    Submitted(TurnOutcome),
    /// Transcript was blank; the "didn't catch that" reply was appended
    NothingHeard,
    /// Another turn was running; the transcript was dropped and the user
    /// asked to repeat it
    Busy(String),
    /// Superseded by a newer recording or cancelled; audio discarded
    Cancelled,
    /// Microphone could not be opened
    PermissionDenied(String),
    /// Speech-to-text failed; an error reply was appended
    TranscriptionFailed(String),
}

enum Signal {
    Stop,
    Cancel,
}

struct Attempt {
    id: u64,
    state: ControllerState,
    signal: Option<oneshot::Sender<Signal>>,
}

#[derive(Default)]
struct Inner {
    attempt: Option<Attempt>,
    session: RecordingSession,
}

/// Owns the microphone while listening
pub struct RecordingController {
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn TranscriptionProvider>,
    store: Arc<ConversationStore>,
    turns: Arc<TurnOrchestrator>,
    phrases: Phrases,
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl RecordingController {
    #[must_use]
    pub fn new(
        microphone: Arc<dyn Microphone>,
        transcriber: Arc<dyn TranscriptionProvider>,
        store: Arc<ConversationStore>,
        turns: Arc<TurnOrchestrator>,
        phrases: Phrases,
    ) -> Self {
        Self {
            microphone,
            transcriber,
            store,
            turns,
            phrases,
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record one utterance and submit its transcript
    ///
    /// Resolves once the turn the transcript started has finished, or when
    /// the attempt ends without one.
    pub async fn record(&self, timeout: Duration, language: &LanguageProfile) -> RecordingOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (signal_tx, mut signal_rx) = oneshot::channel();
        {
            let mut inner = self.lock();
            if let Some(mut prior) = inner.attempt.take() {
                tracing::debug!(prior = prior.id, "cancelling previous recording");
                if let Some(signal) = prior.signal.take() {
                    let _ = signal.send(Signal::Cancel);
                }
            }
            inner.attempt = Some(Attempt {
                id,
                state: ControllerState::Listening,
                signal: Some(signal_tx),
            });
            inner.session = RecordingSession {
                status: RecordingStatus::Listening,
                elapsed_seconds: 0,
                language: language.code.clone(),
            };
        }

        let capture = match self.microphone.open().await {
            Ok(capture) => capture,
            Err(e) => {
                tracing::warn!(error = %e, "microphone unavailable");
                if !self.finish_attempt(id, RecordingStatus::Error) {
                    return RecordingOutcome::Cancelled;
                }
                self.store.remove_ephemeral();
                self.reply(&self.phrases.microphone_unavailable);
                return RecordingOutcome::PermissionDenied(e.to_string());
            }
        };

        tracing::debug!(id, timeout_ms = timeout.as_millis(), language = %language.code, "listening");
        let started = Instant::now();
        let deadline = tokio::time::sleep_until(started + timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval_at(started + Duration::from_secs(1), Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.store.replace_ephemeral(self.phrases.listening_for(0));

        loop {
            tokio::select! {
                biased;
                signal = &mut signal_rx => match signal {
                    Ok(Signal::Stop) => {
                        tracing::debug!(id, "recording stopped");
                        break;
                    }
                    Ok(Signal::Cancel) | Err(_) => {
                        tracing::debug!(id, "recording cancelled, audio discarded");
                        if self.finish_attempt(id, RecordingStatus::Idle) {
                            self.store.remove_ephemeral();
                        }
                        return RecordingOutcome::Cancelled;
                    }
                },
                () = &mut deadline => {
                    tracing::debug!(id, "recording timed out");
                    self.begin_stopping(id);
                    break;
                }
                _ = ticker.tick() => {
                    let elapsed = started.elapsed().as_secs();
                    if self.update_session(id, |s| s.elapsed_seconds = elapsed) {
                        self.store.replace_ephemeral(self.phrases.listening_for(elapsed));
                    }
                }
            }
        }

        if !self.update_session(id, |s| s.status = RecordingStatus::Processing) {
            return RecordingOutcome::Cancelled;
        }
        self.store.replace_ephemeral(self.phrases.processing.as_str());

        let audio = match tokio::task::spawn_blocking(move || capture.finish()).await {
            Ok(Ok(audio)) => audio,
            Ok(Err(e)) => return self.transcription_failed(id, &e.to_string()),
            Err(e) => return self.transcription_failed(id, &e.to_string()),
        };

        if !self.update_session(id, |s| s.status = RecordingStatus::Transcribing) {
            return RecordingOutcome::Cancelled;
        }
        self.store.replace_ephemeral(self.phrases.transcribing.as_str());

        let result = self.transcriber.transcribe(&audio, language).await;
        if !self.is_current(id) {
            tracing::debug!(id, "recording superseded during transcription");
            return RecordingOutcome::Cancelled;
        }

        match result {
            Ok(text) if text.trim().is_empty() => {
                self.finish_attempt(id, RecordingStatus::Completed);
                self.store.remove_ephemeral();
                tracing::info!(id, "empty transcript");
                self.reply(&self.phrases.didnt_catch);
                RecordingOutcome::NothingHeard
            }
            Ok(text) => {
                self.finish_attempt(id, RecordingStatus::Completed);
                self.store.remove_ephemeral();
                match self.turns.submit_transcript(&text).await {
                    TurnOutcome::Busy => {
                        tracing::warn!(id, "turn in flight, transcript not submitted");
                        self.reply(&self.phrases.busy);
                        RecordingOutcome::Busy(text)
                    }
                    outcome => RecordingOutcome::Submitted(outcome),
                }
            }
            Err(e) => self.transcription_failed(id, &e.to_string()),
        }
    }

    /// End listening and transcribe what was captured
    ///
    /// Returns false (and changes nothing) unless currently listening.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        let Some(attempt) = inner.attempt.as_mut() else {
            return false;
        };
        if attempt.state != ControllerState::Listening {
            return false;
        }
        attempt.state = ControllerState::Stopping;
        if let Some(signal) = attempt.signal.take() {
            let _ = signal.send(Signal::Stop);
        }
        true
    }

    /// Abandon the current recording, discarding its audio
    pub fn cancel(&self) -> bool {
        let prior = {
            let mut inner = self.lock();
            let prior = inner.attempt.take();
            if prior.is_some() {
                inner.session.status = RecordingStatus::Idle;
            }
            prior
        };
        let Some(mut prior) = prior else {
            return false;
        };
        if let Some(signal) = prior.signal.take() {
            let _ = signal.send(Signal::Cancel);
        }
        self.store.remove_ephemeral();
        tracing::debug!(id = prior.id, "recording cancelled");
        true
    }

    /// Controller lifecycle state
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.lock()
            .attempt
            .as_ref()
            .map_or(ControllerState::Idle, |a| a.state)
    }

    /// Snapshot of the latest recording
    #[must_use]
    pub fn session(&self) -> RecordingSession {
        self.lock().session.clone()
    }

    fn transcription_failed(&self, id: u64, reason: &str) -> RecordingOutcome {
        tracing::warn!(id, error = %reason, "transcription failed");
        if !self.finish_attempt(id, RecordingStatus::Error) {
            return RecordingOutcome::Cancelled;
        }
        self.store.remove_ephemeral();
        self.reply(&self.phrases.transcription_failed);
        RecordingOutcome::TranscriptionFailed(reason.to_string())
    }

    /// Append a recording reply; may land mid-turn, never inside a tool exchange
    fn reply(&self, text: &str) {
        if let Err(e) = self.store.append(Message::assistant(text)) {
            tracing::error!(error = %e, "failed to append recording reply");
        }
    }

    fn begin_stopping(&self, id: u64) {
        let mut inner = self.lock();
        if let Some(attempt) = inner.attempt.as_mut().filter(|a| a.id == id) {
            attempt.state = ControllerState::Stopping;
            attempt.signal = None;
        }
    }

    fn is_current(&self, id: u64) -> bool {
        self.lock().attempt.as_ref().is_some_and(|a| a.id == id)
    }

    /// Apply `update` to the session if `id` is still the live attempt
    fn update_session(&self, id: u64, update: impl FnOnce(&mut RecordingSession)) -> bool {
        let mut inner = self.lock();
        if inner.attempt.as_ref().is_some_and(|a| a.id == id) {
            update(&mut inner.session);
            true
        } else {
            false
        }
    }

    /// Release the controller if `id` still owns it
    fn finish_attempt(&self, id: u64, status: RecordingStatus) -> bool {
        let mut inner = self.lock();
        if inner.attempt.as_ref().is_some_and(|a| a.id == id) {
            inner.attempt = None;
            inner.session.status = status;
            tracing::debug!(id, ?status, "recording finished");
            true
        } else {
            false
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
