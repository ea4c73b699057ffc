//! Spoken replies: markdown cleanup, synthesis and interruptible playback

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;
use tokio::sync::oneshot;

use super::playback::AudioSink;
use super::tts::Synthesizer;

/// Marker appended to text cut short for speech
pub const TRUNCATION_MARKER: char = '…';

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*\n?").expect("valid regex"));
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").expect("valid regex"));
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]*").expect("valid regex"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[-*+][ \t]+").expect("valid regex"));
static QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*>[ \t]?").expect("valid regex"));
static STRONG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*|__([^_]+)__").expect("valid regex"));
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*|\b_([^_\n]+)_\b").expect("valid regex"));
static STRIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~([^~]+)~~").expect("valid regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Reduce markdown to text suitable for speaking
#[must_use]
pub fn plain_text(markdown: &str) -> String {
    let text = CODE_FENCE.replace_all(markdown, "");
    let text = IMAGE.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "");
    let text = QUOTE.replace_all(&text, "");
    let text = STRONG.replace_all(&text, "$1$2");
    let text = EMPHASIS.replace_all(&text, "$1$2");
    let text = STRIKE.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Cut `text` to at most `max_chars` characters, marking the cut
///
/// Prefers breaking at a word boundary when one is close.
#[must_use]
pub fn truncate_for_speech(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let keep: String = text.chars().take(max_chars - 1).collect();
    let cut = match keep.rfind(char::is_whitespace) {
        Some(idx) if keep[..idx].chars().count() * 2 >= max_chars - 1 => &keep[..idx],
        _ => keep.as_str(),
    };

    format!("{}{TRUNCATION_MARKER}", cut.trim_end())
}

/// Whether something is being spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Speaking,
}

/// Snapshot of the playback slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackSession {
    pub status: PlaybackStatus,
    /// Conversation index of the message being spoken
    pub message_index: Option<usize>,
}

/// How a `speak` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Playback ran to its natural end
    Finished,
    /// `stop` or a newer `speak` cut it short
    Stopped,
    /// Nothing to say, or no synthesizer/sink configured
    Skipped,
    /// Synthesis or playback failed; already logged
    Failed,
}

struct ActivePlayback {
    id: u64,
    message_index: Option<usize>,
    stop: oneshot::Sender<()>,
}

/// Speaks assistant replies, one at a time
///
/// Failures never surface past this type: the reply text is already in the
/// conversation, so a failed synthesis just means silence.
pub struct SpeechOutput {
    synthesizer: Option<Arc<dyn Synthesizer>>,
    sink: Option<Arc<dyn AudioSink>>,
    active: Mutex<Option<ActivePlayback>>,
    next_id: AtomicU64,
}

impl SpeechOutput {
    #[must_use]
    pub fn new(synthesizer: Option<Arc<dyn Synthesizer>>, sink: Option<Arc<dyn AudioSink>>) -> Self {
        Self {
            synthesizer,
            sink,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Output that never speaks
    #[must_use]
    pub fn silent() -> Self {
        Self::new(None, None)
    }

    /// Whether a synthesizer and sink are both present
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.synthesizer.is_some() && self.sink.is_some()
    }

    /// Speak `text`, resolving when playback ends
    pub async fn speak(&self, text: &str, max_length: usize, voice: &str) -> SpeechOutcome {
        self.speak_message(None, text, max_length, voice).await
    }

    /// Speak the conversation message at `message_index`
    ///
    /// Any playback already running is stopped first, even when nothing is left to say.
    pub async fn speak_message(
        &self,
        message_index: Option<usize>,
        text: &str,
        max_length: usize,
        voice: &str,
    ) -> SpeechOutcome {
        let (Some(synthesizer), Some(sink)) = (self.synthesizer.clone(), self.sink.clone()) else {
            return SpeechOutcome::Skipped;
        };

        let spoken = truncate_for_speech(&plain_text(text), max_length);

        let (stop_tx, stop_rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut active = self.lock();
            if let Some(prior) = active.take() {
                tracing::debug!(prior = prior.id, "stopping previous playback");
                let _ = prior.stop.send(());
            }
            if spoken.is_empty() {
                return SpeechOutcome::Skipped;
            }
            *active = Some(ActivePlayback {
                id,
                message_index,
                stop: stop_tx,
            });
        }
        tracing::debug!(id, chars = spoken.chars().count(), voice = %voice, "speaking");

        let outcome = tokio::select! {
            biased;
            _ = stop_rx => SpeechOutcome::Stopped,
            result = async {
                let audio = synthesizer.synthesize(&spoken, voice).await?;
                sink.play(audio).await
            } => match result {
                Ok(()) => SpeechOutcome::Finished,
                Err(e) => {
                    tracing::warn!(error = %e, "speech output failed");
                    SpeechOutcome::Failed
                }
            },
        };

        {
            let mut active = self.lock();
            if active.as_ref().is_some_and(|a| a.id == id) {
                *active = None;
            }
        }
        tracing::debug!(id, ?outcome, "speech ended");
        outcome
    }

    /// Halt playback; does nothing when idle
    pub fn stop(&self) {
        if let Some(active) = self.lock().take() {
            tracing::debug!(id = active.id, "playback stopped");
            let _ = active.stop.send(());
        }
    }

    /// Current playback snapshot
    #[must_use]
    pub fn session(&self) -> PlaybackSession {
        self.lock()
            .as_ref()
            .map_or_else(PlaybackSession::default, |a| PlaybackSession {
                status: PlaybackStatus::Speaking,
                message_index: a.message_index,
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActivePlayback>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
