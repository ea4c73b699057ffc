//! Voice processing module
//!
//! Handles microphone capture, speech-to-text, text-to-speech and playback,
//! plus the recording and speaking lifecycles built on them.

mod capture;
mod jobs;
mod language;
mod playback;
mod recording;
mod speech;
mod stt;
mod tts;

pub use capture::{CaptureSession, CpalMicrophone, Microphone, SAMPLE_RATE, samples_to_wav};
pub use jobs::{AssemblyAiBackend, JobBackend, JobStatus, JobTranscriber, PollPolicy};
pub use language::LanguageProfile;
pub use playback::{AudioSink, CpalPlayback};
pub use recording::{
    ControllerState, RecordingController, RecordingOutcome, RecordingSession, RecordingStatus,
};
pub use speech::{
    PlaybackSession, PlaybackStatus, SpeechOutcome, SpeechOutput, TRUNCATION_MARKER, plain_text,
    truncate_for_speech,
};
pub use stt::{
    DeepgramTranscriber, TranscriptionProvider, WhisperTranscriber, transcriber_from_config,
};
pub use tts::{ElevenLabsTts, OpenAiTts, Synthesizer, synthesizer_from_config};
