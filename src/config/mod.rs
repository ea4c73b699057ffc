//! Configuration management for the Harvest assistant
//!
//! Precedence is env > `config.toml` > built-in default.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::voice::{LanguageProfile, PollPolicy};
use crate::{Error, Result};

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Default reply language code
    pub language: String,

    pub llm: LlmConfig,

    pub transcription: TranscriptionConfig,

    pub speech: SpeechConfig,

    pub recording: RecordingConfig,

    pub marketplace: MarketplaceConfig,

    /// Language profiles; built-ins fill any gaps
    pub languages: Vec<LanguageProfile>,

    pub phrases: Phrases,

    pub api_keys: ApiKeys,
}

/// Chat completion endpoint settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request transport timeout
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriptionBackend {
    /// OpenAI Whisper, synchronous
    #[default]
    Whisper,
    /// Deepgram, synchronous
    Deepgram,
    /// AssemblyAI, upload then poll
    AssemblyAi,
}

impl TranscriptionBackend {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Whisper => "whisper-1",
            Self::Deepgram => "nova-2",
            Self::AssemblyAi => "best",
        }
    }
}

impl FromStr for TranscriptionBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            "assemblyai" | "assembly" => Ok(Self::AssemblyAi),
            other => Err(Error::Config(format!("unknown transcription provider: {other}"))),
        }
    }
}

/// Speech-to-text settings, fixed for a session's lifetime
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub backend: TranscriptionBackend,
    pub model: String,
    /// Bounds on job-based polling
    pub poll: PollPolicy,
    /// Per-request transport timeout
    pub timeout: Duration,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        let backend = TranscriptionBackend::default();
        Self {
            backend,
            model: backend.default_model().to_string(),
            poll: PollPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthesisBackend {
    #[default]
    OpenAi,
    ElevenLabs,
}

impl SynthesisBackend {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "tts-1",
            Self::ElevenLabs => "eleven_multilingual_v2",
        }
    }
}

impl FromStr for SynthesisBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" | "eleven_labs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown speech provider: {other}"))),
        }
    }
}

/// Spoken reply settings
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Speak assistant replies
    pub enabled: bool,
    pub backend: SynthesisBackend,
    pub model: String,
    /// Voice for every language instead of the profile's
    pub voice_override: Option<String>,
    /// Speed multiplier (OpenAI only, 0.25 to 4.0)
    pub speed: f32,
    /// Longest reply spoken, in characters
    pub max_length: usize,
    /// Per-request transport timeout
    pub timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        let backend = SynthesisBackend::default();
        Self {
            enabled: true,
            backend,
            model: backend.default_model().to_string(),
            voice_override: None,
            speed: 1.0,
            max_length: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Microphone recording settings
#[derive(Debug, Clone, Copy)]
pub struct RecordingConfig {
    /// Hard wall-clock limit per recording
    pub timeout: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

/// Marketplace REST API settings
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Canned user-facing messages
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Phrases {
    /// Reply when a turn fails
    pub apology: String,
    /// Reply when a recording produced no words
    pub didnt_catch: String,
    /// Reply when speech-to-text failed
    pub transcription_failed: String,
    /// Reply when the microphone could not be opened
    pub microphone_unavailable: String,
    /// Reply when speech arrives while a turn is still running
    pub busy: String,
    /// Status shown while recording; `{seconds}` is replaced
    pub listening: String,
    /// Status shown after capture stops
    pub processing: String,
    /// Status shown while waiting for the transcript
    pub transcribing: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            apology: "Sorry, something went wrong. Please try again.".to_string(),
            didnt_catch: "Sorry, I didn't catch that. Could you say it again?".to_string(),
            transcription_failed: "Sorry, I couldn't understand the recording. Please try again."
                .to_string(),
            microphone_unavailable:
                "I can't access the microphone. Please check permissions and try again."
                    .to_string(),
            busy: "I'm still working on your last request. Please say that again in a moment."
                .to_string(),
            listening: "Listening… {seconds}s".to_string(),
            processing: "Processing…".to_string(),
            transcribing: "Transcribing…".to_string(),
        }
    }
}

impl Phrases {
    /// Listening status for `seconds` elapsed
    #[must_use]
    pub fn listening_for(&self, seconds: u64) -> String {
        self.listening.replace("{seconds}", &seconds.to_string())
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, Whisper and TTS)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `AssemblyAI` API key (optional STT)
    pub assemblyai: Option<SecretString>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<SecretString>,

    /// Bearer token for the marketplace API
    pub marketplace: Option<SecretString>,
}

impl Config {
    /// Load configuration from the environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn from_sources(
        fc: file::HarvestConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let secs = |value: Option<u64>, default: Duration| value.map_or(default, Duration::from_secs);

        // API keys (env > toml > None)
        let key = |var: &str, file_value: Option<String>| {
            env(var)
                .or(file_value)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        let api_keys = ApiKeys {
            openai: key("OPENAI_API_KEY", fc.api_keys.openai),
            deepgram: key("DEEPGRAM_API_KEY", fc.api_keys.deepgram),
            assemblyai: key("ASSEMBLYAI_API_KEY", fc.api_keys.assemblyai),
            elevenlabs: key("ELEVENLABS_API_KEY", fc.api_keys.elevenlabs),
            marketplace: key("HARVEST_MARKETPLACE_TOKEN", fc.api_keys.marketplace),
        };

        let llm_default = LlmConfig::default();
        let llm = LlmConfig {
            base_url: env("HARVEST_LLM_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or(llm_default.base_url),
            model: env("HARVEST_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(llm_default.model),
            temperature: fc.llm.temperature.unwrap_or(llm_default.temperature),
            max_tokens: fc.llm.max_tokens.unwrap_or(llm_default.max_tokens),
            timeout: secs(fc.llm.timeout_secs, llm_default.timeout),
        };

        let stt = fc.transcription;
        let backend: TranscriptionBackend = env("HARVEST_TRANSCRIPTION_PROVIDER")
            .or(stt.provider)
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();
        let poll_default = PollPolicy::default();
        let poll = PollPolicy {
            interval: stt
                .poll_interval_secs
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
                .unwrap_or(poll_default.interval),
            max_attempts: stt.max_poll_attempts.unwrap_or(poll_default.max_attempts).max(1),
            deadline: secs(stt.deadline_secs, poll_default.deadline),
        };
        let transcription = TranscriptionConfig {
            backend,
            model: stt.model.unwrap_or_else(|| backend.default_model().to_string()),
            poll,
            timeout: secs(stt.timeout_secs, TranscriptionConfig::default().timeout),
        };

        let tts = fc.speech;
        let speech_default = SpeechConfig::default();
        let backend: SynthesisBackend = env("HARVEST_SPEECH_PROVIDER")
            .or(tts.provider)
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();
        let speech = SpeechConfig {
            enabled: tts.enabled.unwrap_or(speech_default.enabled),
            backend,
            model: tts.model.unwrap_or_else(|| backend.default_model().to_string()),
            voice_override: tts.voice,
            speed: tts.speed.unwrap_or(speech_default.speed).clamp(0.25, 4.0),
            max_length: tts.max_length.unwrap_or(speech_default.max_length),
            timeout: secs(tts.timeout_secs, speech_default.timeout),
        };

        let recording = RecordingConfig {
            timeout: secs(fc.recording.timeout_secs, RecordingConfig::default().timeout),
        };

        let marketplace_default = MarketplaceConfig::default();
        let marketplace = MarketplaceConfig {
            base_url: env("HARVEST_MARKETPLACE_URL")
                .or(fc.marketplace.base_url)
                .unwrap_or(marketplace_default.base_url),
            timeout: secs(fc.marketplace.timeout_secs, marketplace_default.timeout),
        };

        let language = env("HARVEST_LANGUAGE")
            .or(fc.language)
            .unwrap_or_else(|| "en".to_string());

        let config = Self {
            language,
            llm,
            transcription,
            speech,
            recording,
            marketplace,
            languages: fc.languages,
            phrases: fc.phrases.unwrap_or_default(),
            api_keys,
        };

        tracing::debug!(
            llm_model = %config.llm.model,
            transcription = ?config.transcription.backend,
            speech = ?config.speech.backend,
            language = %config.language,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Profile for a language code, honoring configured overrides
    #[must_use]
    pub fn language_profile(&self, code: &str) -> LanguageProfile {
        LanguageProfile::resolve(&self.languages, code)
    }
}
