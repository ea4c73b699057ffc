//! TOML configuration file loading
//!
//! Supports `~/.config/harvest/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use super::Phrases;
use crate::voice::LanguageProfile;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HarvestConfigFile {
    /// Default reply language code (e.g. "hi")
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    #[serde(default)]
    pub speech: SpeechFileConfig,

    #[serde(default)]
    pub recording: RecordingFileConfig,

    #[serde(default)]
    pub marketplace: MarketplaceFileConfig,

    /// Language profiles overriding the built-in ones
    #[serde(default)]
    pub languages: Vec<LanguageProfile>,

    /// User-facing canned messages
    #[serde(default)]
    pub phrases: Option<Phrases>,

    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible base URL
    pub base_url: Option<String>,
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    /// "whisper", "deepgram" or "assemblyai"
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Seconds between job status checks
    pub poll_interval_secs: Option<f64>,
    pub max_poll_attempts: Option<u32>,
    /// Ceiling on a whole job-based transcription, in seconds
    pub deadline_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    pub enabled: Option<bool>,
    /// "openai" or "elevenlabs"
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Voice used for every language instead of the profile's
    pub voice: Option<String>,
    pub speed: Option<f32>,
    /// Longest reply spoken, in characters
    pub max_length: Option<usize>,
    pub timeout_secs: Option<u64>,
}

/// Microphone recording configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecordingFileConfig {
    pub timeout_secs: Option<u64>,
}

/// Marketplace REST API configuration
#[derive(Debug, Default, Deserialize)]
pub struct MarketplaceFileConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub assemblyai: Option<String>,
    pub elevenlabs: Option<String>,
    pub marketplace: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HarvestConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HarvestConfigFile {
    let Some(path) = config_file_path() else {
        return HarvestConfigFile::default();
    };

    if !path.exists() {
        return HarvestConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            HarvestConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HarvestConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config(content: &str) -> crate::Result<HarvestConfigFile> {
    let config = toml::from_str(content)?;
    tracing::info!("loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/harvest/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("harvest").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let fc = parse_config(
            r#"
            language = "mr"

            [transcription]
            provider = "assemblyai"
            max_poll_attempts = 20

            [[languages]]
            code = "mr"
            name = "Marathi"
            recognitionLocale = "mr-IN"
            voiceId = "nova"

            [phrases]
            apology = "Maaf kijiye."
            "#,
        )
        .unwrap();

        assert_eq!(fc.language.as_deref(), Some("mr"));
        assert_eq!(fc.transcription.provider.as_deref(), Some("assemblyai"));
        assert_eq!(fc.transcription.max_poll_attempts, Some(20));
        assert_eq!(fc.languages[0].voice_id, "nova");
        let phrases = fc.phrases.unwrap();
        assert_eq!(phrases.apology, "Maaf kijiye.");
        assert_eq!(phrases.didnt_catch, Phrases::default().didnt_catch);
        assert!(fc.llm.model.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(parse_config("[llm\nmodel = 1").is_err());
    }
}
