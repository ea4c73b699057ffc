//! Speech-to-text providers

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::jobs::{AssemblyAiBackend, JobTranscriber};
use super::language::LanguageProfile;
use crate::config::{ApiKeys, TranscriptionBackend, TranscriptionConfig};
use crate::{Error, Result};

/// Turns recorded audio into text
///
/// Selected once per session from configuration.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe WAV audio spoken in `language`
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` on network/service failure or timeout
    async fn transcribe(&self, audio: &[u8], language: &LanguageProfile) -> Result<String>;
}

/// Build the configured provider
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn transcriber_from_config(
    config: &TranscriptionConfig,
    keys: &ApiKeys,
) -> Result<Arc<dyn TranscriptionProvider>> {
    let provider: Arc<dyn TranscriptionProvider> = match config.backend {
        TranscriptionBackend::Whisper => Arc::new(WhisperTranscriber::new(
            require_key(keys.openai.as_ref(), "OpenAI")?,
            config,
        )?),
        TranscriptionBackend::Deepgram => Arc::new(DeepgramTranscriber::new(
            require_key(keys.deepgram.as_ref(), "Deepgram")?,
            config,
        )?),
        TranscriptionBackend::AssemblyAi => Arc::new(JobTranscriber::new(
            AssemblyAiBackend::new(require_key(keys.assemblyai.as_ref(), "AssemblyAI")?, config)?,
            config.poll,
        )),
    };

    tracing::info!(backend = ?config.backend, model = %config.model, "transcription provider ready");
    Ok(provider)
}

fn require_key(key: Option<&SecretString>, provider: &str) -> Result<SecretString> {
    key.filter(|k| !k.expose_secret().is_empty())
        .cloned()
        .ok_or_else(|| Error::Config(format!("{provider} API key required for transcription")))
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Synchronous transcription with OpenAI Whisper
pub struct WhisperTranscriber {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl WhisperTranscriber {
    /// Create a Whisper client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: SecretString, config: &TranscriptionConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], language: &LanguageProfile) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), language = %language.code, "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("language", language.code.clone());

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                Error::Transcription(format!("Whisper request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Transcription(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse Whisper response: {e}")))?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramResponse {
    fn into_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

/// Synchronous transcription with Deepgram
pub struct DeepgramTranscriber {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl DeepgramTranscriber {
    /// Create a Deepgram client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: SecretString, config: &TranscriptionConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for DeepgramTranscriber {
    async fn transcribe(&self, audio: &[u8], language: &LanguageProfile) -> Result<String> {
        tracing::debug!(
            audio_bytes = audio.len(),
            locale = %language.recognition_locale,
            "starting Deepgram transcription"
        );

        let response = self
            .client
            .post("https://api.deepgram.com/v1/listen")
            .query(&[
                ("model", self.model.as_str()),
                ("punctuate", "true"),
                ("language", language.recognition_locale.as_str()),
            ])
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                Error::Transcription(format!("Deepgram request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Transcription(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse Deepgram response: {e}")))?;

        let transcript = result.into_transcript();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deepgram_takes_first_alternative() {
        let raw = r#"{"results":{"channels":[{"alternatives":[
            {"transcript":"aloo ka bhav kya hai"},
            {"transcript":"alu ka bhav"}
        ]}]}}"#;
        let parsed: DeepgramResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_transcript(), "aloo ka bhav kya hai");
    }

    #[test]
    fn deepgram_empty_channels_yield_empty_text() {
        let parsed: DeepgramResponse = serde_json::from_str(r#"{"results":{"channels":[]}}"#).unwrap();
        assert_eq!(parsed.into_transcript(), "");
    }

    #[test]
    fn missing_key_is_config_error() {
        let err = transcriber_from_config(&TranscriptionConfig::default(), &ApiKeys::default());
        assert!(matches!(err, Err(Error::Config(_))));
    }
}
