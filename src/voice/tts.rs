//! Text-to-speech (TTS) synthesis

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{ApiKeys, SpeechConfig, SynthesisBackend};
use crate::{Error, Result};

/// Remote speech synthesis
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with `voice`, returning MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the request fails
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>>;
}

/// Build the configured synthesizer
///
/// # Errors
///
/// Returns error if the provider's API key is missing
pub fn synthesizer_from_config(config: &SpeechConfig, keys: &ApiKeys) -> Result<Arc<dyn Synthesizer>> {
    let synthesizer: Arc<dyn Synthesizer> = match config.backend {
        SynthesisBackend::OpenAi => {
            let key = keys
                .openai
                .clone()
                .filter(|k| !k.expose_secret().is_empty())
                .ok_or_else(|| Error::Config("OpenAI API key required for TTS".to_string()))?;
            Arc::new(OpenAiTts::new(key, config)?)
        }
        SynthesisBackend::ElevenLabs => {
            let key = keys
                .elevenlabs
                .clone()
                .filter(|k| !k.expose_secret().is_empty())
                .ok_or_else(|| Error::Config("ElevenLabs API key required for TTS".to_string()))?;
            Arc::new(ElevenLabsTts::new(key, config)?)
        }
    };
    Ok(synthesizer)
}

/// OpenAI speech endpoint
pub struct OpenAiTts {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    speed: f32,
}

impl OpenAiTts {
    /// Create an OpenAI TTS client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: SecretString, config: &SpeechConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            api_key,
            model: config.model.clone(),
            speed: config.speed,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice,
            speed: self.speed,
            response_format: "mp3",
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("OpenAI TTS request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

/// ElevenLabs text-to-speech endpoint
pub struct ElevenLabsTts {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl ElevenLabsTts {
    /// Create an ElevenLabs client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: SecretString, config: &SpeechConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsTts {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("https://api.elevenlabs.io/v1/text-to-speech/{voice}");
        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("ElevenLabs request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_config_error() {
        let config = SpeechConfig {
            backend: SynthesisBackend::ElevenLabs,
            ..SpeechConfig::default()
        };
        let keys = ApiKeys {
            openai: Some(SecretString::from("sk-test")),
            ..ApiKeys::default()
        };
        assert!(matches!(
            synthesizer_from_config(&config, &keys),
            Err(Error::Config(_))
        ));
        assert!(synthesizer_from_config(&SpeechConfig::default(), &keys).is_ok());
    }
}
