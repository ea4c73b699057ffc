//! Error types for the Harvest assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the assistant core
///
/// None of these escape the public orchestration methods; they are caught at
/// component boundaries and turned into outcome values or user-facing
/// messages.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture device access denied or unavailable
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// Audio encoding/decoding or device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text upload, job, poll or timeout failure
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Language model call failed or timed out
    #[error("completion error: {0}")]
    Completion(String),

    /// Model asked for a tool nobody registered
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool handler hit an unexpected failure
    #[error("tool error: {0}")]
    Tool(String),

    /// Text-to-speech or playback failure
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Conversation log invariant violated
    #[error("conversation error: {0}")]
    Conversation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        assert_eq!(
            Error::UnknownTool("fly".to_string()).to_string(),
            "unknown tool: fly"
        );
        assert_eq!(
            Error::Permission("denied".to_string()).to_string(),
            "microphone unavailable: denied"
        );
    }

    #[test]
    fn serde_errors_convert() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
