//! Language profiles: reply language, recognition locale and voice

use serde::{Deserialize, Serialize};

/// Default TTS voice; the OpenAI voices are multilingual
const DEFAULT_VOICE: &str = "alloy";

/// How the assistant listens and speaks in one language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageProfile {
    /// ISO 639-1 code, e.g. "hi"
    pub code: String,
    /// English name used in the system prompt, e.g. "Hindi"
    pub name: String,
    /// BCP 47 locale for speech recognition, e.g. "hi-IN"
    pub recognition_locale: String,
    /// TTS voice identifier
    pub voice_id: String,
}

const BUILTIN: &[(&str, &str, &str)] = &[
    ("en", "English", "en-US"),
    ("hi", "Hindi", "hi-IN"),
    ("mr", "Marathi", "mr-IN"),
    ("ta", "Tamil", "ta-IN"),
    ("te", "Telugu", "te-IN"),
];

impl LanguageProfile {
    /// Built-in profile for a language code
    #[must_use]
    pub fn builtin(code: &str) -> Option<Self> {
        let code = code.trim().to_lowercase();
        BUILTIN
            .iter()
            .find(|(c, _, _)| *c == code)
            .map(|(code, name, locale)| Self {
                code: (*code).to_string(),
                name: (*name).to_string(),
                recognition_locale: (*locale).to_string(),
                voice_id: DEFAULT_VOICE.to_string(),
            })
    }

    /// All built-in profiles
    #[must_use]
    pub fn builtins() -> Vec<Self> {
        BUILTIN
            .iter()
            .filter_map(|(code, _, _)| Self::builtin(code))
            .collect()
    }

    /// Find `code` among `profiles`, falling back to English
    #[must_use]
    pub fn resolve(profiles: &[Self], code: &str) -> Self {
        let wanted = code.trim().to_lowercase();
        profiles
            .iter()
            .find(|p| p.code == wanted)
            .cloned()
            .or_else(|| Self::builtin(&wanted))
            .unwrap_or_else(|| {
                tracing::warn!(code = %code, "unknown language, falling back to English");
                Self::default()
            })
    }
}

impl Default for LanguageProfile {
    fn default() -> Self {
        Self {
            code: "en".to_string(),
            name: "English".to_string(),
            recognition_locale: "en-US".to_string(),
            voice_id: DEFAULT_VOICE.to_string(),
        }
    }
}
