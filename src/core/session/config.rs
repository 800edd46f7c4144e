//! Gemini Live API configuration types.
//!
//! Endpoint constants, audio wire formats and the prebuilt voice catalogue.

use serde::{Deserialize, Serialize};

/// Gemini Live `BidiGenerateContent` WebSocket endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default model when none is configured.
pub const DEFAULT_LIVE_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Sample rate of outbound microphone audio.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of inbound agent audio unless the mime type says otherwise.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// MIME tag attached to outbound audio chunks.
pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Default time allowed for the server to acknowledge `setup`.
pub const DEFAULT_SETUP_TIMEOUT_MS: u64 = 15_000;

/// Normalize a model name to the `models/...` resource form.
pub fn model_resource_name(model: &str) -> String {
    let model = model.trim();
    if model.is_empty() {
        DEFAULT_LIVE_MODEL.to_string()
    } else if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Extract the `rate=` parameter of a PCM mime type such as `audio/pcm;rate=24000`.
pub fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .filter(|&rate: &u32| rate > 0)
}

// =============================================================================
// Voices
// =============================================================================

/// Prebuilt voices offered by the Live API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LiveVoice {
    /// Puck (default)
    #[default]
    Puck,
    Charon,
    Kore,
    Fenrir,
    Aoede,
    Leda,
    Orus,
    Zephyr,
}

impl LiveVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Aoede => "Aoede",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Zephyr => "Zephyr",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|voice| voice.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or_default()
    }

    /// Get all available voices.
    pub fn all() -> &'static [LiveVoice] {
        &[
            Self::Puck,
            Self::Charon,
            Self::Kore,
            Self::Fenrir,
            Self::Aoede,
            Self::Leda,
            Self::Orus,
            Self::Zephyr,
        ]
    }
}

impl std::fmt::Display for LiveVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_resource_name() {
        assert_eq!(model_resource_name(""), DEFAULT_LIVE_MODEL);
        assert_eq!(
            model_resource_name("gemini-2.0-flash-live-001"),
            "models/gemini-2.0-flash-live-001"
        );
        assert_eq!(
            model_resource_name("models/gemini-2.0-flash-live-001"),
            "models/gemini-2.0-flash-live-001"
        );
    }

    #[test]
    fn test_sample_rate_from_mime() {
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(sample_rate_from_mime("audio/pcm; rate=16000"), Some(16000));
        assert_eq!(sample_rate_from_mime("audio/pcm"), None);
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=abc"), None);
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=0"), None);
    }

    #[test]
    fn test_voice_parsing() {
        assert_eq!(LiveVoice::from_str_or_default("kore"), LiveVoice::Kore);
        assert_eq!(LiveVoice::from_str_or_default("ZEPHYR"), LiveVoice::Zephyr);
        assert_eq!(LiveVoice::from_str_or_default("unknown"), LiveVoice::Puck);
        assert_eq!(LiveVoice::all().len(), 8);
        assert_eq!(LiveVoice::Aoede.to_string(), "Aoede");
    }
}
