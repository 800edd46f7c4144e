//! Environment variable layer.
//!
//! `.env` is loaded into the process environment by `main` before this
//! runs, so real environment variables win over `.env` values.

use std::env;
use std::str::FromStr;

use crate::errors::{ConfigError, ConfigResult};

/// Values read from the environment. `None` means the variable is unset.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub setup_timeout_ms: Option<u64>,
    pub long_speech_secs: Option<u64>,
    pub silence_prompt_secs: Option<u64>,
    pub silence_disconnect_secs: Option<u64>,
    pub capture_chunk_ms: Option<u64>,
    pub camera_frame_interval_ms: Option<u64>,
}

impl EnvConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            api_key: env_string("GEMINI_API_KEY").or_else(|| env_string("API_KEY")),
            endpoint: env_string("LIVE_ENDPOINT"),
            model: env_string("LIVE_MODEL"),
            voice: env_string("LIVE_VOICE"),
            setup_timeout_ms: env_parse("LIVE_SETUP_TIMEOUT_MS")?,
            long_speech_secs: env_parse("LIVE_LONG_SPEECH_SECS")?,
            silence_prompt_secs: env_parse("LIVE_SILENCE_PROMPT_SECS")?,
            silence_disconnect_secs: env_parse("LIVE_SILENCE_DISCONNECT_SECS")?,
            capture_chunk_ms: env_parse("LIVE_CAPTURE_CHUNK_MS")?,
            camera_frame_interval_ms: env_parse("LIVE_CAMERA_FRAME_INTERVAL_MS")?,
        })
    }
}

/// Non-empty, trimmed value of `name`.
fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("{name}={raw:?}: {e}"))),
        None => Ok(None),
    }
}
