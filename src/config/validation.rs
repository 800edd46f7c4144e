use url::Url;

use super::LiveConfig;
use crate::errors::{ConfigError, ConfigResult};

/// The API key must be present.
pub fn validate_api_key(api_key: &Option<String>) -> ConfigResult<()> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::Missing(
            "API key (set GEMINI_API_KEY or session.api_key)".to_string(),
        )),
    }
}

/// The endpoint must be a `ws` or `wss` URL.
pub fn validate_endpoint(endpoint: &str) -> ConfigResult<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| ConfigError::Invalid(format!("endpoint {endpoint:?}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "endpoint must use ws or wss, got {other}"
        ))),
    }
}

/// Every timing value must be non-zero and the silence prompt must fire
/// before the silence disconnect.
pub fn validate_timings(config: &LiveConfig) -> ConfigResult<()> {
    let millis = [
        ("session.setup_timeout_ms", config.setup_timeout_ms),
        ("audio.capture_chunk_ms", config.audio.capture_chunk_ms),
        ("audio.playback_tick_ms", config.audio.playback_tick_ms),
        (
            "audio.playback_schedule_ahead_ms",
            config.audio.playback_schedule_ahead_ms,
        ),
        (
            "audio.playback_drain_grace_ms",
            config.audio.playback_drain_grace_ms,
        ),
        ("camera.frame_interval_ms", config.camera.frame_interval_ms),
    ];
    for (name, value) in millis {
        if value == 0 {
            return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
        }
    }

    let policy = &config.turn_taking;
    let durations = [
        ("turn_taking.long_speech_secs", policy.long_speech),
        ("turn_taking.silence_prompt_secs", policy.silence_prompt),
        ("turn_taking.silence_disconnect_secs", policy.silence_disconnect),
    ];
    for (name, value) in durations {
        if value.is_zero() {
            return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
        }
    }

    if policy.silence_prompt >= policy.silence_disconnect {
        return Err(ConfigError::Invalid(format!(
            "silence prompt ({}s) must be shorter than silence disconnect ({}s)",
            policy.silence_prompt.as_secs(),
            policy.silence_disconnect.as_secs()
        )));
    }

    Ok(())
}
