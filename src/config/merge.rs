use std::path::PathBuf;
use std::time::Duration;

use super::LiveConfig;
use super::env::EnvConfig;
use super::yaml::YamlConfig;
use crate::core::session::LiveVoice;
use crate::errors::ConfigResult;

/// Build the effective configuration.
///
/// Starts from defaults, applies environment variables, then YAML values.
pub fn merge_config(yaml: Option<YamlConfig>) -> ConfigResult<LiveConfig> {
    let env = EnvConfig::from_env()?;
    let mut config = LiveConfig::default();

    apply_env(&mut config, env);
    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }

    Ok(config)
}

fn apply_env(config: &mut LiveConfig, env: EnvConfig) {
    if env.api_key.is_some() {
        config.api_key = env.api_key;
    }
    if let Some(endpoint) = env.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(model) = env.model {
        config.model = model;
    }
    if let Some(voice) = env.voice {
        config.voice = parse_voice(&voice);
    }
    if let Some(ms) = env.setup_timeout_ms {
        config.setup_timeout_ms = ms;
    }
    if let Some(secs) = env.long_speech_secs {
        config.turn_taking.long_speech = Duration::from_secs(secs);
    }
    if let Some(secs) = env.silence_prompt_secs {
        config.turn_taking.silence_prompt = Duration::from_secs(secs);
    }
    if let Some(secs) = env.silence_disconnect_secs {
        config.turn_taking.silence_disconnect = Duration::from_secs(secs);
    }
    if let Some(ms) = env.capture_chunk_ms {
        config.audio.capture_chunk_ms = ms;
    }
    if let Some(ms) = env.camera_frame_interval_ms {
        config.camera.frame_interval_ms = ms;
    }
}

fn apply_yaml(config: &mut LiveConfig, yaml: YamlConfig) {
    if let Some(session) = yaml.session {
        if session.api_key.is_some() {
            config.api_key = session.api_key;
        }
        if let Some(endpoint) = session.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(model) = session.model {
            config.model = model;
        }
        if let Some(voice) = session.voice {
            config.voice = parse_voice(&voice);
        }
        if let Some(ms) = session.setup_timeout_ms {
            config.setup_timeout_ms = ms;
        }
    }

    if let Some(prompt) = yaml.prompt {
        if prompt.template.is_some() {
            config.prompt.template = prompt.template;
        }
        config.prompt.variables.extend(prompt.variables);
    }

    if let Some(tools) = yaml.tools {
        if tools.enabled.is_some() {
            config.tools.enabled = tools.enabled;
        }
        config.tools.disabled.extend(tools.disabled);
    }

    if let Some(turn_taking) = yaml.turn_taking {
        if let Some(secs) = turn_taking.long_speech_secs {
            config.turn_taking.long_speech = Duration::from_secs(secs);
        }
        if let Some(secs) = turn_taking.silence_prompt_secs {
            config.turn_taking.silence_prompt = Duration::from_secs(secs);
        }
        if let Some(secs) = turn_taking.silence_disconnect_secs {
            config.turn_taking.silence_disconnect = Duration::from_secs(secs);
        }
    }

    if let Some(audio) = yaml.audio {
        if let Some(ms) = audio.capture_chunk_ms {
            config.audio.capture_chunk_ms = ms;
        }
        if let Some(ms) = audio.playback_tick_ms {
            config.audio.playback_tick_ms = ms;
        }
        if let Some(ms) = audio.playback_schedule_ahead_ms {
            config.audio.playback_schedule_ahead_ms = ms;
        }
        if let Some(ms) = audio.playback_drain_grace_ms {
            config.audio.playback_drain_grace_ms = ms;
        }
    }

    if let Some(camera) = yaml.camera {
        if let Some(enabled) = camera.enabled {
            config.camera.enabled = enabled;
        }
        if let Some(ms) = camera.frame_interval_ms {
            config.camera.frame_interval_ms = ms;
        }
        if let Some(path) = camera.image_path {
            config.camera.image_path = Some(PathBuf::from(path));
        }
    }
}

fn parse_voice(raw: &str) -> LiveVoice {
    let known = LiveVoice::all()
        .iter()
        .any(|v| v.as_str().eq_ignore_ascii_case(raw.trim()));
    if !known {
        tracing::warn!(voice = raw, "Unknown voice, using {}", LiveVoice::default());
    }
    LiveVoice::from_str_or_default(raw)
}
