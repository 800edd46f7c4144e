//! End-to-end tests for the console orchestrator
//!
//! A real [`Console`] runs against the mock Live endpoint with WAV and still
//! image devices, covering:
//! - Device switching on open and close
//! - Transcript reconciliation and playback
//! - Tool calls with snapshot side effects
//! - Turn-taking timers (long speech, silence prompt, silence disconnect)

mod fixtures;
mod mock_providers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::Instant;

use fixtures::{MIC_RATE, agent_tone, generate_sine_wave, samples_for, write_wav};
use mock_providers::{
    MockScript, SetupBehavior, agent_audio, input_transcription, output_transcription,
    spawn_live_mock, tool_call, turn_complete,
};
use waav_live::core::audio::{AudioOutput, WavMicrophone};
use waav_live::core::prompt::{CAMERA_OFF_NOTE, CAMERA_ON_NOTE};
use waav_live::core::session::AudioChunk;
use waav_live::core::transcript::Role;
use waav_live::core::turn_taking::TurnTakingPolicy;
use waav_live::core::video::{StillImageSource, silence_cue_frame};
use waav_live::{Console, ConsoleDevices, DeviceError, LiveConfig};

const WAIT: Duration = Duration::from_secs(5);

/// Speaker that records what it was asked to play.
#[derive(Default)]
struct RecordingOutput {
    played: Mutex<Vec<(Instant, usize)>>,
    halts: AtomicUsize,
}

impl AudioOutput for RecordingOutput {
    fn play(&self, start_at: Instant, chunk: &AudioChunk) -> Result<(), DeviceError> {
        self.played.lock().push((start_at, chunk.len()));
        Ok(())
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
    }
}

fn live_config(url: &str) -> LiveConfig {
    let mut config = LiveConfig::default();
    config.api_key = Some("test-key".to_string());
    config.endpoint = url.to_string();
    config.setup_timeout_ms = 2000;
    config.camera.enabled = false;
    for (key, value) in [
        ("fullName", "Ada Lovelace"),
        ("email", "ada@example.com"),
        ("phone", "+44 20 0000 0000"),
        ("jobExperience", "analytical engines"),
    ] {
        config
            .prompt
            .variables
            .insert(key.to_string(), value.to_string());
    }
    config
}

fn still_image(dir: &tempfile::TempDir) -> Arc<StillImageSource> {
    let path = dir.path().join("camera.jpg");
    std::fs::write(&path, &silence_cue_frame().unwrap().data).unwrap();
    Arc::new(StillImageSource::new(path))
}

async fn wait_signal<T>(rx: &watch::Receiver<T>, predicate: impl FnMut(&T) -> bool) {
    let mut rx = rx.clone();
    tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("Timed out waiting for signal")
        .expect("Signal sender dropped");
}

async fn wait_transcript(console: &Console, predicate: impl Fn(&[waav_live::ConversationTurn]) -> bool) {
    let start = Instant::now();
    while start.elapsed() < WAIT {
        if predicate(&console.transcript()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Transcript never matched: {:?}", console.transcript());
}

/// Test that opening a session turns microphone and camera on and closing turns them off
#[tokio::test]
async fn test_console_devices_follow_session() {
    let mock = spawn_live_mock(MockScript::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let mic_path = dir.path().join("mic.wav");
    write_wav(
        &mic_path,
        &generate_sine_wave(samples_for(MIC_RATE, 300), MIC_RATE, 440.0, 0.5),
        MIC_RATE,
    );

    let mut config = live_config(&mock.url);
    config.camera.enabled = true;
    config.camera.frame_interval_ms = 100;
    let console = Console::spawn(
        config,
        ConsoleDevices {
            microphone: Some(Arc::new(WavMicrophone::new(&mic_path))),
            camera: Some(still_image(&dir)),
            ..Default::default()
        },
    );
    let signals = console.signals().clone();

    console.connect().await.unwrap();
    wait_signal(&signals.connected, |c| *c).await;
    wait_signal(&signals.mic_enabled, |m| *m).await;
    wait_signal(&signals.camera_enabled, |c| *c).await;

    let audio = mock
        .state
        .wait_until(3, WAIT, |s| s.media_chunks("audio/pcm"))
        .await;
    assert!(audio.len() >= 3);
    assert!(audio.iter().all(|c| c["mimeType"] == "audio/pcm;rate=16000"));

    let frames = mock
        .state
        .wait_until(2, WAIT, |s| s.media_chunks("image/jpeg"))
        .await;
    assert!(frames.len() >= 2);

    let setup = mock.state.received_kind("setup");
    let instruction = setup[0]["systemInstruction"]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(instruction.contains("Greet Ada Lovelace by name"));
    assert!(instruction.contains(CAMERA_ON_NOTE));

    console.disconnect();
    wait_signal(&signals.connected, |c| !*c).await;
    wait_signal(&signals.mic_enabled, |m| !*m).await;
    wait_signal(&signals.camera_enabled, |c| !*c).await;

    console.shutdown().await;
}

/// Test that transcripts are reconciled and agent audio is played
#[tokio::test]
async fn test_console_transcript_and_playback() {
    let mock = spawn_live_mock(MockScript::with_messages(vec![
        input_transcription("Tell me", false),
        input_transcription(" more", true),
        output_transcription("Sure", false),
        agent_audio(&agent_tone(100)),
        output_transcription(" thing", true),
        turn_complete(),
    ]))
    .await;
    let speaker = Arc::new(RecordingOutput::default());
    let console = Console::spawn(
        live_config(&mock.url),
        ConsoleDevices {
            speaker: speaker.clone(),
            ..Default::default()
        },
    );

    console.connect().await.unwrap();
    wait_transcript(&console, |turns| {
        turns.len() == 2 && turns.iter().all(|t| t.is_final)
    })
    .await;

    let turns = console.transcript();
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].text, "Tell me more");
    assert_eq!(turns[1].role, Role::Agent);
    assert_eq!(turns[1].text, "Sure thing");

    let start = Instant::now();
    while speaker.played.lock().is_empty() && start.elapsed() < WAIT {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let played = speaker.played.lock().clone();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].1, 2400);

    console.shutdown().await;
}

/// Test that tool calls are answered, narrated and trigger a snapshot
#[tokio::test]
async fn test_console_tool_call_with_snapshot() {
    let mock = spawn_live_mock(MockScript::with_messages(vec![tool_call(&[
        ("c1", "take_snapshot", json!({"reason": "ID check"})),
        (
            "c2",
            "provide_interview_summary",
            json!({"summary": "Clear answers.", "recommendation": "Strong hire"}),
        ),
    ])]))
    .await;
    let dir = tempfile::tempdir().unwrap();
    let console = Console::spawn(
        live_config(&mock.url),
        ConsoleDevices {
            camera: Some(still_image(&dir)),
            ..Default::default()
        },
    );

    console.connect().await.unwrap();

    let responses = mock.state.wait_for_kind("toolResponse", 1, WAIT).await;
    let functions = responses[0]["functionResponses"].as_array().unwrap();
    assert_eq!(functions.len(), 2);
    assert_eq!(functions[0]["id"], "c1");
    assert_eq!(functions[1]["id"], "c2");
    assert_eq!(functions[1]["response"]["result"], "ok");

    let snapshots = mock
        .state
        .wait_until(1, WAIT, |s| s.media_chunks("image/jpeg"))
        .await;
    assert_eq!(snapshots.len(), 1);

    wait_transcript(&console, |turns| turns.len() == 3).await;
    let turns = console.transcript();
    assert!(turns.iter().all(|t| t.role == Role::System && t.is_final));
    assert_eq!(turns[0].text, "System: Taking snapshot. Reason: ID check");
    assert!(turns[1].text.starts_with("**Interview Complete**"));
    assert!(turns[1].text.contains("Strong hire"));
    assert!(turns[2].text.starts_with("Function call response:"));

    let setup = mock.state.received_kind("setup");
    assert!(
        setup[0]["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains(CAMERA_OFF_NOTE)
    );

    console.shutdown().await;
}

/// Test the silence cue and the silence disconnect after the agent finished speaking
#[tokio::test]
async fn test_console_silence_timers() {
    let mock = spawn_live_mock(MockScript::with_messages(vec![
        agent_audio(&agent_tone(50)),
        turn_complete(),
    ]))
    .await;
    let mut config = live_config(&mock.url);
    config.audio.playback_drain_grace_ms = 50;
    config.turn_taking = TurnTakingPolicy {
        long_speech: Duration::from_secs(30),
        silence_prompt: Duration::from_millis(300),
        silence_disconnect: Duration::from_millis(900),
    };
    let console = Console::spawn(config, ConsoleDevices::default());
    let signals = console.signals().clone();

    console.connect().await.unwrap();
    wait_signal(&signals.connected, |c| *c).await;

    let cues = mock
        .state
        .wait_until(1, WAIT, |s| s.media_chunks("image/jpeg"))
        .await;
    assert_eq!(cues.len(), 1);
    assert!(*signals.connected.borrow());

    wait_signal(&signals.connected, |c| !*c).await;
    assert!(!console.client().is_open());

    console.shutdown().await;
}

/// Test that prolonged user speech mutes the microphone
#[tokio::test]
async fn test_console_long_speech_mutes_microphone() {
    let mock = spawn_live_mock(MockScript::with_messages(vec![input_transcription(
        "I have been talking for a very long time",
        false,
    )]))
    .await;
    let mut config = live_config(&mock.url);
    config.turn_taking.long_speech = Duration::from_millis(200);
    let console = Console::spawn(config, ConsoleDevices::default());
    let signals = console.signals().clone();

    console.connect().await.unwrap();
    wait_signal(&signals.mic_was_system_interrupted, |i| *i).await;
    assert!(!*signals.mic_enabled.borrow());
    assert!(*signals.connected.borrow());

    console.set_mic_enabled(true, false);
    wait_signal(&signals.mic_was_system_interrupted, |i| !*i).await;
    assert!(*signals.mic_enabled.borrow());

    console.shutdown().await;
}

/// Test that a text turn is sent and logged
#[tokio::test]
async fn test_console_send_text() {
    let mock = spawn_live_mock(MockScript::default()).await;
    let console = Console::spawn(live_config(&mock.url), ConsoleDevices::default());

    console.connect().await.unwrap();
    console.send_text("Hello there");

    let content = mock.state.wait_for_kind("clientContent", 1, WAIT).await;
    assert_eq!(content[0]["turns"][0]["parts"][0]["text"], "Hello there");
    wait_transcript(&console, |turns| {
        turns.len() == 1 && turns[0].role == Role::User && turns[0].text == "Hello there"
    })
    .await;

    console.clear_transcript();
    wait_transcript(&console, |turns| turns.is_empty()).await;

    console.shutdown().await;
}

/// Test that a microphone failure leaves the microphone off
#[tokio::test]
async fn test_console_microphone_failure() {
    let mock = spawn_live_mock(MockScript::default()).await;
    let console = Console::spawn(
        live_config(&mock.url),
        ConsoleDevices {
            microphone: Some(Arc::new(WavMicrophone::new("/nonexistent/mic.wav"))),
            ..Default::default()
        },
    );
    let signals = console.signals().clone();

    console.connect().await.unwrap();
    wait_signal(&signals.connected, |c| *c).await;
    wait_signal(&signals.mic_enabled, |m| !*m).await;
    assert!(console.client().is_open());

    console.shutdown().await;
}

/// Test that a failed handshake leaves the console disconnected
#[tokio::test]
async fn test_console_connect_failure() {
    let mock = spawn_live_mock(MockScript {
        setup: SetupBehavior::Reject,
        ..Default::default()
    })
    .await;
    let console = Console::spawn(live_config(&mock.url), ConsoleDevices::default());

    assert!(console.connect().await.is_err());
    assert!(!*console.signals().connected.borrow());
    assert!(!*console.signals().mic_enabled.borrow());

    console.shutdown().await;
}
