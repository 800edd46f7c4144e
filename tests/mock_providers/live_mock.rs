//! WebSocket mock of the Live API

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::accept_async;

/// How the mock answers the `setup` message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetupBehavior {
    /// Reply with `setupComplete`
    #[default]
    Acknowledge,
    /// Never reply; keep the socket open
    Stall,
    /// Close the socket with a policy violation
    Reject,
}

/// Server side of one scripted session.
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    pub setup: SetupBehavior,
    /// Sent right after `setupComplete`
    pub after_setup: Vec<Value>,
    /// Sent after every `toolResponse` received
    pub after_tool_response: Vec<Value>,
    /// Close the socket once `after_setup` has been sent
    pub close_after_script: bool,
}

impl MockScript {
    pub fn with_messages(messages: Vec<Value>) -> Self {
        Self {
            after_setup: messages,
            ..Default::default()
        }
    }
}

/// Shared state of a running mock.
pub struct LiveMockState {
    pub script: MockScript,
    pub connection_count: AtomicU64,
    received: Mutex<Vec<Value>>,
}

impl LiveMockState {
    fn new(script: MockScript) -> Self {
        Self {
            script,
            connection_count: AtomicU64::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, message: Value) {
        self.received.lock().push(message);
    }

    /// Every client message received so far.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Payloads of the received messages of one kind (`setup`,
    /// `realtimeInput`, `clientContent`, `toolResponse`).
    pub fn received_kind(&self, kind: &str) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter_map(|m| m.get(kind).cloned())
            .collect()
    }

    /// `realtimeInput` chunks whose mime type starts with `prefix`.
    pub fn media_chunks(&self, prefix: &str) -> Vec<Value> {
        self.received_kind("realtimeInput")
            .into_iter()
            .filter_map(|m| m["mediaChunks"].as_array().cloned())
            .flatten()
            .filter(|c| {
                c["mimeType"]
                    .as_str()
                    .is_some_and(|mime| mime.starts_with(prefix))
            })
            .collect()
    }

    /// Poll until `probe` yields at least `count` items or `timeout` passes.
    pub async fn wait_until<F>(&self, count: usize, timeout: Duration, probe: F) -> Vec<Value>
    where
        F: Fn(&Self) -> Vec<Value>,
    {
        let start = Instant::now();
        loop {
            let found = probe(self);
            if found.len() >= count || start.elapsed() >= timeout {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn wait_for_kind(&self, kind: &str, count: usize, timeout: Duration) -> Vec<Value> {
        self.wait_until(count, timeout, |s| s.received_kind(kind))
            .await
    }
}

/// A mock listening on an ephemeral local port.
pub struct LiveMock {
    pub url: String,
    pub state: Arc<LiveMockState>,
    handle: JoinHandle<()>,
}

impl Drop for LiveMock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a mock server for `script`.
pub async fn spawn_live_mock(script: MockScript) -> LiveMock {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock listener");
    let addr = listener.local_addr().expect("Mock listener has no address");
    let state = Arc::new(LiveMockState::new(script));

    let accept_state = state.clone();
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let state = accept_state.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, state).await {
                    eprintln!("Mock Live connection error: {e}");
                }
            });
        }
    });

    LiveMock {
        url: format!("ws://{addr}/ws"),
        state,
        handle,
    }
}

fn text(message: &Value) -> Message {
    Message::Text(message.to_string().into())
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<LiveMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();
    state.connection_count.fetch_add(1, Ordering::Relaxed);

    // The first frame is always `setup`.
    let setup = match read.next().await {
        Some(Ok(Message::Text(t))) => serde_json::from_str::<Value>(t.as_str())?,
        _ => return Ok(()),
    };
    state.record(setup);

    match state.script.setup {
        SetupBehavior::Stall => {
            while let Some(Ok(_)) = read.next().await {}
            return Ok(());
        }
        SetupBehavior::Reject => {
            write
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "API key not valid".into(),
                })))
                .await?;
            return Ok(());
        }
        SetupBehavior::Acknowledge => {
            write.send(text(&json!({ "setupComplete": {} }))).await?;
        }
    }

    for message in &state.script.after_setup {
        write.send(text(message)).await?;
    }

    if state.script.close_after_script {
        write
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "session over".into(),
            })))
            .await?;
        return Ok(());
    }

    while let Some(frame) = read.next().await {
        match frame? {
            Message::Text(t) => {
                let message: Value = serde_json::from_str(t.as_str())?;
                let is_tool_response = message.get("toolResponse").is_some();
                state.record(message);
                if is_tool_response {
                    for reply in &state.script.after_tool_response {
                        write.send(text(reply)).await?;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

// =============================================================================
// Server message builders
// =============================================================================

pub fn input_transcription(text: &str, finished: bool) -> Value {
    json!({ "serverContent": { "inputTranscription": { "text": text, "finished": finished } } })
}

pub fn output_transcription(text: &str, finished: bool) -> Value {
    json!({ "serverContent": { "outputTranscription": { "text": text, "finished": finished } } })
}

/// Agent audio as 24kHz PCM16 inline data.
pub fn agent_audio(samples: &[i16]) -> Value {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    json!({
        "serverContent": {
            "modelTurn": {
                "parts": [{
                    "inlineData": {
                        "mimeType": "audio/pcm;rate=24000",
                        "data": BASE64_STANDARD.encode(bytes)
                    }
                }]
            }
        }
    })
}

pub fn turn_complete() -> Value {
    json!({ "serverContent": { "turnComplete": true } })
}

pub fn interrupted() -> Value {
    json!({ "serverContent": { "interrupted": true } })
}

/// A `toolCall` with `(id, name, args)` invocations.
pub fn tool_call(calls: &[(&str, &str, Value)]) -> Value {
    let function_calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| json!({ "id": id, "name": name, "args": args }))
        .collect();
    json!({ "toolCall": { "functionCalls": function_calls } })
}

pub fn go_away(time_left: &str) -> Value {
    json!({ "goAway": { "timeLeft": time_left } })
}

pub fn server_error(message: &str) -> Value {
    json!({ "error": { "code": 500, "message": message } })
}
