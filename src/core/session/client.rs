//! Gemini Live session client.
//!
//! [`LiveClient`] owns one WebSocket session at a time. It performs the
//! `setup` handshake, relays server messages as typed events on
//! [`SessionEvents`] and serializes outbound media, text and tool results.
//!
//! # API Reference
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Protocol: WebSocket with JSON messages (text or binary frames)
//! - Audio: PCM 16-bit little-endian, 16kHz in / 24kHz out, base64 encoded
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_live::core::session::{LiveClient, SessionConfig};
//!
//! let client = LiveClient::new();
//! client.events().output_transcription.subscribe(|t| println!("agent: {}", t.text));
//! client.connect(&SessionConfig::audio("key")).await?;
//! client.send_text("Hello")?;
//! client.disconnect();
//! ```
//!
//! # Teardown
//!
//! Every connection attempt gets an epoch number. Events are only published
//! while the epoch that produced them is current, so a handler that calls
//! [`LiveClient::disconnect`] never observes events from the session it just
//! tore down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::base::{
    AudioChunk, CloseEvent, ImageFrame, LifecycleState, SessionConfig, SessionError,
    SessionResult, ToolResult,
};
use super::events::SessionEvents;
use super::messages::{ClientMessage, ServerEvent, ServerMessage};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

// =============================================================================
// Live Client
// =============================================================================

/// Handle to a live conversation session.
///
/// Cloning is cheap; all clones share the same session and event topics.
#[derive(Clone, Default)]
pub struct LiveClient {
    inner: Arc<ClientInner>,
}

#[derive(Default)]
struct ClientInner {
    events: SessionEvents,
    state: RwLock<LifecycleState>,
    /// Lock-free mirror of `state == Open`
    connected: AtomicBool,
    epoch: AtomicU64,
    ws_sender: Mutex<Option<mpsc::Sender<ClientMessage>>>,
    cancel: Mutex<Option<CancellationToken>>,
    session_id: RwLock<Option<String>>,
    opened_at: RwLock<Option<time::OffsetDateTime>>,
}

impl std::fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveClient")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish()
    }
}

impl LiveClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event topics published by this client.
    pub fn events(&self) -> &SessionEvents {
        &self.inner.events
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.read()
    }

    /// Whether traffic can flow.
    pub fn is_open(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Local id of the current (or last) session.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.read().clone()
    }

    /// When the current (or last) session reached `open`.
    pub fn opened_at(&self) -> Option<time::OffsetDateTime> {
        *self.inner.opened_at.read()
    }

    /// Open a session.
    ///
    /// Any previous session is torn down first. Resolves once the server has
    /// acknowledged `setup`. A configuration without response modalities is
    /// refused with [`SessionError::ConfigIncomplete`] and leaves the client
    /// untouched. Handshake failures publish `error` then `close` before
    /// returning. A [`disconnect`](Self::disconnect) during the handshake makes
    /// this return [`SessionError::Aborted`].
    pub async fn connect(&self, config: &SessionConfig) -> SessionResult<()> {
        if let Err(e) = config.ensure_complete() {
            tracing::warn!("Refusing to connect: {}", e);
            return Err(e);
        }

        self.disconnect();

        let (epoch, token) = self.inner.begin_attempt();
        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            epoch,
            "Connecting to Live API"
        );

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(SessionError::Aborted("disconnected during handshake".to_string()));
            }
            result = tokio::time::timeout(config.setup_timeout(), handshake(config)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(SessionError::Timeout(format!(
                        "setupComplete not received within {}ms",
                        config.setup_timeout_ms
                    ))),
                }
            }
        };

        let (sink, source) = match outcome {
            Ok(parts) => parts,
            Err(e) => {
                if token.is_cancelled() {
                    return Err(SessionError::Aborted("disconnected during handshake".to_string()));
                }
                tracing::error!("Live API handshake failed: {}", e);
                self.inner
                    .finish(epoch, Some(e.clone()), CloseEvent::local(e.to_string()));
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        {
            let mut state = self.inner.state.write();
            if !self.inner.is_current(epoch) || *state != LifecycleState::Connecting {
                return Err(SessionError::Aborted("disconnected during handshake".to_string()));
            }
            *self.inner.ws_sender.lock() = Some(tx);
            *self.inner.session_id.write() = Some(uuid::Uuid::new_v4().to_string());
            *self.inner.opened_at.write() = Some(time::OffsetDateTime::now_utc());
            self.inner.connected.store(true, Ordering::SeqCst);
            *state = LifecycleState::Open;
        }

        tracing::info!(session_id = ?self.session_id(), "Live session open");
        self.inner.emit_open(epoch);

        // Spawned after `open` so no server event can overtake it.
        let inner = self.inner.clone();
        tokio::spawn(run_io(inner, epoch, token, sink, source, rx));

        Ok(())
    }

    /// Tear down the current session.
    ///
    /// Idempotent and synchronous. Publishes `close` exactly once per session;
    /// does nothing when idle or already closed.
    pub fn disconnect(&self) {
        {
            let mut state = self.inner.state.write();
            if matches!(
                *state,
                LifecycleState::Idle | LifecycleState::Closing | LifecycleState::Closed
            ) {
                return;
            }
            *state = LifecycleState::Closing;
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }

        self.inner.teardown();
        *self.inner.state.write() = LifecycleState::Closed;

        tracing::info!("Disconnected from Live API");
        self.inner
            .events
            .close
            .emit(&CloseEvent::local("client disconnect"));
    }

    /// Stream one microphone chunk. Dropped silently when not open.
    pub fn send_audio_chunk(&self, chunk: &AudioChunk) {
        if !self.is_open() {
            tracing::debug!("Dropping audio chunk: session not open");
            return;
        }
        if let Err(e) = self.inner.enqueue(ClientMessage::audio(chunk)) {
            tracing::debug!("Dropping audio chunk: {}", e);
        }
    }

    /// Stream one camera frame. Dropped silently when not open.
    pub fn send_image_frame(&self, frame: &ImageFrame) {
        if !self.is_open() {
            tracing::debug!("Dropping image frame: session not open");
            return;
        }
        if let Err(e) = self.inner.enqueue(ClientMessage::image(frame)) {
            tracing::debug!("Dropping image frame: {}", e);
        }
    }

    /// Answer a batch of tool invocations.
    pub fn send_tool_result(&self, results: Vec<ToolResult>) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::NotConnected);
        }
        if results.is_empty() {
            tracing::debug!("No tool results to send");
            return Ok(());
        }
        self.inner.enqueue(ClientMessage::tool_response(results))
    }

    /// Send a complete user text turn.
    pub fn send_text(&self, text: &str) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::NotConnected);
        }
        self.inner.enqueue(ClientMessage::text(text))
    }

    /// Publish `agent_speech_end` once local playback of an utterance drained.
    pub fn signal_agent_speech_end(&self) {
        if self.is_open() {
            self.inner.events.agent_speech_end.emit(&());
        }
    }
}

// =============================================================================
// Shared State
// =============================================================================

impl ClientInner {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Start a new attempt: fresh epoch and cancellation token, state `Connecting`.
    fn begin_attempt(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let mut state = self.state.write();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.cancel.lock() = Some(token.clone());
        *state = LifecycleState::Connecting;
        (epoch, token)
    }

    fn teardown(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.ws_sender.lock().take();
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
    }

    /// End the session identified by `epoch` from the inside (remote close,
    /// transport failure, failed handshake).
    fn finish(&self, epoch: u64, error: Option<SessionError>, close: CloseEvent) {
        {
            let mut state = self.state.write();
            if !self.is_current(epoch) || !state.is_active() {
                return;
            }
            *state = LifecycleState::Closed;
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.teardown();

        if let Some(error) = error {
            self.events.error.emit(&error);
        }
        self.events.close.emit(&close);
    }

    fn emit_open(&self, epoch: u64) {
        if self.is_current(epoch) {
            self.events.open.emit(&());
        }
    }

    fn enqueue(&self, message: ClientMessage) -> SessionResult<()> {
        let sender = self.ws_sender.lock().clone();
        let Some(sender) = sender else {
            return Err(SessionError::NotConnected);
        };
        sender.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(msg) => {
                SessionError::Transport(format!("send queue full, dropped {}", msg.kind()))
            }
            mpsc::error::TrySendError::Closed(_) => SessionError::NotConnected,
        })
    }

    /// Relay one inbound JSON frame.
    fn dispatch_frame(&self, epoch: u64, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Failed to parse server message: {}", e);
                return;
            }
        };

        for event in message.into_events() {
            // A handler may have disconnected mid-message.
            if !self.is_current(epoch) {
                return;
            }
            match event {
                ServerEvent::SetupComplete => {
                    tracing::debug!("Ignoring repeated setupComplete");
                }
                ServerEvent::ToolCall(calls) => {
                    tracing::debug!("Tool call with {} invocation(s)", calls.len());
                    self.events.tool_call.emit(&calls);
                }
                ServerEvent::ToolCallCancellation(ids) => {
                    self.events.tool_call_cancellation.emit(&ids);
                }
                ServerEvent::Interrupted => {
                    tracing::debug!("Agent utterance interrupted");
                    self.events.interrupted.emit(&());
                }
                ServerEvent::InputTranscription(t) => {
                    self.events.input_transcription.emit(&t);
                }
                ServerEvent::OutputTranscription(t) => {
                    self.events.output_transcription.emit(&t);
                }
                ServerEvent::Audio(chunk) => {
                    self.events.audio.emit(&chunk);
                }
                ServerEvent::Content(text) => {
                    self.events.content.emit(&text);
                }
                ServerEvent::TurnComplete => {
                    self.events.turn_complete.emit(&());
                }
                ServerEvent::GoAway(time_left) => {
                    tracing::warn!("Server going away, time left: {:?}", time_left);
                    self.events.go_away.emit(&time_left);
                }
                ServerEvent::Error(message) => {
                    tracing::error!("Live API error: {}", message);
                    self.events.error.emit(&SessionError::Provider(message));
                }
            }
        }
    }
}

// =============================================================================
// Handshake and I/O
// =============================================================================

/// Endpoint URL with the API key appended as `key=`.
pub(crate) fn build_ws_url(config: &SessionConfig) -> SessionResult<Url> {
    let mut url = Url::parse(&config.endpoint)
        .map_err(|e| SessionError::InvalidConfiguration(format!("endpoint: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(SessionError::InvalidConfiguration(format!(
            "endpoint must use ws or wss, got {}",
            url.scheme()
        )));
    }
    url.query_pairs_mut().append_pair("key", &config.api_key);
    Ok(url)
}

/// Open the socket, send `setup` and wait for `setupComplete`.
async fn handshake(config: &SessionConfig) -> SessionResult<(WsSink, WsSource)> {
    let url = build_ws_url(config)?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| SessionError::ConnectionFailed(e.to_string()))?;
    tracing::debug!("WebSocket established, sending setup");

    let (mut sink, mut source) = ws_stream.split();

    let setup = serde_json::to_string(&ClientMessage::setup(config))
        .map_err(|e| SessionError::Serialization(e.to_string()))?;
    sink.send(Message::Text(setup.into()))
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))?;

    loop {
        let text = match source.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(data))) if data.first() == Some(&b'{') => {
                String::from_utf8_lossy(&data).into_owned()
            }
            Some(Ok(Message::Ping(data))) => {
                sink.send(Message::Pong(data))
                    .await
                    .map_err(|e| SessionError::Transport(e.to_string()))?;
                continue;
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| format!("{} ({})", f.reason.as_str(), u16::from(f.code)))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(SessionError::ConnectionFailed(format!(
                    "closed before setupComplete: {reason}"
                )));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(SessionError::Transport(e.to_string())),
            None => {
                return Err(SessionError::ConnectionFailed(
                    "stream ended before setupComplete".to_string(),
                ));
            }
        };

        match ServerMessage::parse(&text) {
            Ok(message) if message.setup_complete.is_some() => return Ok((sink, source)),
            Ok(message) => {
                if let Some(err) = message.error {
                    return Err(SessionError::Provider(err.message));
                }
                tracing::debug!("Ignoring message received before setupComplete");
            }
            Err(e) => tracing::warn!("Failed to parse handshake message: {}", e),
        }
    }
}

async fn run_io(
    inner: Arc<ClientInner>,
    epoch: u64,
    token: CancellationToken,
    mut sink: WsSink,
    mut source: WsSource,
    mut rx: mpsc::Receiver<ClientMessage>,
) {
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!("Failed to send close frame: {}", e);
                }
                break;
            }

            outbound = rx.recv() => {
                let Some(message) = outbound else {
                    // Sender dropped by teardown.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let json = match serde_json::to_string(&message) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize {}: {}", message.kind(), e);
                        continue;
                    }
                };
                tracing::trace!("Sending {}", message.kind());
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    tracing::error!("Failed to send WebSocket message: {}", e);
                    inner.finish(
                        epoch,
                        Some(SessionError::Transport(e.to_string())),
                        CloseEvent::local("send failed"),
                    );
                    break;
                }
            }

            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => inner.dispatch_frame(epoch, text.as_str()),
                    Some(Ok(Message::Binary(data))) => {
                        if data.first() == Some(&b'{') {
                            match std::str::from_utf8(&data) {
                                Ok(text) => inner.dispatch_frame(epoch, text),
                                Err(e) => tracing::warn!("Binary frame is not UTF-8: {}", e),
                            }
                        } else {
                            tracing::debug!("Ignoring non-JSON binary frame ({} bytes)", data.len());
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            tracing::error!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (Some(f.code), f.reason.as_str().to_string()),
                            None => (None, String::new()),
                        };
                        tracing::info!("WebSocket closed by server: {:?} {}", code, reason);
                        let error = match code {
                            Some(c) if c != CloseCode::Normal => Some(SessionError::Transport(
                                format!("closed with code {}: {}", u16::from(c), reason),
                            )),
                            _ => None,
                        };
                        inner.finish(
                            epoch,
                            error,
                            CloseEvent {
                                code: code.map(u16::from),
                                reason,
                            },
                        );
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        inner.finish(
                            epoch,
                            Some(SessionError::Transport(e.to_string())),
                            CloseEvent::local(e.to_string()),
                        );
                        break;
                    }
                    None => {
                        inner.finish(epoch, None, CloseEvent::local("stream ended"));
                        break;
                    }
                }
            }
        }
    }
    tracing::debug!(epoch, "Live I/O task finished");
}

// =============================================================================
// Tests
// =============================================================================
