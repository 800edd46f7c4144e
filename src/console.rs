//! Console orchestrator.
//!
//! [`Console`] wires a [`LiveClient`] to the media pipelines, the transcript,
//! the turn-taking supervisor and the tool dispatcher. Everything mutable
//! lives in one actor task. Session events reach it through an unbounded
//! channel fed by topic callbacks, commands through a second one, so event
//! handlers never block and `disconnect` is safe from anywhere.
//!
//! ```text
//!  LiveClient topics ──► ConsoleEvent ──┐
//!  Console handle ─────► ConsoleCommand ┼─► actor loop ──► transcript / playback /
//!  playback tick, camera tick, timers ──┘                  capture / tool results
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::LiveConfig;
use crate::core::audio::{
    AudioOutput, CapturePipeline, ChunkSink, MicrophoneSource, NullOutput, PlaybackScheduler,
};
use crate::core::session::{
    AudioChunk, CloseEvent, LiveClient, SessionError, SessionEvents, SessionResult, Topic,
    ToolInvocation, Transcription,
};
use crate::core::tools::{ToolDispatcher, ToolEffect};
use crate::core::transcript::{ConversationTurn, Role, TranscriptLog, TranscriptUpdate};
use crate::core::turn_taking::{TurnAction, TurnSignal, TurnTakingSupervisor};
use crate::core::video::{FrameSource, silence_cue_frame};
use crate::errors::DeviceError;

const ELAPSED_TICK: Duration = Duration::from_secs(1);

// =============================================================================
// Public Surface
// =============================================================================

/// Media devices handed to the console.
#[derive(Clone)]
pub struct ConsoleDevices {
    pub microphone: Option<Arc<dyn MicrophoneSource>>,
    pub speaker: Arc<dyn AudioOutput>,
    pub camera: Option<Arc<dyn FrameSource>>,
}

impl Default for ConsoleDevices {
    fn default() -> Self {
        Self {
            microphone: None,
            speaker: Arc::new(NullOutput),
            camera: None,
        }
    }
}

/// Observable console state.
#[derive(Debug, Clone)]
pub struct ConsoleSignals {
    pub connected: watch::Receiver<bool>,
    /// Seconds since the current session opened; reset on each connection
    pub elapsed_seconds: watch::Receiver<u64>,
    /// Output level of the agent's voice
    pub volume: watch::Receiver<f32>,
    pub mic_enabled: watch::Receiver<bool>,
    pub camera_enabled: watch::Receiver<bool>,
    /// The microphone was muted by the long-speech timer
    pub mic_was_system_interrupted: watch::Receiver<bool>,
}

#[derive(Debug)]
enum ConsoleCommand {
    Connect {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    SetMic {
        enabled: bool,
        system: bool,
    },
    SetCamera(bool),
    TriggerSnapshot,
    ClearTranscript,
    SendText(String),
    Shutdown,
}

/// Handle to a running console.
pub struct Console {
    client: LiveClient,
    commands: mpsc::UnboundedSender<ConsoleCommand>,
    signals: ConsoleSignals,
    transcript: Arc<RwLock<TranscriptLog>>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("client", &self.client)
            .field("connected", &*self.signals.connected.borrow())
            .finish()
    }
}

impl Console {
    /// Start the console actor on the current runtime.
    pub fn spawn(config: LiveConfig, devices: ConsoleDevices) -> Self {
        let client = LiveClient::new();
        let transcript = Arc::new(RwLock::new(TranscriptLog::new()));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let (actor, signals) = ConsoleActor::new(
            client.clone(),
            config,
            devices,
            transcript.clone(),
            event_tx.clone(),
        );
        let bridge = EventBridge::attach(client.events(), event_tx);

        let task = tokio::spawn(actor.run(command_rx, event_rx, bridge));

        Self {
            client,
            commands,
            signals,
            transcript,
            task,
        }
    }

    pub fn client(&self) -> &LiveClient {
        &self.client
    }

    pub fn signals(&self) -> &ConsoleSignals {
        &self.signals
    }

    /// Snapshot of the transcript.
    pub fn transcript(&self) -> Vec<ConversationTurn> {
        self.transcript.read().turns().to_vec()
    }

    /// Follow transcript changes.
    pub fn subscribe_transcript(&self) -> broadcast::Receiver<TranscriptUpdate> {
        self.transcript.read().subscribe()
    }

    /// Open a session with the configured prompt and tools.
    ///
    /// A new session cycle starts with an empty transcript. Microphone and
    /// camera turn on once the session is open.
    pub async fn connect(&self) -> SessionResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(ConsoleCommand::Connect { reply })?;
        rx.await
            .map_err(|_| SessionError::Aborted("console stopped".to_string()))?
    }

    /// Close the session. Idempotent.
    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    /// Enable or disable the microphone. `system` marks a mute imposed by the
    /// console itself rather than the user.
    pub fn set_mic_enabled(&self, enabled: bool, system: bool) {
        let _ = self.send(ConsoleCommand::SetMic { enabled, system });
    }

    pub fn set_camera_enabled(&self, enabled: bool) {
        let _ = self.send(ConsoleCommand::SetCamera(enabled));
    }

    /// Capture one camera frame and send it to the agent.
    pub fn trigger_snapshot(&self) {
        let _ = self.send(ConsoleCommand::TriggerSnapshot);
    }

    pub fn clear_transcript(&self) {
        let _ = self.send(ConsoleCommand::ClearTranscript);
    }

    /// Send a user text turn.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.send(ConsoleCommand::SendText(text.into()));
    }

    /// Disconnect, stop the actor and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(ConsoleCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!("Console task failed: {}", e);
        }
    }

    fn send(&self, command: ConsoleCommand) -> SessionResult<()> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Aborted("console stopped".to_string()))
    }
}

// =============================================================================
// Event Bridge
// =============================================================================

#[derive(Debug, Clone)]
enum ConsoleEvent {
    Open,
    Close(CloseEvent),
    Error(SessionError),
    Audio(AudioChunk),
    InputTranscription(Transcription),
    OutputTranscription(Transcription),
    Content(String),
    TurnComplete,
    ToolCall(Vec<ToolInvocation>),
    ToolCallCancellation(Vec<String>),
    Interrupted,
    AgentSpeechEnd,
    GoAway(Option<String>),
    CaptureError(DeviceError),
}

type Detach = Box<dyn FnOnce(&SessionEvents) + Send>;

/// Topic subscriptions that forward session events into the actor.
struct EventBridge {
    detach: Vec<Detach>,
}

impl EventBridge {
    fn attach(events: &SessionEvents, tx: mpsc::UnboundedSender<ConsoleEvent>) -> Self {
        let mut bridge = Self { detach: Vec::new() };
        bridge.forward(events, &tx, |e| &e.open, |_| ConsoleEvent::Open);
        bridge.forward(events, &tx, |e| &e.close, |c| ConsoleEvent::Close(c.clone()));
        bridge.forward(events, &tx, |e| &e.error, |err| ConsoleEvent::Error(err.clone()));
        bridge.forward(events, &tx, |e| &e.audio, |c| ConsoleEvent::Audio(c.clone()));
        bridge.forward(
            events,
            &tx,
            |e| &e.input_transcription,
            |t| ConsoleEvent::InputTranscription(t.clone()),
        );
        bridge.forward(
            events,
            &tx,
            |e| &e.output_transcription,
            |t| ConsoleEvent::OutputTranscription(t.clone()),
        );
        bridge.forward(events, &tx, |e| &e.content, |t| ConsoleEvent::Content(t.clone()));
        bridge.forward(events, &tx, |e| &e.turn_complete, |_| ConsoleEvent::TurnComplete);
        bridge.forward(events, &tx, |e| &e.tool_call, |c| ConsoleEvent::ToolCall(c.clone()));
        bridge.forward(
            events,
            &tx,
            |e| &e.tool_call_cancellation,
            |ids| ConsoleEvent::ToolCallCancellation(ids.clone()),
        );
        bridge.forward(events, &tx, |e| &e.interrupted, |_| ConsoleEvent::Interrupted);
        bridge.forward(
            events,
            &tx,
            |e| &e.agent_speech_end,
            |_| ConsoleEvent::AgentSpeechEnd,
        );
        bridge.forward(events, &tx, |e| &e.go_away, |t| ConsoleEvent::GoAway(t.clone()));
        bridge
    }

    fn forward<T: 'static>(
        &mut self,
        events: &SessionEvents,
        tx: &mpsc::UnboundedSender<ConsoleEvent>,
        topic: fn(&SessionEvents) -> &Topic<T>,
        wrap: fn(&T) -> ConsoleEvent,
    ) {
        let tx = tx.clone();
        let id = topic(events).subscribe(move |payload| {
            // The actor is gone after shutdown; nothing left to notify.
            let _ = tx.send(wrap(payload));
        });
        self.detach.push(Box::new(move |events: &SessionEvents| {
            topic(events).unsubscribe(id);
        }));
    }

    fn detach(self, events: &SessionEvents) {
        for detach in self.detach {
            detach(events);
        }
    }
}

// =============================================================================
// Actor
// =============================================================================

struct SignalSenders {
    connected: watch::Sender<bool>,
    elapsed_seconds: watch::Sender<u64>,
    mic_enabled: watch::Sender<bool>,
    camera_enabled: watch::Sender<bool>,
    mic_was_system_interrupted: watch::Sender<bool>,
}

struct ConsoleActor {
    client: LiveClient,
    config: LiveConfig,
    dispatcher: ToolDispatcher,
    transcript: Arc<RwLock<TranscriptLog>>,
    playback: PlaybackScheduler,
    supervisor: TurnTakingSupervisor,
    capture: Option<CapturePipeline>,
    camera: Option<Arc<dyn FrameSource>>,
    signals: SignalSenders,
    opened_at: Option<Instant>,
    mic_on: bool,
    camera_on: bool,
    mic_system_interrupted: bool,
}

impl ConsoleActor {
    fn new(
        client: LiveClient,
        config: LiveConfig,
        devices: ConsoleDevices,
        transcript: Arc<RwLock<TranscriptLog>>,
        events: mpsc::UnboundedSender<ConsoleEvent>,
    ) -> (Self, ConsoleSignals) {
        let playback = PlaybackScheduler::new(devices.speaker, config.playback_config());
        let supervisor = TurnTakingSupervisor::new(config.turn_taking);
        let dispatcher = ToolDispatcher::new(config.tool_registry());

        let capture = devices.microphone.map(|source| {
            let sink: Arc<dyn ChunkSink> = Arc::new(client.clone());
            let pipeline = CapturePipeline::new(source, sink, config.capture_config());
            pipeline.errors().subscribe(move |e| {
                let _ = events.send(ConsoleEvent::CaptureError(e.clone()));
            });
            pipeline
        });

        let (connected, connected_rx) = watch::channel(false);
        let (elapsed_seconds, elapsed_rx) = watch::channel(0);
        let (mic_enabled, mic_rx) = watch::channel(false);
        let (camera_enabled, camera_rx) = watch::channel(false);
        let (mic_was_system_interrupted, interrupted_rx) = watch::channel(false);

        let signals = ConsoleSignals {
            connected: connected_rx,
            elapsed_seconds: elapsed_rx,
            volume: playback.volume(),
            mic_enabled: mic_rx,
            camera_enabled: camera_rx,
            mic_was_system_interrupted: interrupted_rx,
        };

        let actor = Self {
            client,
            config,
            dispatcher,
            transcript,
            playback,
            supervisor,
            capture,
            camera: devices.camera,
            signals: SignalSenders {
                connected,
                elapsed_seconds,
                mic_enabled,
                camera_enabled,
                mic_was_system_interrupted,
            },
            opened_at: None,
            mic_on: false,
            camera_on: false,
            mic_system_interrupted: false,
        };
        (actor, signals)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<ConsoleCommand>,
        mut events: mpsc::UnboundedReceiver<ConsoleEvent>,
        bridge: EventBridge,
    ) {
        let mut playback_tick = tokio::time::interval(non_zero(self.playback.config().tick));
        playback_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut elapsed_tick = tokio::time::interval(ELAPSED_TICK);
        elapsed_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut camera_tick = tokio::time::interval(non_zero(self.config.frame_interval()));
        camera_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!("Console started");

        loop {
            let deadline = self.supervisor.next_deadline();
            let connected = self.opened_at.is_some();
            let camera_live = connected && self.camera_on && self.camera.is_some();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(ConsoleCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },

                Some(event) = events.recv() => {
                    let opened = matches!(event, ConsoleEvent::Open);
                    self.handle_event(event, Instant::now());
                    if opened {
                        elapsed_tick.reset();
                        camera_tick.reset();
                    }
                }

                _ = playback_tick.tick() => {
                    if self.playback.pump(Instant::now()) {
                        self.client.signal_agent_speech_end();
                    }
                }

                _ = elapsed_tick.tick(), if connected => self.publish_elapsed(Instant::now()),

                _ = camera_tick.tick(), if camera_live => self.send_camera_frame(),

                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    for action in self.supervisor.poll(Instant::now()) {
                        self.apply_turn_action(action);
                    }
                }
            }
        }

        self.client.disconnect();
        self.set_mic(false, false);
        self.playback.reset();
        bridge.detach(self.client.events());
        tracing::debug!("Console stopped");
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    fn handle_command(&mut self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::Connect { reply } => self.connect(reply),
            ConsoleCommand::SetMic { enabled, system } => self.set_mic(enabled, system),
            ConsoleCommand::SetCamera(enabled) => self.set_camera(enabled),
            ConsoleCommand::TriggerSnapshot => self.send_camera_frame(),
            ConsoleCommand::ClearTranscript => self.transcript.write().clear(),
            ConsoleCommand::SendText(text) => match self.client.send_text(&text) {
                Ok(()) => self.transcript.write().apply(Role::User, &text, true),
                Err(e) => tracing::warn!("Cannot send text: {}", e),
            },
            ConsoleCommand::Shutdown => {}
        }
    }

    fn connect(&mut self, reply: oneshot::Sender<SessionResult<()>>) {
        let camera_on = self.config.camera.enabled && self.camera.is_some();
        let session = match self
            .config
            .session_config(self.dispatcher.registry(), camera_on)
        {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Cannot build session configuration: {}", e);
                let _ = reply.send(Err(SessionError::InvalidConfiguration(e.to_string())));
                return;
            }
        };

        self.transcript.write().clear();

        // The handshake runs off the actor so events and commands keep flowing.
        let client = self.client.clone();
        tokio::spawn(async move {
            let _ = reply.send(client.connect(&session).await);
        });
    }

    fn set_mic(&mut self, enabled: bool, system: bool) {
        self.mic_on = enabled;
        self.mic_system_interrupted = !enabled && system;
        if let Some(capture) = self.capture.as_mut() {
            capture.set_enabled(enabled);
        }
        if system {
            tracing::info!(enabled, "Microphone toggled by turn-taking");
        }
        self.signals.mic_enabled.send_replace(enabled);
        self.signals
            .mic_was_system_interrupted
            .send_replace(self.mic_system_interrupted);
    }

    fn set_camera(&mut self, enabled: bool) {
        if enabled && self.camera.is_none() {
            tracing::warn!("Camera enabled without a frame source");
        }
        self.camera_on = enabled;
        self.signals.camera_enabled.send_replace(enabled);
    }

    fn send_camera_frame(&self) {
        let Some(camera) = self.camera.clone() else {
            tracing::debug!("No camera frame source");
            return;
        };
        if !self.client.is_open() {
            return;
        }
        let client = self.client.clone();
        tokio::spawn(async move {
            match camera.capture().await {
                Ok(frame) => client.send_image_frame(&frame),
                Err(e) => tracing::warn!("Camera capture failed: {}", e),
            }
        });
    }

    // -------------------------------------------------------------------------
    // Session events
    // -------------------------------------------------------------------------

    fn handle_event(&mut self, event: ConsoleEvent, now: Instant) {
        match event {
            ConsoleEvent::Open => {
                self.opened_at = Some(now);
                self.signals.connected.send_replace(true);
                self.signals.elapsed_seconds.send_replace(0);
                self.set_mic(true, false);
                self.set_camera(self.config.camera.enabled);
            }
            ConsoleEvent::Close(close) => {
                tracing::info!(code = ?close.code, reason = %close.reason, "Session closed");
                self.opened_at = None;
                self.signals.connected.send_replace(false);
                self.set_mic(false, false);
                self.set_camera(false);
                self.playback.interrupt(now);
                self.supervisor.observe(TurnSignal::Disconnected, now);
                self.transcript.write().complete_turn();
            }
            ConsoleEvent::Error(e) => {
                tracing::warn!("Session error: {}", e);
            }
            ConsoleEvent::Audio(chunk) => {
                if self.mic_system_interrupted {
                    tracing::info!("Agent is speaking, re-enabling microphone");
                    self.set_mic(true, false);
                }
                self.playback.enqueue(chunk, now);
            }
            ConsoleEvent::InputTranscription(t) => {
                self.transcript.write().apply(Role::User, &t.text, t.is_final);
                self.supervisor.observe(TurnSignal::UserSpeech, now);
            }
            ConsoleEvent::OutputTranscription(t) => {
                self.transcript
                    .write()
                    .apply(Role::Agent, &t.text, t.is_final);
                self.supervisor.observe(TurnSignal::AgentSpeech, now);
            }
            ConsoleEvent::Content(text) => {
                self.transcript.write().apply(Role::Agent, &text, false);
            }
            ConsoleEvent::TurnComplete => {
                self.transcript.write().complete_turn();
                self.supervisor.observe(TurnSignal::AgentTurnComplete, now);
            }
            ConsoleEvent::ToolCall(invocations) => self.handle_tool_call(&invocations),
            ConsoleEvent::ToolCallCancellation(ids) => {
                tracing::info!(?ids, "Agent cancelled tool calls");
            }
            ConsoleEvent::Interrupted => {
                let flushed = self.playback.interrupt(now);
                tracing::debug!(flushed, "Barge-in");
            }
            ConsoleEvent::AgentSpeechEnd => {
                self.supervisor.observe(TurnSignal::AgentSpeechEnd, now);
            }
            ConsoleEvent::GoAway(time_left) => {
                tracing::warn!(?time_left, "Session will be closed by the server");
            }
            ConsoleEvent::CaptureError(e) => {
                tracing::warn!("Microphone stopped: {}", e);
                self.mic_on = false;
                self.signals.mic_enabled.send_replace(false);
            }
        }
    }

    fn handle_tool_call(&mut self, invocations: &[ToolInvocation]) {
        let outcome = self.dispatcher.dispatch(invocations);

        {
            let mut transcript = self.transcript.write();
            for narration in &outcome.narrations {
                transcript.push_system(narration);
            }
            if let Some(summary) = outcome.response_narration() {
                transcript.push_system(&summary);
            }
        }

        for effect in &outcome.effects {
            match effect {
                ToolEffect::Snapshot { reason } => {
                    tracing::info!(%reason, "Snapshot requested by agent");
                    self.send_camera_frame();
                }
            }
        }

        if let Err(e) = self.client.send_tool_result(outcome.results) {
            tracing::warn!("Tool results not delivered: {}", e);
        }
    }

    fn apply_turn_action(&mut self, action: TurnAction) {
        match action {
            TurnAction::MuteMicrophone => self.set_mic(false, true),
            TurnAction::PromptSilence => match silence_cue_frame() {
                Ok(frame) => self.client.send_image_frame(&frame),
                Err(e) => tracing::error!("Failed to build silence cue: {}", e),
            },
            TurnAction::EndSession => {
                tracing::info!("Ending session after prolonged silence");
                self.client.disconnect();
            }
        }
    }

    fn publish_elapsed(&self, now: Instant) {
        if let Some(opened_at) = self.opened_at {
            self.signals
                .elapsed_seconds
                .send_replace(now.duration_since(opened_at).as_secs());
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn non_zero(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}
