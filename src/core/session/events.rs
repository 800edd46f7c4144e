//! Typed publish/subscribe surface for session events.
//!
//! Every event has its own [`Topic`] with a fixed payload type. A topic holds
//! any number of independent subscribers. Callbacks run synchronously, in
//! subscription order, on the task that emits. They must not block.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = LiveClient::new();
//! let id = client.events().input_transcription.subscribe(|t| {
//!     println!("user said: {}", t.text);
//! });
//! client.events().input_transcription.unsubscribe(id);
//! ```

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::base::{AudioChunk, CloseEvent, SessionError, ToolInvocation, Transcription};

/// Callback invoked for each published payload.
pub type EventCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`Topic::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A single named event with a fixed payload type.
pub struct Topic<T> {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, EventCallback<T>)>>,
}

impl<T> Topic<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Event name, used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a callback. The returned id removes it again.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `payload` to every subscriber and return how many were called.
    ///
    /// The subscriber list is snapshotted first, so callbacks may subscribe,
    /// unsubscribe or emit on other topics without deadlocking.
    pub fn emit(&self, payload: &T) -> usize {
        let snapshot: Vec<EventCallback<T>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        tracing::trace!(event = self.name, subscribers = snapshot.len(), "emit");
        for callback in &snapshot {
            callback(payload);
        }
        snapshot.len()
    }
}

impl<T> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// All events a [`LiveClient`](super::LiveClient) publishes.
#[derive(Debug)]
pub struct SessionEvents {
    /// Setup acknowledged; the session is open
    pub open: Topic<()>,
    /// The session closed (locally or remotely)
    pub close: Topic<CloseEvent>,
    /// Transport or provider failure; always followed by `close` when fatal
    pub error: Topic<SessionError>,
    /// Decoded agent audio
    pub audio: Topic<AudioChunk>,
    /// User speech-to-text
    pub input_transcription: Topic<Transcription>,
    /// Agent speech-to-text
    pub output_transcription: Topic<Transcription>,
    /// Agent generated text
    pub content: Topic<String>,
    /// The agent finished its turn
    pub turn_complete: Topic<()>,
    /// The agent requests tool invocations
    pub tool_call: Topic<Vec<ToolInvocation>>,
    /// The agent withdrew pending invocations
    pub tool_call_cancellation: Topic<Vec<String>>,
    /// The current agent utterance was cut short
    pub interrupted: Topic<()>,
    /// Local playback drained after an utterance
    pub agent_speech_end: Topic<()>,
    /// The server will close soon; payload is the advertised time left
    pub go_away: Topic<Option<String>>,
}

impl SessionEvents {
    pub fn new() -> Self {
        Self {
            open: Topic::new("open"),
            close: Topic::new("close"),
            error: Topic::new("error"),
            audio: Topic::new("audio"),
            input_transcription: Topic::new("inputTranscription"),
            output_transcription: Topic::new("outputTranscription"),
            content: Topic::new("content"),
            turn_complete: Topic::new("turnComplete"),
            tool_call: Topic::new("toolCall"),
            tool_call_cancellation: Topic::new("toolCallCancellation"),
            interrupted: Topic::new("interrupted"),
            agent_speech_end: Topic::new("agentSpeechEnd"),
            go_away: Topic::new("goAway"),
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
