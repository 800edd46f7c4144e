//! Turn-taking timer supervisor.
//!
//! Floor control is a set of named timer slots, each either disarmed or
//! armed with a deadline:
//!
//! | Slot              | Armed by             | Disarmed by                         | On expiry        |
//! |-------------------|----------------------|-------------------------------------|------------------|
//! | long speech       | user speech          | agent speech, turn complete         | mute microphone  |
//! | silence prompt    | agent speech end     | user speech, agent speech           | send visual cue  |
//! | silence disconnect| agent speech end     | user speech, agent speech           | end the session  |
//!
//! Re-arming a slot replaces its deadline. Every slot is disarmed on
//! disconnect. The supervisor performs no I/O: its owner feeds it
//! [`TurnSignal`]s, sleeps until [`TurnTakingSupervisor::next_deadline`] and
//! executes whatever [`TurnTakingSupervisor::poll`] returns.

use std::time::Duration;

use tokio::time::Instant;

/// Policy thresholds. These are tuning constants, not protocol values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTakingPolicy {
    pub long_speech: Duration,
    pub silence_prompt: Duration,
    pub silence_disconnect: Duration,
}

impl Default for TurnTakingPolicy {
    fn default() -> Self {
        Self {
            long_speech: Duration::from_secs(30),
            silence_prompt: Duration::from_secs(10),
            silence_disconnect: Duration::from_secs(30),
        }
    }
}

/// Conversation events relevant to floor control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    /// User speech was transcribed
    UserSpeech,
    /// Agent speech was transcribed
    AgentSpeech,
    /// The agent finished its turn
    AgentTurnComplete,
    /// Local playback of the agent's utterance drained
    AgentSpeechEnd,
    /// The session closed
    Disconnected,
}

/// What the owner must do when a timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAction {
    /// Force-mute the microphone; the agent should take the floor
    MuteMicrophone,
    /// Nudge the agent with the silence cue frame
    PromptSilence,
    /// End the session
    EndSession,
}

/// Named timer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSlot {
    LongSpeech,
    SilencePrompt,
    SilenceDisconnect,
}

impl TimerSlot {
    fn action(self) -> TurnAction {
        match self {
            TimerSlot::LongSpeech => TurnAction::MuteMicrophone,
            TimerSlot::SilencePrompt => TurnAction::PromptSilence,
            TimerSlot::SilenceDisconnect => TurnAction::EndSession,
        }
    }
}

/// Finite-state floor-control supervisor.
#[derive(Debug, Clone, Default)]
pub struct TurnTakingSupervisor {
    policy: TurnTakingPolicy,
    long_speech: Option<Instant>,
    silence_prompt: Option<Instant>,
    silence_disconnect: Option<Instant>,
}

impl TurnTakingSupervisor {
    pub fn new(policy: TurnTakingPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &TurnTakingPolicy {
        &self.policy
    }

    /// Deadline of `slot`, if armed.
    pub fn deadline(&self, slot: TimerSlot) -> Option<Instant> {
        match slot {
            TimerSlot::LongSpeech => self.long_speech,
            TimerSlot::SilencePrompt => self.silence_prompt,
            TimerSlot::SilenceDisconnect => self.silence_disconnect,
        }
    }

    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.deadline(slot).is_some()
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.long_speech, self.silence_prompt, self.silence_disconnect]
            .into_iter()
            .flatten()
            .min()
    }

    /// Apply a conversation event at time `now`.
    pub fn observe(&mut self, signal: TurnSignal, now: Instant) {
        match signal {
            TurnSignal::UserSpeech => {
                self.long_speech = Some(now + self.policy.long_speech);
                self.disarm_silence();
            }
            TurnSignal::AgentSpeech => {
                self.long_speech = None;
                self.disarm_silence();
            }
            TurnSignal::AgentTurnComplete => {
                self.long_speech = None;
            }
            TurnSignal::AgentSpeechEnd => {
                // The user holds the floor; the conversation is not silent.
                if self.long_speech.is_some() {
                    tracing::debug!("Agent speech ended while the user is speaking");
                    return;
                }
                self.silence_prompt = Some(now + self.policy.silence_prompt);
                self.silence_disconnect = Some(now + self.policy.silence_disconnect);
                tracing::debug!("Silence timers armed");
            }
            TurnSignal::Disconnected => {
                self.disarm_all();
            }
        }
    }

    /// Disarm and return every slot whose deadline has passed, earliest first.
    pub fn poll(&mut self, now: Instant) -> Vec<TurnAction> {
        let mut expired: Vec<(Instant, TimerSlot)> = Vec::new();
        for slot in [
            TimerSlot::LongSpeech,
            TimerSlot::SilencePrompt,
            TimerSlot::SilenceDisconnect,
        ] {
            let deadline = self.slot_mut(slot);
            if let Some(at) = *deadline
                && at <= now
            {
                *deadline = None;
                expired.push((at, slot));
            }
        }
        expired.sort_by_key(|(at, _)| *at);

        expired
            .into_iter()
            .map(|(_, slot)| {
                tracing::info!(timer = ?slot, "Turn-taking timer fired");
                slot.action()
            })
            .collect()
    }

    pub fn disarm_all(&mut self) {
        self.long_speech = None;
        self.disarm_silence();
    }

    fn disarm_silence(&mut self) {
        self.silence_prompt = None;
        self.silence_disconnect = None;
    }

    fn slot_mut(&mut self, slot: TimerSlot) -> &mut Option<Instant> {
        match slot {
            TimerSlot::LongSpeech => &mut self.long_speech,
            TimerSlot::SilencePrompt => &mut self.silence_prompt,
            TimerSlot::SilenceDisconnect => &mut self.silence_disconnect,
        }
    }
}
