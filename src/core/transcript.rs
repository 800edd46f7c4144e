//! Transcript reconciliation.
//!
//! User speech-to-text, agent speech-to-text and agent text arrive as three
//! unordered streams of small increments. [`TranscriptLog`] folds them into
//! an ordered list of [`ConversationTurn`]s:
//!
//! - each role has at most one open (non-final) turn
//! - an increment appends to its role's open turn, or opens a new turn
//! - the increment's finality becomes the turn's finality
//! - `turnComplete` finalizes every open turn
//! - system entries are appended already final and never merge
//!
//! Finalized turns are never modified again. Every change is announced on a
//! broadcast channel so displays can follow along.

use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;
use tokio::sync::broadcast;

/// Capacity of the update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Who a turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub is_final: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Change notification for transcript consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptUpdate {
    /// A new turn was added at `index`
    Appended { index: usize, turn: ConversationTurn },
    /// The turn at `index` changed
    Updated { index: usize, turn: ConversationTurn },
    /// The log was emptied
    Cleared,
}

/// Ordered, reconciled conversation log.
#[derive(Debug)]
pub struct TranscriptLog {
    turns: Vec<ConversationTurn>,
    open_user: Option<usize>,
    open_agent: Option<usize>,
    updates: broadcast::Sender<TranscriptUpdate>,
}

impl Default for TranscriptLog {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptLog {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            turns: Vec::new(),
            open_user: None,
            open_agent: None,
            updates,
        }
    }

    /// Follow changes to the log.
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptUpdate> {
        self.updates.subscribe()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The open turn of `role`, if any.
    pub fn open_turn(&self, role: Role) -> Option<&ConversationTurn> {
        match role {
            Role::User => self.open_user,
            Role::Agent => self.open_agent,
            Role::System => None,
        }
        .and_then(|i| self.turns.get(i))
    }

    /// Fold one increment into the log.
    ///
    /// Empty text never opens a turn, but a final empty increment still
    /// closes the role's open turn. System text is routed to
    /// [`push_system`](Self::push_system).
    pub fn apply(&mut self, role: Role, text: &str, is_final: bool) {
        if role == Role::System {
            if !text.is_empty() {
                self.push_system(text);
            }
            return;
        }

        match self.open_slot(role).and_then(|i| self.turns.get_mut(i).map(|t| (i, t))) {
            Some((index, turn)) => {
                turn.text.push_str(text);
                turn.is_final = is_final;
                let turn = turn.clone();
                if is_final {
                    *self.open_slot_mut(role) = None;
                }
                self.publish(TranscriptUpdate::Updated { index, turn });
            }
            None => {
                if text.is_empty() {
                    return;
                }
                let index = self.turns.len();
                let turn = ConversationTurn {
                    role,
                    text: text.to_string(),
                    is_final,
                    timestamp: OffsetDateTime::now_utc(),
                };
                self.turns.push(turn.clone());
                if !is_final {
                    *self.open_slot_mut(role) = Some(index);
                }
                self.publish(TranscriptUpdate::Appended { index, turn });
            }
        }
    }

    /// Append an already-final system entry.
    pub fn push_system(&mut self, text: &str) {
        let index = self.turns.len();
        let turn = ConversationTurn {
            role: Role::System,
            text: text.to_string(),
            is_final: true,
            timestamp: OffsetDateTime::now_utc(),
        };
        self.turns.push(turn.clone());
        self.publish(TranscriptUpdate::Appended { index, turn });
    }

    /// Finalize every open turn.
    pub fn complete_turn(&mut self) {
        for role in [Role::User, Role::Agent] {
            if let Some(index) = self.open_slot_mut(role).take()
                && let Some(turn) = self.turns.get_mut(index)
            {
                turn.is_final = true;
                let turn = turn.clone();
                self.publish(TranscriptUpdate::Updated { index, turn });
            }
        }
    }

    /// Empty the log for a new conversation.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.open_user = None;
        self.open_agent = None;
        self.publish(TranscriptUpdate::Cleared);
    }

    fn open_slot(&self, role: Role) -> Option<usize> {
        match role {
            Role::User => self.open_user,
            Role::Agent => self.open_agent,
            Role::System => None,
        }
    }

    fn open_slot_mut(&mut self, role: Role) -> &mut Option<usize> {
        match role {
            Role::User => &mut self.open_user,
            // System turns are never open; callers only pass user or agent.
            Role::Agent | Role::System => &mut self.open_agent,
        }
    }

    fn publish(&self, update: TranscriptUpdate) {
        // No receivers is fine.
        let _ = self.updates.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(log: &TranscriptLog) -> Vec<(Role, &str, bool)> {
        log.turns()
            .iter()
            .map(|t| (t.role, t.text.as_str(), t.is_final))
            .collect()
    }

    #[test]
    fn test_partial_then_final_merges() {
        let mut log = TranscriptLog::new();
        log.apply(Role::User, "Hi", false);
        log.apply(Role::User, " there", true);
        assert_eq!(texts(&log), vec![(Role::User, "Hi there", true)]);
        assert!(log.open_turn(Role::User).is_none());
    }

    #[test]
    fn test_roles_do_not_merge() {
        let mut log = TranscriptLog::new();
        log.apply(Role::User, "A", false);
        log.apply(Role::Agent, "B", false);
        log.apply(Role::User, "C", true);
        assert_eq!(
            texts(&log),
            vec![(Role::User, "AC", true), (Role::Agent, "B", false)]
        );
        assert!(log.open_turn(Role::Agent).is_some());
    }

    #[test]
    fn test_final_turn_is_immutable() {
        let mut log = TranscriptLog::new();
        log.apply(Role::Agent, "Hello.", true);
        log.apply(Role::Agent, "Next", false);
        assert_eq!(
            texts(&log),
            vec![(Role::Agent, "Hello.", true), (Role::Agent, "Next", false)]
        );
    }

    #[test]
    fn test_turn_complete_finalizes_all_open_turns() {
        let mut log = TranscriptLog::new();
        log.apply(Role::User, "question", false);
        log.apply(Role::Agent, "answer", false);
        log.complete_turn();
        assert!(log.turns().iter().all(|t| t.is_final));

        log.apply(Role::Agent, "more", false);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_system_turns_never_merge() {
        let mut log = TranscriptLog::new();
        log.push_system("one");
        log.apply(Role::System, "two", false);
        assert_eq!(
            texts(&log),
            vec![(Role::System, "one", true), (Role::System, "two", true)]
        );
    }

    #[test]
    fn test_empty_text_handling() {
        let mut log = TranscriptLog::new();
        log.apply(Role::User, "", false);
        log.apply(Role::User, "", true);
        assert!(log.is_empty());

        log.apply(Role::User, "hello", false);
        log.apply(Role::User, "", true);
        assert_eq!(texts(&log), vec![(Role::User, "hello", true)]);
    }

    #[test]
    fn test_updates_are_broadcast() {
        let mut log = TranscriptLog::new();
        let mut rx = log.subscribe();

        log.apply(Role::User, "Hi", false);
        log.apply(Role::User, "!", true);
        log.clear();

        assert!(matches!(
            rx.try_recv().unwrap(),
            TranscriptUpdate::Appended { index: 0, .. }
        ));
        match rx.try_recv().unwrap() {
            TranscriptUpdate::Updated { index, turn } => {
                assert_eq!(index, 0);
                assert_eq!(turn.text, "Hi!");
            }
            other => panic!("unexpected update {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap(), TranscriptUpdate::Cleared);
        assert!(log.is_empty());
    }

    #[test]
    fn test_turn_serializes_with_rfc3339_timestamp() {
        let mut log = TranscriptLog::new();
        log.apply(Role::Agent, "hi", true);
        let value = serde_json::to_value(&log.turns()[0]).unwrap();
        assert_eq!(value["role"], "agent");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }
}
