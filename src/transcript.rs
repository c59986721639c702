//! Incremental conversation transcript
//!
//! The remote session streams transcription text in small fragments, often a
//! few words at a time, for both what the user said and what the model spoke.
//! [`TranscriptLog`] folds those fragments into whole turns: a fragment with
//! the same role as the newest turn extends it, a fragment with the other role
//! seals the newest turn and starts a new one. Turns are kept strictly in
//! arrival order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a transcript fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// The person on the microphone
    User,
    /// The remote generative model
    Model,
}

impl std::fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// One contiguous utterance by a single speaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// Speaker the turn belongs to
    pub role: SpeakerRole,
    /// Accumulated text, grown fragment by fragment
    pub text: String,
    /// When the first fragment of the turn arrived
    pub started_at: DateTime<Utc>,
}

/// Ordered log of conversation turns
#[derive(Debug, Default)]
pub struct TranscriptLog {
    turns: Vec<TranscriptTurn>,
}

impl TranscriptLog {
    /// Creates an empty log
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Folds a transcription fragment into the log.
    ///
    /// Extends the newest turn when `role` matches it, otherwise starts a new
    /// turn. Empty fragments are dropped without creating a turn. Returns
    /// `true` when a new turn was started, which also means the previous
    /// newest turn (if any) is now sealed.
    pub fn append(&mut self, role: SpeakerRole, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }

        if let Some(last) = self.turns.last_mut() {
            if last.role == role {
                last.text.push_str(fragment);
                return false;
            }
        }

        self.turns.push(TranscriptTurn {
            role,
            text: fragment.to_owned(),
            started_at: Utc::now(),
        });
        true
    }

    /// All turns in arrival order
    #[must_use]
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    /// The turn currently being extended, if any
    #[must_use]
    pub fn current(&self) -> Option<&TranscriptTurn> {
        self.turns.last()
    }

    /// Text of the newest turn, if any
    #[must_use]
    pub fn last_text(&self) -> Option<&str> {
        self.turns.last().map(|turn| turn.text.as_str())
    }

    /// Drops every turn, e.g. when a fresh conversation begins
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Number of turns in the log
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the log has no turns yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Owned copy of the turns accumulated so far
    #[must_use]
    pub fn snapshot(&self) -> Vec<TranscriptTurn> {
        self.turns.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_with_same_role_merge_into_one_turn() {
        let mut log = TranscriptLog::new();
        assert!(log.append(SpeakerRole::Model, "Hello"));
        assert!(!log.append(SpeakerRole::Model, ", world"));
        assert!(!log.append(SpeakerRole::Model, "!"));

        assert_eq!(log.len(), 1);
        assert_eq!(log.turns()[0].text, "Hello, world!");
        assert_eq!(log.turns()[0].role, SpeakerRole::Model);
    }

    #[test]
    fn role_change_seals_previous_turn() {
        let mut log = TranscriptLog::new();
        log.append(SpeakerRole::User, "What time ");
        log.append(SpeakerRole::User, "is it?");
        assert!(log.append(SpeakerRole::Model, "It is "));
        log.append(SpeakerRole::Model, "noon.");

        assert_eq!(log.len(), 2);
        assert_eq!(log.turns()[0].text, "What time is it?");
        assert_eq!(log.turns()[1].text, "It is noon.");
    }

    #[test]
    fn interleaved_roles_produce_alternating_turns() {
        let mut log = TranscriptLog::new();
        log.append(SpeakerRole::User, "a");
        log.append(SpeakerRole::Model, "b");
        log.append(SpeakerRole::User, "c");
        log.append(SpeakerRole::Model, "d");

        let roles: Vec<SpeakerRole> = log.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                SpeakerRole::User,
                SpeakerRole::Model,
                SpeakerRole::User,
                SpeakerRole::Model
            ]
        );
    }

    #[test]
    fn empty_fragment_is_a_no_op() {
        let mut log = TranscriptLog::new();
        assert!(!log.append(SpeakerRole::User, ""));
        assert!(log.is_empty());

        log.append(SpeakerRole::User, "hi");
        assert!(!log.append(SpeakerRole::Model, ""));
        assert_eq!(log.len(), 1);
        assert_eq!(log.last_text(), Some("hi"));
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = TranscriptLog::new();
        log.append(SpeakerRole::User, "hello");
        log.append(SpeakerRole::Model, "hi");
        log.clear();

        assert!(log.is_empty());
        assert!(log.last_text().is_none());
        assert!(log.current().is_none());
    }

    #[test]
    fn snapshot_is_independent_of_later_appends() {
        let mut log = TranscriptLog::new();
        log.append(SpeakerRole::User, "before");
        let snap = log.snapshot();
        log.append(SpeakerRole::User, " after");

        assert_eq!(snap[0].text, "before");
        assert_eq!(log.turns()[0].text, "before after");
    }
}
