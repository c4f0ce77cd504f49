//! Conversation transcript: the ordered, append-only turn history that is
//! replayed to the model on every round trip.

use serde::{Deserialize, Serialize};

use crate::types::{Role, Turn};

/// Ordered turn history of one conversation.
///
/// Turns can only be appended; there is no API to edit or drop an existing
/// turn. Serializes as a plain JSON array of Messages API messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Immutable copy handed back to callers after a turn completes.
    pub fn snapshot(&self) -> Transcript {
        self.clone()
    }

    /// Role labels in order, mostly useful for diagnostics.
    pub fn roles(&self) -> Vec<Role> {
        self.turns.iter().map(|t| t.role).collect()
    }
}

impl From<Vec<Turn>> for Transcript {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}
