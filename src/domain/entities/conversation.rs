use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordered log of turns for one pipeline instance. Append-only; `clear`
/// drops everything at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    turns: Vec<ConversationTurn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The most recent `max_turns` turns, oldest first.
    pub fn history(&self, max_turns: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(max_turns);
        &self.turns[start..]
    }

    pub fn clear(&mut self) {
        self.turns = Vec::new();
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
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}
