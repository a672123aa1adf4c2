// Conversation history
// In-memory transcript owned by the caller and passed into each generation call


use serde::{Deserialize, Serialize};
use std::fmt;

/// Who said a turn. The assistant carries its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Assistant(String),
}

impl fmt::Display for Speaker {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Assistant(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    assistant_name: String,
    turns: Vec<Turn>,
}

impl ConversationHistory {
    #[inline]
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            assistant_name: assistant_name.into(),
            turns: Vec::new(),
        }
    }

    /// Start a session with the assistant's greeting as the first turn
    #[inline]
    pub fn with_greeting(assistant_name: impl Into<String>, greeting: impl Into<String>) -> Self {
        let mut history = Self::new(assistant_name);
        history.push_assistant(greeting);
        history
    }

    #[inline]
    pub fn assistant_name(&self) -> &str {
        &self.assistant_name
    }

    #[inline]
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::User,
            text: text.into(),
        });
    }

    #[inline]
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::Assistant(self.assistant_name.clone()),
            text: text.into(),
        });
    }

    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// One `Speaker: text` line per turn
    #[inline]
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}: {}", turn.speaker, turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Transcript as it will read once `user_text` is added, without changing the history
    #[inline]
    pub fn transcript_with_pending(&self, user_text: &str) -> String {
        let pending = format!("{}: {}", Speaker::User, user_text);
        if self.turns.is_empty() {
            pending
        } else {
            format!("{}\n{}", self.transcript(), pending)
        }
    }
}
