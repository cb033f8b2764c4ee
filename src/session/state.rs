//! Session state machine — tracks where a conversation is.

use serde::{Deserialize, Serialize};

/// The states of one lead conversation.
///
/// Normal progression: AwaitingIntent → AwaitingAnswer ⇄ Rephrasing → …
/// → Complete. Error is reachable from the answering states when a
/// downstream call fails, and returns to AwaitingAnswer on retry — the
/// active question is never skipped on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    AwaitingIntent,
    AwaitingAnswer,
    Rephrasing,
    Complete,
    Error,
}

impl SessionState {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (AwaitingIntent, AwaitingAnswer)
                | (AwaitingAnswer, AwaitingAnswer)
                | (AwaitingAnswer, Rephrasing)
                | (AwaitingAnswer, Complete)
                | (AwaitingAnswer, Error)
                | (Rephrasing, AwaitingAnswer)
                | (Rephrasing, Rephrasing)
                | (Rephrasing, Complete)
                | (Rephrasing, Error)
                | (Error, AwaitingAnswer)
        )
    }

    /// Whether this state is terminal (the flow is exhausted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::AwaitingIntent
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingIntent => "awaiting_intent",
            Self::AwaitingAnswer => "awaiting_answer",
            Self::Rephrasing => "rephrasing",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl SessionState {
    /// Parse the stored string form. Inverse of `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_intent" => Some(Self::AwaitingIntent),
            "awaiting_answer" => Some(Self::AwaitingAnswer),
            "rephrasing" => Some(Self::Rephrasing),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}
