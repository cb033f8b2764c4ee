//! Turn input — the one place button and free-text turns diverge.
//!
//! The origin of a turn decides the whole processing path: button values
//! are answers verbatim (fast path, no classification), free text goes
//! through the classifier (slow path). Modeling the origin as a tagged
//! variant keeps that branch in exactly one match.

use serde::{Deserialize, Serialize};

/// One visitor turn, as submitted by the chat UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnInput {
    /// A fixed choice was clicked. The value is the answer, verbatim.
    Button { value: String },
    /// The visitor typed a message.
    FreeText { text: String },
}

impl TurnInput {
    /// The raw text of the turn, whichever the origin.
    pub fn raw_text(&self) -> &str {
        match self {
            Self::Button { value } => value,
            Self::FreeText { text } => text,
        }
    }
}
