//! Intel items — background-captured conversation signals.
//!
//! Append-only and never read back by the turn engine; the agent dashboard
//! is the consumer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::TurnLabel;

/// What kind of signal was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntelKind {
    /// The visitor asked something back.
    Question,
    /// The visitor pushed back — friction worth surfacing.
    PainPoint,
    /// The visitor showed interest in a topic outside the flow.
    TopicInterest,
}

impl std::fmt::Display for IntelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Question => "question",
            Self::PainPoint => "pain_point",
            Self::TopicInterest => "topic_interest",
        };
        write!(f, "{s}")
    }
}

impl IntelKind {
    /// Parse the stored string form. Inverse of `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "question" => Some(Self::Question),
            "pain_point" => Some(Self::PainPoint),
            "topic_interest" => Some(Self::TopicInterest),
            _ => None,
        }
    }

    /// The intel kind for a classification label, if that label is one we
    /// capture (clarifications and objections only).
    pub fn from_label(label: TurnLabel) -> Option<Self> {
        match label {
            TurnLabel::Clarification => Some(Self::Question),
            TurnLabel::Objection => Some(Self::PainPoint),
            _ => None,
        }
    }
}

/// One captured signal. Idempotent per (session, turn) — re-processing a
/// turn overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelItem {
    pub session_id: Uuid,
    /// Turn number the signal came from (idempotency key with session_id).
    pub turn: u32,
    pub kind: IntelKind,
    /// The raw visitor message.
    pub content: String,
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl IntelItem {
    pub fn new(
        session_id: Uuid,
        turn: u32,
        kind: IntelKind,
        content: impl Into<String>,
        tags: BTreeSet<String>,
    ) -> Self {
        Self {
            session_id,
            turn,
            kind,
            content: content.into(),
            tags,
            created_at: Utc::now(),
        }
    }
}
