//! Flow data model: intents, questions, and fixed choices.

use serde::{Deserialize, Serialize};

/// What the visitor came to do. Selecting an intent starts a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Buy,
    Sell,
    Browse,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Browse => "browse",
        };
        write!(f, "{s}")
    }
}

impl Intent {
    /// Parse the stored string form. Inverse of `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            "browse" => Some(Self::Browse),
            _ => None,
        }
    }
}

/// A fixed button choice. Selecting one is a zero-ambiguity answer —
/// the value is recorded verbatim with no classification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Text shown on the button.
    pub label: String,
    /// Value recorded as the answer.
    pub value: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// One question in a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier within the flow.
    pub id: String,
    /// Key under which the answer lands in the session's answer map.
    pub mapping_key: String,
    /// The question text shown to the visitor.
    pub text: String,
    /// Fixed choices. Empty means free-text only.
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        mapping_key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            mapping_key: mapping_key.into(),
            text: text.into(),
            choices: Vec::new(),
        }
    }

    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = choices;
        self
    }
}

/// The ordered question sequence for one intent. Immutable — loaded once
/// per session from the flow provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub intent: Intent,
    pub questions: Vec<Question>,
}

impl Flow {
    pub fn new(intent: Intent, questions: Vec<Question>) -> Self {
        Self { intent, questions }
    }

    /// The question at `cursor`, if the flow is not exhausted.
    pub fn question_at(&self, cursor: usize) -> Option<&Question> {
        self.questions.get(cursor)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
