//! The session record and its runtime wrapper.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::{Flow, Intent, Question};
use crate::session::state::SessionState;

/// Who said a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Visitor,
    Assistant,
}

/// One recent exchanged message. Kept in memory only, for classifier
/// context — never persisted.
#[derive(Debug, Clone)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
}

/// The persisted portion of a session. The flow itself is not stored —
/// it is reloaded from the flow provider when a session is rehydrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub intent: Intent,
    pub cursor: usize,
    pub answers: BTreeMap<String, String>,
    pub turn_count: u32,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// One live conversation. Mutated exclusively by the turn engine, under
/// the per-session lock held by the registry.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub intent: Intent,
    pub flow: Flow,
    pub cursor: usize,
    pub answers: BTreeMap<String, String>,
    pub turn_count: u32,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Recent transcript tail for classifier context. In-memory only.
    pub transcript: VecDeque<TranscriptLine>,
}

impl Session {
    /// Create a fresh session for a chosen intent. Starts at the first
    /// question with the cursor at zero.
    pub fn new(intent: Intent, flow: Flow) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            intent,
            flow,
            cursor: 0,
            answers: BTreeMap::new(),
            turn_count: 0,
            state: SessionState::AwaitingAnswer,
            created_at: now,
            last_activity: now,
            transcript: VecDeque::new(),
        }
    }

    /// Rehydrate a session from its stored record plus the (re-loaded) flow.
    pub fn from_record(record: SessionRecord, flow: Flow) -> Self {
        Self {
            id: record.id,
            intent: record.intent,
            flow,
            cursor: record.cursor,
            answers: record.answers,
            turn_count: record.turn_count,
            state: record.state,
            created_at: record.created_at,
            last_activity: record.last_activity,
            transcript: VecDeque::new(),
        }
    }

    /// The persisted projection of this session.
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            intent: self.intent,
            cursor: self.cursor,
            answers: self.answers.clone(),
            turn_count: self.turn_count,
            state: self.state,
            created_at: self.created_at,
            last_activity: self.last_activity,
        }
    }

    /// The question the session is currently waiting on.
    pub fn current_question(&self) -> Option<&Question> {
        self.flow.question_at(self.cursor)
    }

    /// Completion is a pure function of the cursor: the flow is done
    /// exactly when the cursor has walked past the last question.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.flow.len()
    }

    /// Record an accepted answer and advance the cursor.
    ///
    /// Answers only grow: a later accepted answer for an already-answered
    /// mapping key is ignored. Empty values are never stored.
    pub fn accept_answer(&mut self, mapping_key: &str, value: &str) {
        if value.trim().is_empty() {
            tracing::warn!(
                session_id = %self.id,
                mapping_key,
                "Refusing to record empty answer value"
            );
        } else if self.answers.contains_key(mapping_key) {
            tracing::warn!(
                session_id = %self.id,
                mapping_key,
                "Answer already recorded for key, keeping first"
            );
        } else {
            self.answers
                .insert(mapping_key.to_string(), value.trim().to_string());
        }
        self.cursor += 1;
    }

    /// Append a line to the transcript tail, trimming to `keep` lines.
    pub fn push_transcript(&mut self, speaker: Speaker, text: impl Into<String>, keep: usize) {
        self.transcript.push_back(TranscriptLine {
            speaker,
            text: text.into(),
        });
        while self.transcript.len() > keep {
            self.transcript.pop_front();
        }
    }

    /// Mark activity now (for idle pruning).
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Choice;

    fn two_question_flow() -> Flow {
        Flow::new(
            Intent::Buy,
            vec![
                Question::new("q1", "budget", "What's your budget?").with_choices(vec![
                    Choice::new("Under $500k", "under_500k"),
                    Choice::new("Over $500k", "over_500k"),
                ]),
                Question::new("q2", "timeline", "When do you want to move?"),
            ],
        )
    }

    #[test]
    fn new_session_starts_at_first_question() {
        let session = Session::new(Intent::Buy, two_question_flow());
        assert_eq!(session.cursor, 0);
        assert_eq!(session.state, SessionState::AwaitingAnswer);
        assert_eq!(session.current_question().unwrap().mapping_key, "budget");
        assert!(!session.is_complete());
    }

    #[test]
    fn accept_answer_advances_cursor() {
        let mut session = Session::new(Intent::Buy, two_question_flow());
        session.accept_answer("budget", "under_500k");
        assert_eq!(session.cursor, 1);
        assert_eq!(session.answers["budget"], "under_500k");
        assert_eq!(session.current_question().unwrap().mapping_key, "timeline");
    }

    #[test]
    fn completion_exactness() {
        let mut session = Session::new(Intent::Buy, two_question_flow());
        assert!(!session.is_complete());
        session.accept_answer("budget", "under_500k");
        assert!(!session.is_complete());
        session.accept_answer("timeline", "3-6 months");
        // Complete exactly when cursor == len(questions), never earlier.
        assert_eq!(session.cursor, session.flow.len());
        assert!(session.is_complete());
    }

    #[test]
    fn answers_only_grow() {
        let mut session = Session::new(Intent::Buy, two_question_flow());
        session.accept_answer("budget", "under_500k");
        // A second accepted answer for the same key is ignored.
        session.accept_answer("budget", "over_500k");
        assert_eq!(session.answers["budget"], "under_500k");
        // Empty values are never stored.
        session.accept_answer("timeline", "   ");
        assert!(!session.answers.contains_key("timeline"));
    }

    #[test]
    fn record_roundtrip_preserves_progress() {
        let mut session = Session::new(Intent::Buy, two_question_flow());
        session.accept_answer("budget", "under_500k");
        session.turn_count = 3;
        session.state = SessionState::Rephrasing;

        let record = session.to_record();
        let rehydrated = Session::from_record(record, two_question_flow());
        assert_eq!(rehydrated.cursor, 1);
        assert_eq!(rehydrated.turn_count, 3);
        assert_eq!(rehydrated.state, SessionState::Rephrasing);
        assert_eq!(rehydrated.answers["budget"], "under_500k");
        assert!(rehydrated.transcript.is_empty());
    }

    #[test]
    fn transcript_tail_is_bounded() {
        let mut session = Session::new(Intent::Buy, two_question_flow());
        for i in 0..10 {
            session.push_transcript(Speaker::Visitor, format!("line {i}"), 4);
        }
        assert_eq!(session.transcript.len(), 4);
        assert_eq!(session.transcript.front().unwrap().text, "line 6");
    }
}
