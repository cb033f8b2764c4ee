//! Turn engine — the state machine that owns every session mutation.
//!
//! Flow per turn:
//! 1. Button turn → the value is the answer, no classification (fast path)
//! 2. Free text → classifier (slow path); only a direct answer advances
//! 3. Anything unclear → rephrase the same question, cursor untouched
//! 4. Enrichment tasks dispatched after the reply is decided, never awaited
//!
//! Mutations are staged on a working copy and committed only after the
//! fallible steps succeed, so a failed turn leaves cursor and answers
//! exactly as they were before the turn began.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::engine::input::TurnInput;
use crate::enrich::{EnrichmentQueue, EnrichmentTask, IntelItem, IntelKind};
use crate::error::{EngineError, Error};
use crate::flow::{Choice, FlowProvider, Intent, Question};
use crate::llm::generate::{COMPLETION_CLOSE, RETRY_MESSAGE};
use crate::llm::{
    ClassificationResult, ClassifyRequest, InputClassifier, LlmProvider, Rephraser,
    ReplyGenerator, TurnLabel,
};
use crate::session::{Session, SessionRegistry, SessionState, Speaker};
use crate::store::Database;

/// What the engine hands back to the presentation layer after a turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub session_id: Uuid,
    pub reply_text: String,
    /// Buttons for the active question, when it has fixed choices.
    pub buttons: Option<Vec<Choice>>,
    pub state: SessionState,
    /// Fixed completion signal: the presentation layer should collect
    /// contact info now. The engine does not manage contact capture.
    pub collect_contact: bool,
}

/// The conversation flow engine.
pub struct TurnEngine {
    flows: Arc<dyn FlowProvider>,
    store: Arc<dyn Database>,
    classifier: InputClassifier,
    rephraser: Rephraser,
    replies: ReplyGenerator,
    enrich: EnrichmentQueue,
    registry: Arc<SessionRegistry>,
    config: EngineConfig,
}

impl TurnEngine {
    pub fn new(
        flows: Arc<dyn FlowProvider>,
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn Database>,
        enrich: EnrichmentQueue,
        config: EngineConfig,
    ) -> Self {
        Self {
            flows,
            store,
            classifier: InputClassifier::new(llm.clone(), &config),
            rephraser: Rephraser::new(llm.clone(), &config),
            replies: ReplyGenerator::new(llm, &config),
            enrich,
            registry: SessionRegistry::new(),
            config,
        }
    }

    /// The live-session registry (for the idle-prune sweep).
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Start a session for a chosen intent and return the first question.
    ///
    /// Missing or empty flow data is a configuration error, surfaced
    /// explicitly — never a generic retry.
    pub async fn start_session(&self, intent: Intent) -> Result<TurnReply, Error> {
        let flow = self.flows.flow(intent).await?;
        let mut session = Session::new(intent, flow);

        let Some(first) = session.current_question().cloned() else {
            return Err(crate::error::FlowError::EmptyFlow { intent }.into());
        };
        session.push_transcript(Speaker::Assistant, first.text.clone(), self.config.transcript_tail);

        self.store.upsert_session(&session.to_record()).await?;
        let session_id = session.id;
        self.registry.insert(session).await;

        info!(session_id = %session_id, intent = %intent, "Session started");
        Ok(TurnReply {
            session_id,
            reply_text: first.text.clone(),
            buttons: buttons_for(&first),
            state: SessionState::AwaitingAnswer,
            collect_contact: false,
        })
    }

    /// Process one visitor turn to completion.
    ///
    /// Turns for one session are serialized on the per-session lock;
    /// different sessions run concurrently.
    pub async fn process_turn(
        &self,
        session_id: Uuid,
        input: TurnInput,
    ) -> Result<TurnReply, Error> {
        let handle = match self.registry.get(session_id).await {
            Some(handle) => handle,
            None => self.rehydrate(session_id).await?,
        };

        let mut session = handle.lock().await;
        session.touch();

        // Flow already exhausted: repeat the close, mutate nothing.
        if session.state.is_terminal() {
            return Ok(TurnReply {
                session_id,
                reply_text: COMPLETION_CLOSE.to_string(),
                buttons: None,
                state: SessionState::Complete,
                collect_contact: true,
            });
        }

        // A retry after a failed turn re-enters the answer path for the
        // same question.
        if session.state == SessionState::Error {
            transition(&mut session, SessionState::AwaitingAnswer);
        }

        let Some(question) = session.current_question().cloned() else {
            // Cursor already past the end but state not yet terminal —
            // settle the bookkeeping and close out.
            transition(&mut session, SessionState::Complete);
            let record = session.to_record();
            self.persist_best_effort(&record).await;
            return Ok(TurnReply {
                session_id,
                reply_text: COMPLETION_CLOSE.to_string(),
                buttons: None,
                state: SessionState::Complete,
                collect_contact: true,
            });
        };

        match input {
            // Fast path: a button value is the answer verbatim — the
            // classifier never runs.
            TurnInput::Button { value } => {
                debug!(session_id = %session_id, value = %value, "Button turn (fast path)");
                self.accept(&mut session, &question, &value, &value).await
            }
            // Slow path: free text goes through the classifier first.
            TurnInput::FreeText { text } => {
                let request = ClassifyRequest {
                    intent: session.intent,
                    question: &question,
                    recent_context: session.transcript.make_contiguous(),
                    user_message: &text,
                };
                let classification = match self.classifier.classify(&request).await {
                    Ok(classification) => classification,
                    Err(e) => {
                        let reason = EngineError::Classification {
                            reason: e.to_string(),
                        };
                        warn!(session_id = %session_id, error = %reason, "Turn failed");
                        return Ok(self.fail_turn(&mut session, &text, &question).await);
                    }
                };

                debug!(
                    session_id = %session_id,
                    primary = ?classification.primary,
                    confidence = classification.confidence,
                    "Free-text turn classified"
                );

                if classification.primary == TurnLabel::DirectAnswer {
                    // The extracted answer, falling back to the raw text.
                    let value = classification
                        .partial_answer
                        .clone()
                        .unwrap_or_else(|| text.clone());
                    self.accept(&mut session, &question, &value, &text).await
                } else {
                    self.hold_and_rephrase(&mut session, &question, &text, &classification)
                        .await
                }
            }
        }
    }

    /// Accept an answer: record it, advance the cursor, reply with the
    /// next question or the completion close.
    async fn accept(
        &self,
        session: &mut Session,
        question: &Question,
        value: &str,
        raw_text: &str,
    ) -> Result<TurnReply, Error> {
        let mut work = session.clone();
        work.push_transcript(Speaker::Visitor, raw_text, self.config.transcript_tail);
        work.turn_count += 1;
        work.accept_answer(&question.mapping_key, value);

        let next = work.current_question().cloned();
        let target = if work.is_complete() {
            SessionState::Complete
        } else {
            SessionState::AwaitingAnswer
        };
        transition(&mut work, target);

        let reply_text = self
            .replies
            .generate_reply(value, &question.text, next.as_ref().map(|q| q.text.as_str()))
            .await;
        work.push_transcript(Speaker::Assistant, reply_text.clone(), self.config.transcript_tail);

        // Commit point: nothing that can fail the turn remains after this.
        if let Err(e) = self.store.upsert_session(&work.to_record()).await {
            warn!(session_id = %session.id, error = %e, "Session persist failed");
            return Ok(self.fail_turn(session, raw_text, question).await);
        }
        let state = work.state;
        let answers = work.answers.clone();
        let intent = work.intent;
        let session_id = work.id;
        session.clone_from(&work);

        // Schema normalization runs after every accepted answer, off the
        // turn path.
        self.enrich.submit(EnrichmentTask::NormalizeProfile {
            session_id,
            intent,
            answers,
        });

        if state.is_terminal() {
            info!(session_id = %session_id, "Flow complete");
        }

        Ok(TurnReply {
            session_id,
            reply_text,
            buttons: next.as_ref().and_then(buttons_for),
            state,
            collect_contact: state.is_terminal(),
        })
    }

    /// Hold the cursor and re-ask the same question; maybe capture intel.
    async fn hold_and_rephrase(
        &self,
        session: &mut Session,
        question: &Question,
        text: &str,
        classification: &ClassificationResult,
    ) -> Result<TurnReply, Error> {
        let mut work = session.clone();
        work.push_transcript(Speaker::Visitor, text, self.config.transcript_tail);
        work.turn_count += 1;
        transition(&mut work, SessionState::Rephrasing);

        let reply_text = self
            .rephraser
            .rephrase(&question.text, text, classification)
            .await;
        work.push_transcript(Speaker::Assistant, reply_text.clone(), self.config.transcript_tail);

        if let Err(e) = self.store.upsert_session(&work.to_record()).await {
            warn!(session_id = %session.id, error = %e, "Session persist failed");
            return Ok(self.fail_turn(session, text, question).await);
        }
        let session_id = work.id;
        let turn = work.turn_count;
        let intent = work.intent;
        session.clone_from(&work);

        // Intel capture: clarifications and objections only, and only when
        // there's enough text to be a real signal.
        if let Some(kind) = IntelKind::from_label(classification.primary)
            && text.chars().count() > self.config.intel_min_chars
        {
            let tags = BTreeSet::from([intent.to_string(), question.mapping_key.clone()]);
            self.enrich.submit(EnrichmentTask::CaptureIntel(IntelItem::new(
                session_id, turn, kind, text, tags,
            )));
        }

        Ok(TurnReply {
            session_id,
            reply_text,
            buttons: buttons_for(question),
            state: SessionState::Rephrasing,
            collect_contact: false,
        })
    }

    /// Resolve a failed turn: Error state, fixed retry message, cursor and
    /// answers untouched.
    async fn fail_turn(
        &self,
        session: &mut Session,
        raw_text: &str,
        question: &Question,
    ) -> TurnReply {
        session.push_transcript(Speaker::Visitor, raw_text, self.config.transcript_tail);
        session.turn_count += 1;
        transition(session, SessionState::Error);

        self.persist_best_effort(&session.to_record()).await;

        TurnReply {
            session_id: session.id,
            reply_text: RETRY_MESSAGE.to_string(),
            buttons: buttons_for(question),
            state: SessionState::Error,
            collect_contact: false,
        }
    }

    /// Load a session from the store after a registry miss (restart or
    /// idle eviction). The flow is reloaded from the provider.
    async fn rehydrate(
        &self,
        session_id: Uuid,
    ) -> Result<Arc<tokio::sync::Mutex<Session>>, Error> {
        let record = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(EngineError::SessionNotFound { id: session_id })?;
        let flow = self.flows.flow(record.intent).await?;
        debug!(session_id = %session_id, "Rehydrated session from store");
        Ok(self.registry.insert(Session::from_record(record, flow)).await)
    }

    async fn persist_best_effort(&self, record: &crate::session::SessionRecord) {
        if let Err(e) = self.store.upsert_session(record).await {
            warn!(session_id = %record.id, error = %e, "Session persist failed");
        }
    }
}

/// Buttons for a question, when it has fixed choices.
fn buttons_for(question: &Question) -> Option<Vec<Choice>> {
    if question.choices.is_empty() {
        None
    } else {
        Some(question.choices.clone())
    }
}

/// Apply a state transition, holding the current state on an illegal move.
fn transition(session: &mut Session, target: SessionState) {
    if session.state.can_transition_to(target) {
        session.state = target;
    } else {
        warn!(
            session_id = %session.id,
            from = %session.state,
            to = %target,
            "Illegal session state transition, holding"
        );
    }
}
