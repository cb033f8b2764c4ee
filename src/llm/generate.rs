//! Outbound text generation — rephrases and reply acknowledgments.
//!
//! Both generators are purely cosmetic: they never decide state
//! transitions, and every failure path lands on a fixed textual fallback
//! so the turn always resolves to a visible response.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::EngineConfig;
use crate::llm::classifier::{ClassificationResult, Tone};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

const GENERATE_MAX_TOKENS: u32 = 256;
const GENERATE_TEMPERATURE: f32 = 0.7;

/// Fixed retry line for failed turns (classification or storage trouble).
pub const RETRY_MESSAGE: &str =
    "Sorry — something hiccuped on my end. Mind sending that one more time?";

/// Fixed closing line once the flow is exhausted.
pub const COMPLETION_CLOSE: &str =
    "That's everything I needed — thanks! Let's grab your contact details so an agent can follow up.";

/// Fallback acknowledgment when reply generation fails.
const FALLBACK_ACK: &str = "Got it, thanks!";

/// Fallback acknowledgment prefix when rephrase generation fails.
const FALLBACK_REPHRASE_ACK: &str = "Totally fair —";

/// Produces a re-ask of the *same* question when the visitor went
/// off-script. Never changes which question is active.
pub struct Rephraser {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl Rephraser {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &EngineConfig) -> Self {
        Self {
            llm,
            timeout: config.generate_timeout,
        }
    }

    /// Re-ask `question_text`, adapting tone to the classification.
    ///
    /// On any failure: acknowledgment prefix + the original question
    /// verbatim.
    pub async fn rephrase(
        &self,
        question_text: &str,
        user_message: &str,
        classification: &ClassificationResult,
    ) -> String {
        let tone = classification.suggested_tone.unwrap_or(Tone::Empathetic);

        let system = format!(
            "You are a {} real-estate assistant. The visitor did not answer the \
             question you asked. Acknowledge what they said in one short sentence, \
             then ask the SAME question again in different words. Do not introduce \
             a new question. Two sentences maximum. Output only the message text.",
            tone.guidance()
        );
        let user = format!(
            "Question you asked: {question_text}\nVisitor said: {user_message}"
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_temperature(GENERATE_TEMPERATURE)
        .with_max_tokens(GENERATE_MAX_TOKENS);

        match tokio::time::timeout(self.timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) if !response.content.trim().is_empty() => {
                response.content.trim().to_string()
            }
            Ok(Ok(_)) => {
                warn!("Rephrase generation returned empty text, using fallback");
                fallback_rephrase(question_text)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Rephrase generation failed, using fallback");
                fallback_rephrase(question_text)
            }
            Err(_) => {
                warn!("Rephrase generation timed out, using fallback");
                fallback_rephrase(question_text)
            }
        }
    }
}

fn fallback_rephrase(question_text: &str) -> String {
    format!("{FALLBACK_REPHRASE_ACK} {question_text}")
}

/// Produces the acknowledgment shown after an accepted answer.
///
/// The transition to the next question (or the completion close) is
/// appended structurally, so a flaky generation can never drop the
/// question the visitor is supposed to answer next.
pub struct ReplyGenerator {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &EngineConfig) -> Self {
        Self {
            llm,
            timeout: config.generate_timeout,
        }
    }

    /// Acknowledgment plus either the next question or a completion close.
    pub async fn generate_reply(
        &self,
        accepted_answer: &str,
        previous_question: &str,
        next_question: Option<&str>,
    ) -> String {
        let ack = self
            .acknowledgment(accepted_answer, previous_question, next_question)
            .await;
        match next_question {
            Some(next) => format!("{ack} {next}"),
            None => format!("{ack} {COMPLETION_CLOSE}"),
        }
    }

    async fn acknowledgment(
        &self,
        accepted_answer: &str,
        previous_question: &str,
        next_question: Option<&str>,
    ) -> String {
        let lead_in = match next_question {
            Some(_) => "You will ask another question right after, so end naturally.",
            None => "That was the last question, so make it sound like a wrap-up.",
        };
        let system = format!(
            "You are a warm, concise real-estate assistant. The visitor just \
             answered a question. Write ONE short acknowledgment sentence for \
             their answer. No questions, no emoji. {lead_in} Output only the \
             sentence."
        );
        let user = format!(
            "Question: {previous_question}\nTheir answer: {accepted_answer}"
        );

        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_temperature(GENERATE_TEMPERATURE)
        .with_max_tokens(GENERATE_MAX_TOKENS);

        match tokio::time::timeout(self.timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) if !response.content.trim().is_empty() => {
                response.content.trim().to_string()
            }
            Ok(Ok(_)) => {
                warn!("Reply generation returned empty text, using fallback");
                FALLBACK_ACK.to_string()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Reply generation failed, using fallback");
                FALLBACK_ACK.to_string()
            }
            Err(_) => {
                warn!("Reply generation timed out, using fallback");
                FALLBACK_ACK.to_string()
            }
        }
    }
}
