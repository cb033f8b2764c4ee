//! Input classifier — turns one free-text visitor turn into a structured
//! classification.
//!
//! Called **only** for free-text turns; button turns never reach this code.
//! The output shape is strict: an enumerated primary label, informational
//! confidence, an optional extracted answer, and an optional tone hint.
//! Malformed model output is re-asked once and then rejected — it is never
//! propagated downstream uninterpreted. Classification never mutates
//! session state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::LlmError;
use crate::flow::{Intent, Question};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::llm::retry;
use crate::session::{Speaker, TranscriptLine};

/// Max tokens for the classification call (kept tight — runs on every
/// free-text turn).
const CLASSIFY_MAX_TOKENS: u32 = 512;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// What a free-text turn fundamentally is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnLabel {
    /// The message answers the active question.
    DirectAnswer,
    /// The visitor is asking something back instead of answering.
    Clarification,
    /// The visitor pushes back on the question or the process.
    Objection,
    /// Small talk, pleasantries.
    Chitchat,
    /// The visitor wants a human.
    Escalation,
    /// Unrelated to the conversation.
    OffTopic,
    /// Tried to answer but the answer can't be pinned down.
    AmbiguousAttempt,
}

impl TurnLabel {
    /// Parse the wire string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct_answer" => Some(Self::DirectAnswer),
            "clarification" => Some(Self::Clarification),
            "objection" => Some(Self::Objection),
            "chitchat" => Some(Self::Chitchat),
            "escalation" => Some(Self::Escalation),
            "off_topic" => Some(Self::OffTopic),
            "ambiguous_attempt" => Some(Self::AmbiguousAttempt),
            _ => None,
        }
    }
}

/// Tone hint for the rephraser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Empathetic,
    Friendly,
    Professional,
    Reassuring,
}

impl Tone {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "empathetic" => Some(Self::Empathetic),
            "friendly" => Some(Self::Friendly),
            "professional" => Some(Self::Professional),
            "reassuring" => Some(Self::Reassuring),
            _ => None,
        }
    }

    /// Guidance phrase for generation prompts.
    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Empathetic => "warm and understanding",
            Self::Friendly => "light and friendly",
            Self::Professional => "polished and professional",
            Self::Reassuring => "calm and reassuring",
        }
    }
}

/// Structured classification of one free-text turn.
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub primary: TurnLabel,
    /// Informational only — the transitioner accepts any DirectAnswer
    /// regardless of this value.
    pub confidence: f32,
    /// Extracted answer value, present for direct answers.
    pub partial_answer: Option<String>,
    pub suggested_tone: Option<Tone>,
}

/// One free-text turn to classify, with its flow context.
pub struct ClassifyRequest<'a> {
    pub intent: Intent,
    pub question: &'a Question,
    pub recent_context: &'a [TranscriptLine],
    pub user_message: &'a str,
}

/// The classifier: prompt construction, strict parsing, bounded retries.
pub struct InputClassifier {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
    max_attempts: u32,
}

impl InputClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, config: &EngineConfig) -> Self {
        Self {
            llm,
            timeout: config.classify_timeout,
            max_attempts: config.classify_max_attempts,
        }
    }

    /// Classify one free-text turn.
    ///
    /// Transport failures are retried with backoff; malformed output gets
    /// one structured re-ask. Anything still broken after that is an error
    /// the turn engine converts into a retry message for the visitor.
    pub async fn classify(
        &self,
        request: &ClassifyRequest<'_>,
    ) -> Result<ClassificationResult, LlmError> {
        let completion = CompletionRequest::new(vec![
            ChatMessage::system(build_classify_system_prompt()),
            ChatMessage::user(build_classify_user_prompt(request)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let mut last_parse_error = String::new();
        for parse_attempt in 1..=2u32 {
            let response = self.call_with_timeout(&completion).await?;
            match parse_classification(&response.content) {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(
                        raw_response = %response.content,
                        error = %e,
                        parse_attempt,
                        "Malformed classification output"
                    );
                    last_parse_error = e;
                }
            }
        }

        Err(LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason: format!("classification output malformed after retry: {last_parse_error}"),
        })
    }

    async fn call_with_timeout(
        &self,
        completion: &CompletionRequest,
    ) -> Result<crate::llm::provider::CompletionResponse, LlmError> {
        let llm = self.llm.clone();
        let timeout = self.timeout;
        retry::with_backoff("classify", self.max_attempts, move || {
            let llm = llm.clone();
            let completion = completion.clone();
            async move {
                match tokio::time::timeout(timeout, llm.complete(completion)).await {
                    Ok(result) => result,
                    Err(_) => Err(LlmError::Timeout { elapsed: timeout }),
                }
            }
        })
        .await
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the classification system prompt.
fn build_classify_system_prompt() -> String {
    "You are the message classifier for a real-estate lead assistant. \
     The assistant asked the visitor a question; classify the visitor's message.\n\n\
     Labels:\n\
     - \"direct_answer\": the message answers the question. Extract the answer.\n\
     - \"clarification\": the visitor asks something back instead of answering.\n\
     - \"objection\": the visitor pushes back on the question or process.\n\
     - \"chitchat\": small talk, pleasantries, no answer content.\n\
     - \"escalation\": the visitor asks for a human agent.\n\
     - \"off_topic\": unrelated to the conversation.\n\
     - \"ambiguous_attempt\": tried to answer but the answer cannot be pinned down.\n\n\
     Respond with ONLY a JSON object:\n\
     {\"primary\": \"...\", \"confidence\": 0.0, \"partial_answer\": \"...\", \"tone\": \"...\"}\n\n\
     Rules:\n\
     - \"primary\" must be exactly one of the labels above\n\
     - For direct_answer: set \"partial_answer\" to the extracted answer; when the \
       message clearly matches a listed choice, use that choice's value\n\
     - Omit \"partial_answer\" for everything else\n\
     - \"tone\" is how the assistant should sound next: one of \"empathetic\", \
       \"friendly\", \"professional\", \"reassuring\"\n\
     - When torn between direct_answer and ambiguous_attempt, choose ambiguous_attempt"
        .to_string()
}

/// Build the classification user prompt for one turn.
fn build_classify_user_prompt(request: &ClassifyRequest<'_>) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str(&format!("Visitor intent: {}\n", request.intent));
    prompt.push_str(&format!("Active question: {}\n", request.question.text));

    if !request.question.choices.is_empty() {
        let values: Vec<&str> = request
            .question
            .choices
            .iter()
            .map(|c| c.value.as_str())
            .collect();
        prompt.push_str(&format!("Choice values: {}\n", values.join(", ")));
    }

    if !request.recent_context.is_empty() {
        prompt.push_str("\nRecent exchange:\n");
        for line in request.recent_context {
            let speaker = match line.speaker {
                Speaker::Visitor => "Visitor",
                Speaker::Assistant => "Assistant",
            };
            let preview: String = line.text.chars().take(200).collect();
            prompt.push_str(&format!("  {speaker}: {preview}\n"));
        }
    }

    // Truncated for token efficiency
    let message_preview: String = request.user_message.chars().take(1000).collect();
    prompt.push_str(&format!("\nVisitor message:\n{message_preview}"));

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Raw classification response structure.
#[derive(Debug, Deserialize)]
struct RawClassification {
    primary: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    partial_answer: String,
    #[serde(default)]
    tone: String,
}

/// Parse the model output into a `ClassificationResult`.
fn parse_classification(raw: &str) -> Result<ClassificationResult, String> {
    let json_str = extract_json_object(raw);
    let response: RawClassification =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    let primary = TurnLabel::parse(&response.primary)
        .ok_or_else(|| format!("unknown primary label: '{}'", response.primary))?;

    let partial_answer = if response.partial_answer.trim().is_empty() {
        None
    } else {
        Some(response.partial_answer.trim().to_string())
    };

    if primary == TurnLabel::DirectAnswer && partial_answer.is_none() {
        return Err("direct_answer requires a partial_answer field".into());
    }

    Ok(ClassificationResult {
        primary,
        confidence: response.confidence.clamp(0.0, 1.0),
        partial_answer,
        suggested_tone: Tone::parse(&response.tone),
    })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
