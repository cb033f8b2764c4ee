//! Lead profile — the normalized projection of a session's answers.
//!
//! Rebuilt whole from the complete answer map after every accepted answer,
//! never patched incrementally. Rebuilding from the full set makes
//! out-of-order background completion harmless: the last rebuild to land
//! reflects some complete prefix of answers, and the next accepted answer
//! triggers another full rebuild.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::Intent;

/// Structured lead profile. Every field is optional: the extractor only
/// fills in what the model is fully confident about — unknowns are
/// omitted, never guessed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financing: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_haves: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivation: Option<String>,
}

impl LeadProfile {
    /// Whether the extraction yielded anything at all.
    pub fn is_empty(&self) -> bool {
        self.budget.is_none()
            && self.timeframe.is_none()
            && self.area.is_none()
            && self.property_type.is_none()
            && self.financing.is_none()
            && self.must_haves.is_empty()
            && self.motivation.is_none()
    }
}

/// Stored profile document with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadProfileDocument {
    pub intent: Intent,
    pub profile: LeadProfile,
    /// How many answers fed this rebuild.
    pub answer_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Build the normalization system prompt.
pub(crate) fn build_normalize_system_prompt() -> String {
    "You normalize real-estate lead answers into a structured profile.\n\n\
     Respond with ONLY a JSON object using these fields (all optional):\n\
     {\"budget\": \"...\", \"timeframe\": \"...\", \"area\": \"...\", \
     \"property_type\": \"...\", \"financing\": \"...\", \
     \"must_haves\": [\"...\"], \"motivation\": \"...\"}\n\n\
     Rules:\n\
     - Include a field ONLY when the answers state it explicitly and \
       unambiguously — omit anything you are not fully sure of\n\
     - Never guess, never infer beyond what is written\n\
     - Normalize values to short plain phrases (e.g. \"$400k–$700k\", \
       \"3–6 months\")\n\
     - Output the JSON object and nothing else"
        .to_string()
}

/// Build the normalization user prompt from the complete answer map.
pub(crate) fn build_normalize_user_prompt(
    intent: Intent,
    answers: &BTreeMap<String, String>,
) -> String {
    let mut prompt = String::with_capacity(256);
    prompt.push_str(&format!("Visitor intent: {intent}\n"));
    prompt.push_str("Collected answers:\n");
    for (key, value) in answers {
        prompt.push_str(&format!("  {key}: {value}\n"));
    }
    prompt
}

/// Parse the model output into a `LeadProfile`. Unknown fields are
/// ignored; a malformed object is an error the worker logs and drops.
pub(crate) fn parse_profile(raw: &str) -> Result<LeadProfile, String> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }
    trimmed.to_string()
}
