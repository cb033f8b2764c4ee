//! Enrichment worker — fire-and-forget task execution off the turn path.
//!
//! Tasks are submitted at the end of turn processing and never awaited
//! before the reply returns. The worker is the error boundary: a failed
//! task is logged and dropped, never retried automatically, never visible
//! to the visitor. Tasks for one session may complete out of order — the
//! profile rebuild takes the whole answer set, so reordering is safe, and
//! intel has no downstream readers inside the engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::enrich::intel::IntelItem;
use crate::enrich::profile::{
    self, LeadProfileDocument, build_normalize_system_prompt, build_normalize_user_prompt,
};
use crate::flow::Intent;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::Database;

/// Max tokens for a profile normalization call.
const NORMALIZE_MAX_TOKENS: u32 = 512;

/// Temperature for normalization (extraction, not prose).
const NORMALIZE_TEMPERATURE: f32 = 0.0;

/// One unit of background work.
#[derive(Debug)]
pub enum EnrichmentTask {
    /// Persist one captured conversation signal.
    CaptureIntel(IntelItem),
    /// Rebuild the lead profile from the complete answer map.
    NormalizeProfile {
        session_id: Uuid,
        intent: Intent,
        answers: BTreeMap<String, String>,
    },
}

impl EnrichmentTask {
    fn label(&self) -> &'static str {
        match self {
            Self::CaptureIntel(_) => "capture_intel",
            Self::NormalizeProfile { .. } => "normalize_profile",
        }
    }
}

/// Handle for submitting enrichment tasks. Cloneable; submission never
/// blocks the turn.
#[derive(Clone)]
pub struct EnrichmentQueue {
    tx: mpsc::UnboundedSender<EnrichmentTask>,
}

impl EnrichmentQueue {
    /// Spawn the worker loop and return the submission handle.
    pub fn spawn(
        llm: Arc<dyn LlmProvider>,
        store: Arc<dyn Database>,
        config: &EngineConfig,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<EnrichmentTask>();
        let timeout = config.enrich_timeout;

        let handle = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let label = task.label();
                if let Err(reason) = run_task(task, &llm, &store, timeout).await {
                    // Contained by design: log for operators, nothing more.
                    warn!(task = label, reason, "Enrichment task failed");
                } else {
                    debug!(task = label, "Enrichment task complete");
                }
            }
            debug!("Enrichment worker shutting down");
        });

        (Self { tx }, handle)
    }

    /// Submit a task. Dropped (with a log line) if the worker is gone.
    pub fn submit(&self, task: EnrichmentTask) {
        if self.tx.send(task).is_err() {
            warn!("Enrichment worker unavailable, dropping task");
        }
    }
}

/// Execute one task. All failures come back as strings for the worker's
/// single log-and-drop site.
async fn run_task(
    task: EnrichmentTask,
    llm: &Arc<dyn LlmProvider>,
    store: &Arc<dyn Database>,
    timeout: Duration,
) -> Result<(), String> {
    match task {
        EnrichmentTask::CaptureIntel(item) => store
            .append_intel(&item)
            .await
            .map_err(|e| format!("intel write failed: {e}")),
        EnrichmentTask::NormalizeProfile {
            session_id,
            intent,
            answers,
        } => normalize_profile(session_id, intent, &answers, llm, store, timeout).await,
    }
}

/// Rebuild the lead profile from the complete answer map and replace the
/// stored document.
async fn normalize_profile(
    session_id: Uuid,
    intent: Intent,
    answers: &BTreeMap<String, String>,
    llm: &Arc<dyn LlmProvider>,
    store: &Arc<dyn Database>,
    timeout: Duration,
) -> Result<(), String> {
    if answers.is_empty() {
        return Ok(());
    }

    let request = CompletionRequest::new(vec![
        ChatMessage::system(build_normalize_system_prompt()),
        ChatMessage::user(build_normalize_user_prompt(intent, answers)),
    ])
    .with_temperature(NORMALIZE_TEMPERATURE)
    .with_max_tokens(NORMALIZE_MAX_TOKENS);

    let response = match tokio::time::timeout(timeout, llm.complete(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(format!("normalization call failed: {e}")),
        Err(_) => return Err(format!("normalization call timed out after {timeout:?}")),
    };

    let extracted = profile::parse_profile(&response.content)
        .map_err(|e| format!("normalization output malformed: {e}"))?;

    let document = LeadProfileDocument {
        intent,
        profile: extracted,
        answer_count: answers.len(),
        updated_at: chrono::Utc::now(),
    };

    store
        .put_lead_profile(session_id, &document)
        .await
        .map_err(|e| format!("profile write failed: {e}"))?;

    debug!(
        session_id = %session_id,
        answer_count = document.answer_count,
        "Lead profile rebuilt"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::intel::IntelKind;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, FinishReason};
    use crate::store::LibSqlBackend;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock LLM: scripted responses, optionally failing forever.
    struct ScriptedLlm {
        responses: Vec<Option<String>>,
        calls: AtomicU32,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Option<&str>>) -> Arc<Self> {
            Arc::new(Self {
                responses: responses
                    .into_iter()
                    .map(|r| r.map(String::from))
                    .collect(),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "mock-enrich"
        }

        fn cost_per_token(&self) -> (rust_decimal::Decimal, rust_decimal::Decimal) {
            (rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO)
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.responses.get(n.min(self.responses.len() - 1)) {
                Some(Some(text)) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 80,
                    output_tokens: 40,
                    finish_reason: FinishReason::Stop,
                }),
                _ => Err(LlmError::RequestFailed {
                    provider: "mock-enrich".into(),
                    reason: "down".into(),
                }),
            }
        }
    }

    async fn memory_store() -> Arc<dyn Database> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    fn answers() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("budget".to_string(), "400k_700k".to_string());
        map.insert("timeline".to_string(), "3_6_months".to_string());
        map
    }

    #[tokio::test]
    async fn capture_intel_persists() {
        let store = memory_store().await;
        let llm: Arc<dyn LlmProvider> = ScriptedLlm::new(vec![]);
        let session_id = Uuid::new_v4();

        let item = IntelItem::new(
            session_id,
            2,
            IntelKind::Question,
            "do I really need pre-approval first?",
            BTreeSet::from(["buy".to_string(), "financing".to_string()]),
        );
        run_task(
            EnrichmentTask::CaptureIntel(item),
            &llm,
            &store,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let items = store.list_intel(session_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, IntelKind::Question);
        assert!(items[0].tags.contains("financing"));
    }

    #[tokio::test]
    async fn capture_intel_is_idempotent_per_turn() {
        let store = memory_store().await;
        let llm: Arc<dyn LlmProvider> = ScriptedLlm::new(vec![]);
        let session_id = Uuid::new_v4();

        for content in ["first write", "replayed write"] {
            let item = IntelItem::new(
                session_id,
                3,
                IntelKind::PainPoint,
                content,
                BTreeSet::new(),
            );
            run_task(
                EnrichmentTask::CaptureIntel(item),
                &llm,
                &store,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        }

        // Same (session, turn) — one row, last write wins.
        let items = store.list_intel(session_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "replayed write");
    }

    #[tokio::test]
    async fn normalize_profile_full_replace() {
        let store = memory_store().await;
        let llm: Arc<dyn LlmProvider> = ScriptedLlm::new(vec![Some(
            r#"{"budget": "$400k–$700k", "timeframe": "3–6 months"}"#,
        )]);
        let session_id = Uuid::new_v4();

        run_task(
            EnrichmentTask::NormalizeProfile {
                session_id,
                intent: Intent::Buy,
                answers: answers(),
            },
            &llm,
            &store,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let doc = store.get_lead_profile(session_id).await.unwrap().unwrap();
        assert_eq!(doc.intent, Intent::Buy);
        assert_eq!(doc.answer_count, 2);
        assert_eq!(doc.profile.budget.as_deref(), Some("$400k–$700k"));
        assert!(doc.profile.area.is_none());
    }

    #[tokio::test]
    async fn normalize_failure_is_contained() {
        let store = memory_store().await;
        let llm: Arc<dyn LlmProvider> = ScriptedLlm::new(vec![None]);
        let session_id = Uuid::new_v4();

        let result = run_task(
            EnrichmentTask::NormalizeProfile {
                session_id,
                intent: Intent::Buy,
                answers: answers(),
            },
            &llm,
            &store,
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());
        // Nothing written, nothing panicked.
        assert!(store.get_lead_profile(session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn worker_survives_failing_tasks() {
        let store = memory_store().await;
        // First call fails, second succeeds.
        let llm: Arc<dyn LlmProvider> = ScriptedLlm::new(vec![
            None,
            Some(r#"{"budget": "cash"}"#),
        ]);
        let (queue, handle) = EnrichmentQueue::spawn(llm, store.clone(), &EngineConfig::default());
        let session_id = Uuid::new_v4();

        queue.submit(EnrichmentTask::NormalizeProfile {
            session_id,
            intent: Intent::Buy,
            answers: answers(),
        });
        queue.submit(EnrichmentTask::NormalizeProfile {
            session_id,
            intent: Intent::Buy,
            answers: answers(),
        });

        // Close the channel so the worker drains and exits.
        drop(queue);
        handle.await.unwrap();

        let doc = store.get_lead_profile(session_id).await.unwrap().unwrap();
        assert_eq!(doc.profile.budget.as_deref(), Some("cash"));
    }

    #[tokio::test]
    async fn empty_answer_map_is_a_no_op() {
        let store = memory_store().await;
        let llm = ScriptedLlm::new(vec![Some("{}")]);
        let counting = llm.clone();
        let llm: Arc<dyn LlmProvider> = llm;
        let session_id = Uuid::new_v4();

        run_task(
            EnrichmentTask::NormalizeProfile {
                session_id,
                intent: Intent::Browse,
                answers: BTreeMap::new(),
            },
            &llm,
            &store,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
        assert!(store.get_lead_profile(session_id).await.unwrap().is_none());
    }
}
