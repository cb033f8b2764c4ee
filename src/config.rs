//! Configuration types.

use std::time::Duration;

/// Turn-engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Timeout for one classification call.
    pub classify_timeout: Duration,
    /// Timeout for one reply/rephrase generation call.
    pub generate_timeout: Duration,
    /// Timeout for one background enrichment LLM call.
    pub enrich_timeout: Duration,
    /// Attempts for a classification call (retries cover malformed output
    /// and transient transport errors).
    pub classify_max_attempts: u32,
    /// Minimum raw message length before an intel item is captured.
    pub intel_min_chars: usize,
    /// Sessions idle longer than this are evicted from the registry.
    pub session_idle_timeout: Duration,
    /// How often the idle-session sweep runs.
    pub prune_interval: Duration,
    /// How many recent transcript lines are kept for classifier context.
    pub transcript_tail: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classify_timeout: Duration::from_secs(10),
            generate_timeout: Duration::from_secs(10),
            enrich_timeout: Duration::from_secs(20),
            classify_max_attempts: 2,
            intel_min_chars: 15,
            session_idle_timeout: Duration::from_secs(1800), // 30 minutes
            prune_interval: Duration::from_secs(60),
            transcript_tail: 6,
        }
    }
}
