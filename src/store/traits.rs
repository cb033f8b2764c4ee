//! Unified `Database` trait — single async interface for all persistence.
//!
//! Three stores, three write disciplines: sessions are upserted whole by
//! the single writer, intel items are append-only (idempotent per session
//! and turn), lead profiles are full-replace documents.

use async_trait::async_trait;
use uuid::Uuid;

use crate::enrich::{IntelItem, LeadProfileDocument};
use crate::error::DatabaseError;
use crate::session::SessionRecord;

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Insert or replace a session record.
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), DatabaseError>;

    /// Get a session record by id.
    async fn get_session(&self, id: Uuid) -> Result<Option<SessionRecord>, DatabaseError>;

    // ── Intel ───────────────────────────────────────────────────────

    /// Append one intel item. Re-writing the same (session, turn) replaces
    /// the previous row rather than duplicating it.
    async fn append_intel(&self, item: &IntelItem) -> Result<(), DatabaseError>;

    /// All intel for a session, oldest first.
    async fn list_intel(&self, session_id: Uuid) -> Result<Vec<IntelItem>, DatabaseError>;

    // ── Lead profiles ───────────────────────────────────────────────

    /// Replace the whole lead profile document for a session.
    async fn put_lead_profile(
        &self,
        session_id: Uuid,
        document: &LeadProfileDocument,
    ) -> Result<(), DatabaseError>;

    /// Get the current lead profile document for a session.
    async fn get_lead_profile(
        &self,
        session_id: Uuid,
    ) -> Result<Option<LeadProfileDocument>, DatabaseError>;
}
