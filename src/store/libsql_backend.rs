//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; `libsql::Connection` is `Send + Sync` and
//! safe for concurrent async use.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::enrich::{IntelItem, IntelKind, LeadProfileDocument};
use crate::error::DatabaseError;
use crate::flow::Intent;
use crate::session::{SessionRecord, SessionState};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    // RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid '{s}': {e}")))
}

fn parse_intent(s: &str) -> Result<Intent, DatabaseError> {
    Intent::parse(s).ok_or_else(|| DatabaseError::Serialization(format!("unknown intent '{s}'")))
}

fn parse_state(s: &str) -> Result<SessionState, DatabaseError> {
    SessionState::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown session state '{s}'")))
}

fn parse_kind(s: &str) -> Result<IntelKind, DatabaseError> {
    IntelKind::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown intel kind '{s}'")))
}

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run(self.conn()).await
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        let answers = serde_json::to_string(&record.answers)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO sessions
                 (id, intent, cursor, answers, turn_count, state, created_at, last_activity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id.to_string(),
                    record.intent.to_string(),
                    record.cursor as i64,
                    answers,
                    record.turn_count as i64,
                    record.state.to_string(),
                    record.created_at.to_rfc3339(),
                    record.last_activity.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<SessionRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, intent, cursor, answers, turn_count, state, created_at, last_activity
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };

        let answers_json: String = row.get(3).map_err(query_err)?;
        let answers: BTreeMap<String, String> = serde_json::from_str(&answers_json)
            .map_err(|e| DatabaseError::Serialization(format!("bad answers blob: {e}")))?;

        Ok(Some(SessionRecord {
            id: parse_uuid(&row.get::<String>(0).map_err(query_err)?)?,
            intent: parse_intent(&row.get::<String>(1).map_err(query_err)?)?,
            cursor: row.get::<i64>(2).map_err(query_err)? as usize,
            answers,
            turn_count: row.get::<i64>(4).map_err(query_err)? as u32,
            state: parse_state(&row.get::<String>(5).map_err(query_err)?)?,
            created_at: parse_datetime(&row.get::<String>(6).map_err(query_err)?),
            last_activity: parse_datetime(&row.get::<String>(7).map_err(query_err)?),
        }))
    }

    // ── Intel ───────────────────────────────────────────────────────

    async fn append_intel(&self, item: &IntelItem) -> Result<(), DatabaseError> {
        let tags = serde_json::to_string(&item.tags)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO intel_items
                 (session_id, turn, kind, content, tags, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.session_id.to_string(),
                    item.turn as i64,
                    item.kind.to_string(),
                    item.content.clone(),
                    tags,
                    item.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn list_intel(&self, session_id: Uuid) -> Result<Vec<IntelItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT session_id, turn, kind, content, tags, created_at
                 FROM intel_items WHERE session_id = ?1 ORDER BY turn ASC",
                params![session_id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let tags_json: String = row.get(4).map_err(query_err)?;
            let tags: BTreeSet<String> = serde_json::from_str(&tags_json)
                .map_err(|e| DatabaseError::Serialization(format!("bad tags blob: {e}")))?;
            items.push(IntelItem {
                session_id: parse_uuid(&row.get::<String>(0).map_err(query_err)?)?,
                turn: row.get::<i64>(1).map_err(query_err)? as u32,
                kind: parse_kind(&row.get::<String>(2).map_err(query_err)?)?,
                content: row.get(3).map_err(query_err)?,
                tags,
                created_at: parse_datetime(&row.get::<String>(5).map_err(query_err)?),
            });
        }
        Ok(items)
    }

    // ── Lead profiles ───────────────────────────────────────────────

    async fn put_lead_profile(
        &self,
        session_id: Uuid,
        document: &LeadProfileDocument,
    ) -> Result<(), DatabaseError> {
        let blob = serde_json::to_string(document)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO lead_profiles (session_id, document, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    session_id.to_string(),
                    blob,
                    document.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_lead_profile(
        &self,
        session_id: Uuid,
    ) -> Result<Option<LeadProfileDocument>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT document FROM lead_profiles WHERE session_id = ?1",
                params![session_id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let Some(row) = rows.next().await.map_err(query_err)? else {
            return Ok(None);
        };
        let blob: String = row.get(0).map_err(query_err)?;
        serde_json::from_str(&blob)
            .map(Some)
            .map_err(|e| DatabaseError::Serialization(format!("bad profile document: {e}")))
    }
}
