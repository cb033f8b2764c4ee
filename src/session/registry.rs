//! In-memory session registry — single-writer discipline per session.
//!
//! Each session lives behind its own `tokio::sync::Mutex`; the turn engine
//! holds the lock for the whole turn, so two concurrent messages for the
//! same session can never both observe and mutate the same cursor/answers
//! snapshot. Different sessions run fully concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::model::Session;

/// Registry of live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Look up a live session.
    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Insert a session, returning its handle. If another task raced the
    /// same id in first, the existing handle wins and is returned instead.
    pub async fn insert(&self, session: Session) -> Arc<Mutex<Session>> {
        let id = session.id;
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evict sessions idle longer than `idle_timeout`. Sessions currently
    /// locked by a turn are skipped and revisited on the next sweep.
    /// Returns the number evicted.
    pub async fn prune_idle(&self, idle_timeout: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(idle_timeout).unwrap_or(chrono::Duration::seconds(1800));

        let mut idle = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, handle) in sessions.iter() {
                if let Ok(session) = handle.try_lock()
                    && session.last_activity < cutoff
                {
                    idle.push(*id);
                }
            }
        }

        if idle.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut evicted = 0;
        for id in idle {
            if sessions.remove(&id).is_some() {
                debug!(session_id = %id, "Evicted idle session from registry");
                evicted += 1;
            }
        }
        evicted
    }
}

/// Spawn the periodic idle-session sweep.
///
/// Evicted sessions stay in the store and are rehydrated on the next turn;
/// pruning only bounds registry memory.
pub fn spawn_prune_task(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick is immediate — skip it
        loop {
            ticker.tick().await;
            let evicted = registry.prune_idle(idle_timeout).await;
            if evicted > 0 {
                info!(evicted, "Idle session sweep complete");
            }
        }
    })
}
