//! Session persistence.
//!
//! The engine talks to storage through [`SessionStore`]. The crate ships an
//! in-memory implementation with background eviction of expired sessions;
//! durable drivers live outside this crate.

use crate::error::{Error, Result};
use crate::models::DialogSession;
use crate::services::dialog::clock::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Storage for dialog sessions, keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<DialogSession>>;

    /// Inserts or replaces the session.
    async fn save(&self, session: &DialogSession) -> Result<()>;

    /// Returns true when a session was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Ids of sessions that still hold a context whose expiry has passed.
    async fn expired_contexts(&self, now: DateTime<Utc>) -> Result<Vec<String>>;
}

/// In-memory store options.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Background eviction interval in seconds. `None` disables eviction.
    pub cleanup_interval_seconds: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: Some(60),
        }
    }
}

/// Sessions held in a concurrent map. Sessions past their session expiry are
/// evicted by a background task.
pub struct InMemorySessionStore {
    sessions: Arc<scc::HashMap<String, DialogSession>>,
    cleanup_task: Option<JoinHandle<()>>,
}

impl InMemorySessionStore {
    /// Must be called from within a tokio runtime when eviction is enabled.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        let sessions = Arc::new(scc::HashMap::new());
        let cleanup_task = config
            .cleanup_interval_seconds
            .map(|secs| Self::spawn_cleanup_task(Arc::clone(&sessions), Duration::from_secs(secs), clock));

        Self { sessions, cleanup_task }
    }

    /// A store without background eviction.
    pub fn unmanaged() -> Self {
        Self {
            sessions: Arc::new(scc::HashMap::new()),
            cleanup_task: None,
        }
    }

    fn spawn_cleanup_task(
        sessions: Arc<scc::HashMap<String, DialogSession>>,
        every: Duration,
        clock: Arc<dyn Clock>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let evicted = Self::evict_expired(&sessions, clock.now()).await;
                if evicted > 0 {
                    tracing::debug!(evicted, "[SessionStore] Evicted expired sessions");
                }
            }
        })
    }

    async fn evict_expired(sessions: &scc::HashMap<String, DialogSession>, now: DateTime<Utc>) -> usize {
        let before = sessions.len();
        sessions
            .retain_async(|_, session| !session.expiry.is_session_expired(now))
            .await;
        before.saturating_sub(sessions.len())
    }

    /// Runs one eviction pass immediately. Returns the number of sessions removed.
    pub async fn evict(&self, now: DateTime<Utc>) -> usize {
        Self::evict_expired(&self.sessions, now).await
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::unmanaged()
    }
}

impl Drop for InMemorySessionStore {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<DialogSession>> {
        Ok(self.sessions.read_async(id, |_, session| session.clone()).await)
    }

    async fn save(&self, session: &DialogSession) -> Result<()> {
        if session.id.trim().is_empty() {
            return Err(Error::Store("Cannot save a session without an id".to_string()));
        }
        self.sessions.upsert_async(session.id.clone(), session.clone()).await;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.sessions.remove_async(id).await.is_some())
    }

    async fn expired_contexts(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let mut expired = Vec::new();
        self.sessions
            .retain_async(|id, session| {
                if session.context.is_some() && session.expiry.is_context_expired(now) {
                    expired.push(id.clone());
                }
                true
            })
            .await;
        expired.sort();
        Ok(expired)
    }
}
