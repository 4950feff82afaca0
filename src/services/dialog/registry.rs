use super::actor::{SessionActor, SessionActorArgs, SessionCommand, SessionHandle};
use super::constants::MAX_DISPATCH_ATTEMPTS;
use super::engine::{DialogEngine, ProcessingOutcome};
use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::models::Event;
use futures::future::join_all;
use scc::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Routes work to per-session actors, spawning them on demand.
///
/// All commands for one session id go through the same actor, so at most one
/// turn per session is in flight while different sessions run in parallel.
pub struct SessionRegistry {
    engine: Arc<DialogEngine>,
    runtime: RuntimeConfig,
    active_sessions: scc::HashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<DialogEngine>, runtime: RuntimeConfig) -> Self {
        Self {
            engine,
            runtime,
            active_sessions: scc::HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Arc<DialogEngine> {
        &self.engine
    }

    pub async fn get_handle(&self, session_id: &str) -> Option<SessionHandle> {
        self.active_sessions
            .read_async(session_id, |_, h| h.clone())
            .await
    }

    /// Runs a turn for `event` on the session's actor.
    pub async fn dispatch(&self, session_id: &str, event: Event) -> Result<ProcessingOutcome> {
        self.request(session_id, |responder| SessionCommand::ProcessEvent {
            event: Box::new(event.clone()),
            responder,
        })
        .await
    }

    pub async fn dispatch_timeout(&self, session_id: &str) -> Result<Option<ProcessingOutcome>> {
        self.request(session_id, |responder| SessionCommand::ProcessTimeout { responder })
            .await
    }

    pub async fn jump_to(&self, session_id: &str, flow: &str, node: Option<&str>) -> Result<()> {
        self.request(session_id, |responder| SessionCommand::JumpTo {
            flow: flow.to_string(),
            node: node.map(str::to_string),
            responder,
        })
        .await
    }

    /// Sends a command built by `build` and waits for its result. When the
    /// actor went away before handling it, the command is rebuilt and sent to
    /// a fresh actor.
    async fn request<T>(
        &self,
        session_id: &str,
        build: impl Fn(oneshot::Sender<Result<T>>) -> SessionCommand,
    ) -> Result<T> {
        for attempt in 1..=MAX_DISPATCH_ATTEMPTS {
            let handle = self.get_or_spawn(session_id).await;
            let (responder, response) = oneshot::channel();

            if handle.command_tx.send(build(responder)).await.is_ok()
                && let Ok(result) = response.await
            {
                return result;
            }

            tracing::debug!(
                session_id = %session_id,
                attempt,
                "[SessionRegistry] Session actor unavailable, retrying"
            );
            self.remove_if_closed(session_id).await;
        }

        Err(Error::SessionUnavailable(format!(
            "Session '{}' could not be reached after {} attempts",
            session_id, MAX_DISPATCH_ATTEMPTS
        )))
    }

    /// Returns the live actor for `session_id`, spawning one only when no
    /// actor is registered or the registered one has fully exited.
    async fn get_or_spawn(&self, session_id: &str) -> SessionHandle {
        match self.active_sessions.entry_async(session_id.to_string()).await {
            Entry::Occupied(mut entry) => {
                if entry.get().is_alive() {
                    return entry.get().clone();
                }
                let handle = self.spawn_actor(session_id);
                entry.insert(handle.clone());
                handle
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn_actor(session_id);
                entry.insert_entry(handle.clone());
                handle
            }
        }
    }

    fn spawn_actor(&self, session_id: &str) -> SessionHandle {
        SessionActor::spawn(SessionActorArgs {
            session_id: session_id.to_string(),
            engine: Arc::clone(&self.engine),
            command_buffer: self.runtime.command_buffer,
            inactivity_timeout: self.runtime.actor_inactivity_timeout(),
        })
    }

    async fn remove_if_closed(&self, session_id: &str) {
        let _ = self
            .active_sessions
            .remove_if_async(session_id, |h| h.command_tx.is_closed())
            .await;
    }

    /// Stops the session's actor and forgets it once it has exited.
    ///
    /// The handle stays registered while the actor finishes its current turn,
    /// so a concurrent dispatch never starts a second actor for the same id.
    pub async fn remove(&self, session_id: &str) {
        let Some(handle) = self.get_handle(session_id).await else {
            return;
        };
        let _ = handle.command_tx.send(SessionCommand::Shutdown).await;
        handle.command_tx.closed().await;
        self.remove_if_closed(session_id).await;
    }

    /// Drops handles of actors that have exited. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let before = self.active_sessions.len();
        self.active_sessions
            .retain_async(|_, h| !h.command_tx.is_closed())
            .await;
        before.saturating_sub(self.active_sessions.len())
    }

    /// Asks every actor to stop, waits for them to exit and forgets them.
    pub async fn shutdown_all(&self) {
        let mut handles = Vec::new();
        self.active_sessions
            .retain_async(|_, h| {
                handles.push(h.clone());
                true
            })
            .await;

        join_all(handles.iter().map(|handle| async move {
            let _ = handle.command_tx.send(SessionCommand::Shutdown).await;
            handle.command_tx.closed().await;
        }))
        .await;

        let stopped = self.prune().await;
        tracing::info!("[SessionRegistry] Shut down {} session actors", stopped);
    }

    pub fn len(&self) -> usize {
        self.active_sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active_sessions.is_empty()
    }
}
