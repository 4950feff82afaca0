use super::engine::{DialogEngine, ProcessingOutcome};
use crate::error::Result;
use crate::models::Event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Work a session actor can be asked to do. Each command carries a responder
/// for its result.
#[derive(Debug)]
pub enum SessionCommand {
    ProcessEvent {
        event: Box<Event>,
        responder: oneshot::Sender<Result<ProcessingOutcome>>,
    },
    ProcessTimeout {
        responder: oneshot::Sender<Result<Option<ProcessingOutcome>>>,
    },
    JumpTo {
        flow: String,
        node: Option<String>,
        responder: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub command_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

pub struct SessionActorArgs {
    pub session_id: String,
    pub engine: Arc<DialogEngine>,
    pub command_buffer: usize,
    pub inactivity_timeout: Duration,
}

/// Owns one session id and runs its turns strictly one after another.
pub struct SessionActor {
    session_id: String,
    engine: Arc<DialogEngine>,
    command_rx: mpsc::Receiver<SessionCommand>,
    inactivity_timeout: Duration,
}

impl SessionActor {
    pub fn spawn(args: SessionActorArgs) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(args.command_buffer.max(1));

        let actor = Self {
            session_id: args.session_id,
            engine: args.engine,
            command_rx,
            inactivity_timeout: args.inactivity_timeout,
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        SessionHandle { command_tx }
    }

    async fn run(mut self) {
        tracing::debug!("[SessionActor] Started for session {}", self.session_id);

        let inactivity_timeout_duration = self.inactivity_timeout;
        let inactivity_timeout = tokio::time::sleep(inactivity_timeout_duration);
        tokio::pin!(inactivity_timeout);

        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => {
                    let Some(cmd) = command else {
                        break;
                    };

                    match cmd {
                        SessionCommand::ProcessEvent { event, responder } => {
                            let result = self.engine.process_event(&self.session_id, &event).await;
                            let _ = responder.send(result);
                        }
                        SessionCommand::ProcessTimeout { responder } => {
                            let result = self.engine.process_timeout(&self.session_id).await;
                            let _ = responder.send(result);
                        }
                        SessionCommand::JumpTo { flow, node, responder } => {
                            let result = self.engine.jump_to(&self.session_id, &flow, node.as_deref()).await;
                            let _ = responder.send(result);
                        }
                        SessionCommand::Shutdown => {
                            tracing::debug!("[SessionActor] Shutting down for session {}", self.session_id);
                            break;
                        }
                    }

                    // The idle period starts once the turn is done
                    inactivity_timeout.as_mut().reset(tokio::time::Instant::now() + inactivity_timeout_duration);
                }
                _ = &mut inactivity_timeout => {
                    tracing::debug!("[SessionActor] Shutting down due to inactivity for session {}", self.session_id);
                    break;
                }
            }
        }

        // Commands still buffered are dropped unprocessed; their callers see the
        // responder close and retry against a fresh actor.
        self.command_rx.close();
    }
}
