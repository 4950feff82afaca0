//! The turn driver.
//!
//! [`DialogEngine`] loads a session, applies expiry, elects an intent, builds the
//! instruction queue for the current node and drains it. Transitions rebuild
//! the queue for the destination within the same turn. A wait checkpoints the
//! session and returns. An exhausted queue ends the flow.
//!
//! The engine itself does not serialize turns. Route events through the
//! [`SessionRegistry`](super::registry::SessionRegistry) to guarantee at most one
//! turn in flight per session.

use super::clock::{Clock, SystemClock};
use super::constants::{
    ERROR_FLOW, EVENT_CHANNEL_CAPACITY, ON_ERROR_FLOW_VAR, TIMEOUT_EVENT_TYPE, TIMEOUT_FLOW, TIMEOUT_NODE,
};
use super::election::{elect, Election};
use super::expiry::create_expiry;
use super::instruction::factory::build_queue;
use super::instruction::{InstructionContext, InstructionProcessor, ProcessingResult};
use super::navigator::{Destination, FlowNavigator, Resolution};
use super::strategies::ActionStrategy;
use super::trace::TransitionTrace;
use crate::config::DialogConfig;
use crate::error::{Error, Result};
use crate::models::{ContextPhase, DialogContext, DialogEvent, DialogSession, Event, Flow};
use crate::providers::{ActionRunner, FlowProvider};
use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// What a successful turn left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// Suspended on the node the turn started on.
    Waiting { node: String },
    /// Moved through at least one transition, then suspended on `node`.
    Transitioned { node: String },
    /// The flow ended and the context was cleared.
    Ended,
}

impl ProcessingOutcome {
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Waiting { node } | Self::Transitioned { node } => Some(node),
            Self::Ended => None,
        }
    }
}

pub struct DialogEngine {
    config: DialogConfig,
    flows: Arc<dyn FlowProvider>,
    store: Arc<dyn SessionStore>,
    navigator: FlowNavigator,
    processor: InstructionProcessor,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<DialogEvent>,
}

impl DialogEngine {
    pub fn new(
        config: DialogConfig,
        flows: Arc<dyn FlowProvider>,
        actions: Arc<dyn ActionRunner>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let processor = InstructionProcessor::new(ActionStrategy::new(
            actions,
            config.action_timeout(),
            events.clone(),
        ));

        Self {
            navigator: FlowNavigator::new(Arc::clone(&flows)),
            config,
            flows,
            store,
            processor,
            clock: Arc::new(SystemClock),
            events,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Lifecycle notifications for every session handled by this engine.
    pub fn subscribe(&self) -> broadcast::Receiver<DialogEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &DialogConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs one turn for an inbound event.
    pub async fn process_event(&self, session_id: &str, event: &Event) -> Result<ProcessingOutcome> {
        let result = self.process_event_inner(session_id, event).await;
        self.report(session_id, result)
    }

    async fn process_event_inner(&self, session_id: &str, event: &Event) -> Result<ProcessingOutcome> {
        let now = self.clock.now();
        let mut session = self.prepare_session(session_id, &event.bot_id, now).await?;
        let election = elect(event.predictions(), self.config.min_intent_confidence);

        tracing::debug!(
            session_id = %session_id,
            event_type = %event.event_type,
            intent = ?election.intent_name(),
            ambiguous = election.ambiguous,
            "[DialogEngine] Processing event"
        );

        self.run_turn(&mut session, event, &election).await
    }

    /// Handles an expired context: jumps to the most specific timeout handler
    /// and runs a turn there, or clears the context when there is none.
    /// Returns `None` when the session no longer has a context or the context
    /// has not actually expired.
    pub async fn process_timeout(&self, session_id: &str) -> Result<Option<ProcessingOutcome>> {
        let result = self.process_timeout_inner(session_id).await;
        self.report(session_id, result)
    }

    async fn process_timeout_inner(&self, session_id: &str) -> Result<Option<ProcessingOutcome>> {
        let Some(mut session) = self.store.load(session_id).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if session.expiry.is_session_expired(now) {
            tracing::info!(session_id = %session_id, "[DialogEngine] Session expired while idle, discarding");
            self.store.delete(session_id).await?;
            self.notify(DialogEvent::SessionExpired {
                session_id: session_id.to_string(),
            });
            return Ok(None);
        }

        let Some((flow_name, node_name)) = session
            .current_position()
            .map(|(flow, node)| (flow.to_string(), node.to_string()))
        else {
            return Ok(None);
        };

        if !session.expiry.is_context_expired(now) {
            // refreshed by an event since the sweep listed it
            return Ok(None);
        }

        self.notify(DialogEvent::ContextExpired {
            session_id: session_id.to_string(),
            flow: flow_name.clone(),
            node: node_name.clone(),
        });
        tracing::info!(
            session_id = %session_id,
            flow = %flow_name,
            node = %node_name,
            "[DialogEngine] Processing timeout"
        );

        // A timeout is not user activity: only the context window restarts.
        session.expiry.context = create_expiry(&self.config.for_bot(&session.bot_id), &self.config, now)?.context;

        let Some((timeout_flow, timeout_node)) = self.find_timeout_target(&flow_name, &node_name).await? else {
            return self.end_flow(&mut session).await.map(Some);
        };

        context_mut(&mut session)?.move_to(timeout_flow, timeout_node, ContextPhase::Entering);

        let event = Event::new(session.bot_id.clone(), TIMEOUT_EVENT_TYPE, serde_json::Value::Null);
        let election = Election::default();
        self.run_turn(&mut session, &event, &election).await.map(Some)
    }

    /// Redirects a session so its next turn enters `node` (or the start node) of
    /// `flow`.
    pub async fn jump_to(&self, session_id: &str, flow: &str, node: Option<&str>) -> Result<()> {
        let Some(mut session) = self.store.load(session_id).await? else {
            return Err(Error::SessionUnavailable(format!("Session '{}' not found", session_id)));
        };

        let flow = self.flows.get_flow(flow).await?;
        let node = match node {
            Some(node) => flow.require_node(node)?,
            None => flow.start()?,
        };

        match session.context.as_mut() {
            Some(context) => context.move_to(flow.name.clone(), node.name.clone(), ContextPhase::Entering),
            None => session.context = Some(DialogContext::at(flow.name.clone(), node.name.clone())),
        }

        tracing::info!(
            session_id = %session_id,
            flow = %flow.name,
            node = %node.name,
            "[DialogEngine] Jumped"
        );
        self.store.save(&session).await
    }

    /// Loads or creates the session, discarding whatever has expired, and makes
    /// sure it has a context.
    async fn prepare_session(&self, session_id: &str, bot_id: &str, now: DateTime<Utc>) -> Result<DialogSession> {
        let expiry = create_expiry(&self.config.for_bot(bot_id), &self.config, now)?;

        let mut session = match self.store.load(session_id).await? {
            Some(existing) if existing.expiry.is_session_expired(now) => {
                tracing::info!(session_id = %session_id, "[DialogEngine] Session expired, starting over");
                self.notify(DialogEvent::SessionExpired {
                    session_id: session_id.to_string(),
                });
                self.start_session(session_id, bot_id, expiry, now)
            }
            Some(mut existing) => {
                if existing.expiry.is_context_expired(now)
                    && let Some(context) = existing.reset_context()
                {
                    tracing::info!(
                        session_id = %session_id,
                        flow = %context.current_flow,
                        node = %context.current_node,
                        "[DialogEngine] Context expired"
                    );
                    self.notify(DialogEvent::ContextExpired {
                        session_id: session_id.to_string(),
                        flow: context.current_flow,
                        node: context.current_node,
                    });
                }
                existing
            }
            None => self.start_session(session_id, bot_id, expiry, now),
        };

        session.expiry = expiry;
        session.last_event_at = now;

        if session.context.is_none() {
            let flow = self.flows.get_flow(&self.config.default_flow).await?;
            let start = flow.start()?;
            session.context = Some(DialogContext::at(flow.name.clone(), start.name.clone()));
        }

        Ok(session)
    }

    fn start_session(
        &self,
        session_id: &str,
        bot_id: &str,
        expiry: crate::models::Expiry,
        now: DateTime<Utc>,
    ) -> DialogSession {
        tracing::info!(session_id = %session_id, bot_id = %bot_id, "[DialogEngine] Session started");
        self.notify(DialogEvent::SessionStarted {
            session_id: session_id.to_string(),
        });
        DialogSession::new(session_id, bot_id, expiry, now)
    }

    async fn run_turn(
        &self,
        session: &mut DialogSession,
        event: &Event,
        election: &Election,
    ) -> Result<ProcessingOutcome> {
        let (flow_name, node_name, phase) = {
            let context = context_mut(session)?;
            (context.current_flow.clone(), context.current_node.clone(), context.phase)
        };

        let flow = self.flows.get_flow(&flow_name).await?;
        let mut queue = build_queue(flow.require_node(&node_name)?, &flow, phase);
        let mut trace = TransitionTrace::new(self.config.max_transition_hops, node_name);

        loop {
            let Some(instruction) = queue.dequeue() else {
                return self.end_flow(session).await;
            };

            let result = {
                let ctx = InstructionContext {
                    session: &*session,
                    event,
                    election,
                };
                self.processor.process(&instruction, &ctx).await?
            };

            match result {
                ProcessingResult::None => {}
                ProcessingResult::Update(update) => session.apply(update),
                ProcessingResult::Wait => {
                    let context = context_mut(session)?;
                    context.phase = ContextPhase::Waiting;
                    let node = context.current_node.clone();

                    self.store.save(session).await?;
                    self.notify(DialogEvent::Waiting {
                        session_id: session.id.clone(),
                        node: node.clone(),
                    });
                    tracing::debug!(session_id = %session.id, node = %node, "[DialogEngine] Waiting for next event");

                    return Ok(if trace.has_moved() {
                        ProcessingOutcome::Transitioned { node }
                    } else {
                        ProcessingOutcome::Waiting { node }
                    });
                }
                ProcessingResult::Transition(destination) => {
                    if let Err(err) = trace.record(destination.as_str()) {
                        return self.abort_loop(session, &trace, err).await;
                    }

                    let context = context_mut(session)?;
                    let (from_flow, from_node) = (context.current_flow.clone(), context.current_node.clone());

                    let resolution = match self.navigator.navigate(context, &destination).await {
                        Ok(resolution) => resolution,
                        Err(err) => match self.recover_transition(session, &mut trace, &destination, err).await {
                            Ok(resolution) => resolution,
                            Err(err @ Error::TransitionLoop { .. }) => {
                                return self.abort_loop(session, &trace, err).await;
                            }
                            Err(err) => return Err(err),
                        },
                    };

                    match resolution {
                        Resolution::End => return self.end_flow(session).await,
                        Resolution::Moved { flow, node } => {
                            let phase = context_mut(session)?.phase;
                            tracing::debug!(
                                session_id = %session.id,
                                "[DialogEngine] transit ({}) [{}] -> ({}) [{}]",
                                from_flow,
                                from_node,
                                flow.name,
                                node
                            );
                            self.notify(DialogEvent::Transitioned {
                                session_id: session.id.clone(),
                                from_flow,
                                from_node,
                                to_flow: flow.name.clone(),
                                to_node: node.clone(),
                            });

                            queue.clear();
                            queue = build_queue(flow.require_node(&node)?, &flow, phase);
                        }
                    }
                }
            }
        }
    }

    /// Reroutes a transition whose destination could not be resolved: first to
    /// the flow named by the `onErrorFlowTo` temp variable, then to
    /// `error.flow.json`. Each reroute counts as a hop. Returns the original
    /// error when no fallback resolves.
    async fn recover_transition(
        &self,
        session: &mut DialogSession,
        trace: &mut TransitionTrace,
        destination: &str,
        err: Error,
    ) -> Result<Resolution> {
        let context = context_mut(session)?;
        let requested = context
            .temp
            .get(ON_ERROR_FLOW_VAR)
            .and_then(|value| value.as_str())
            .filter(|flow| !flow.trim().is_empty())
            .map(str::to_string);

        let mut fallbacks: Vec<String> = requested.into_iter().collect();
        if !fallbacks.iter().any(|flow| flow == ERROR_FLOW) {
            fallbacks.push(ERROR_FLOW.to_string());
        }

        for fallback in fallbacks.iter().filter(|flow| flow.as_str() != destination) {
            tracing::warn!(
                session_id = %session.id,
                destination = %destination,
                fallback = %fallback,
                error = %err,
                "[DialogEngine] Transition failed, rerouting"
            );
            trace.record(fallback.as_str())?;

            let context = context_mut(session)?;
            match self.navigator.navigate(context, fallback).await {
                Ok(resolution) => return Ok(resolution),
                Err(fallback_err) => {
                    tracing::debug!(fallback = %fallback, error = %fallback_err, "[DialogEngine] Fallback unavailable");
                }
            }
        }

        Err(err)
    }

    async fn abort_loop<T>(&self, session: &mut DialogSession, trace: &TransitionTrace, err: Error) -> Result<T> {
        tracing::error!(
            session_id = %session.id,
            path = ?trace.path(),
            "[DialogEngine] Transition loop detected, clearing context"
        );
        session.reset_context();
        self.store.save(session).await?;
        Err(err)
    }

    async fn end_flow(&self, session: &mut DialogSession) -> Result<ProcessingOutcome> {
        if let Some(context) = session.reset_context() {
            tracing::debug!(session_id = %session.id, flow = %context.current_flow, "[DialogEngine] Flow ended");
            self.notify(DialogEvent::FlowEnded {
                session_id: session.id.clone(),
                flow: context.current_flow,
            });
        }
        self.store.save(session).await?;
        Ok(ProcessingOutcome::Ended)
    }

    /// Looks for a timeout handler: the node's `timeout` destination, a node
    /// named `timeout`, the flow's `timeout_node`, then the start of the
    /// timeout flow.
    async fn find_timeout_target(&self, flow_name: &str, node_name: &str) -> Result<Option<(String, String)>> {
        if let Some(flow) = self.flows.find_flow(flow_name).await? {
            let declared = flow.node(node_name).and_then(|node| node.timeout.clone());
            if let Some(destination) = declared
                && let Some(target) = self.resolve_timeout_destination(&flow, &destination).await?
            {
                return Ok(Some(target));
            }

            if flow.node(TIMEOUT_NODE).is_some() {
                return Ok(Some((flow.name.clone(), TIMEOUT_NODE.to_string())));
            }

            if let Some(node) = flow.timeout_node.as_deref()
                && flow.node(node).is_some()
            {
                return Ok(Some((flow.name.clone(), node.to_string())));
            }
        }

        if let Some(flow) = self.flows.find_flow(TIMEOUT_FLOW).await?
            && let Ok(start) = flow.start()
        {
            return Ok(Some((flow.name.clone(), start.name.clone())));
        }

        Ok(None)
    }

    async fn resolve_timeout_destination(&self, flow: &Flow, destination: &str) -> Result<Option<(String, String)>> {
        match Destination::parse(destination) {
            Destination::Node(node) => Ok(flow.node(&node).map(|n| (flow.name.clone(), n.name.clone()))),
            Destination::Flow { flow: other, node } => {
                let Some(other) = self.flows.find_flow(&other).await? else {
                    return Ok(None);
                };
                let target = match node {
                    Some(node) => other.node(&node),
                    None => other.node(&other.start_node),
                };
                Ok(target.map(|n| (other.name.clone(), n.name.clone())))
            }
            Destination::End | Destination::Return { .. } => Ok(None),
        }
    }

    fn report<T>(&self, session_id: &str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            tracing::error!(
                session_id = %session_id,
                code = err.code(),
                error = %err,
                "[DialogEngine] Turn failed"
            );
            self.notify(DialogEvent::ProcessingError {
                session_id: session_id.to_string(),
                code: err.code().to_string(),
                message: err.to_string(),
            });
        }
        result
    }

    fn notify(&self, event: DialogEvent) {
        let _ = self.events.send(event);
    }
}

fn context_mut(session: &mut DialogSession) -> Result<&mut DialogContext> {
    let id = session.id.clone();
    session
        .context
        .as_mut()
        .ok_or_else(|| Error::Configuration(format!("Session '{}' has no dialog context", id)))
}
