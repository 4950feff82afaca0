//! Shared fixtures for the dialog integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use flowbot::config::DialogConfig;
use flowbot::models::{ActionSpec, DialogEvent, DialogSession, Event, Flow, Prediction};
use flowbot::providers::{
    ActionFailure, ActionOutcome, ActionRegistry, ActionRunner, ActionScope, StaticFlowProvider,
};
use flowbot::services::dialog::{DialogEngine, ManualClock, ProcessingOutcome};
use flowbot::store::{InMemorySessionStore, SessionStore};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const BOT_ID: &str = "test-bot";

/// Generate a unique session id for test isolation
pub fn generate_session_id() -> String {
    format!("session_{}", nanoid::nanoid!(12))
}

pub fn text(message: &str) -> Event {
    Event::text(BOT_ID, message)
}

/// A text event whose NLU block carries a single confident prediction.
pub fn intent(name: &str) -> Event {
    Event::text(BOT_ID, name).with_predictions(vec![Prediction::new(name, 0.9)])
}

pub fn predictions(scores: &[(&str, f64)]) -> Event {
    Event::text(BOT_ID, "...").with_predictions(
        scores
            .iter()
            .map(|(name, confidence)| Prediction::new(*name, *confidence))
            .collect(),
    )
}

/// Records every action name it is asked to run.
///
/// `fail` always fails. `setVariable` is delegated to the builtin
/// implementation. Anything else succeeds without touching state.
pub struct RecordingRunner {
    builtins: ActionRegistry,
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            builtins: ActionRegistry::with_builtins(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl ActionRunner for RecordingRunner {
    async fn run(
        &self,
        action: &ActionSpec,
        event: &Event,
        scope: ActionScope<'_>,
    ) -> Result<ActionOutcome, ActionFailure> {
        self.calls.lock().unwrap().push(action.name().to_string());
        match action.name() {
            "fail" => Err(ActionFailure::new("boom")),
            name if self.builtins.contains(name) => self.builtins.run(action, event, scope).await,
            _ => Ok(ActionOutcome::none()),
        }
    }
}

/// An engine wired to in-memory collaborators and a manual clock.
pub struct TestDialog {
    pub engine: Arc<DialogEngine>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemorySessionStore>,
    pub actions: Arc<RecordingRunner>,
}

impl TestDialog {
    pub fn new(flows: Vec<Flow>) -> Self {
        Self::with_config(flows, DialogConfig::default())
    }

    pub fn with_config(flows: Vec<Flow>, config: DialogConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemorySessionStore::unmanaged());
        let actions = Arc::new(RecordingRunner::new());

        let engine = DialogEngine::new(
            config,
            Arc::new(StaticFlowProvider::new(flows)),
            actions.clone(),
            store.clone(),
        )
        .with_clock(clock.clone());

        Self {
            engine: Arc::new(engine),
            clock,
            store,
            actions,
        }
    }

    pub async fn send(&self, session_id: &str, event: Event) -> flowbot::Result<ProcessingOutcome> {
        self.engine.process_event(session_id, &event).await
    }

    pub async fn session(&self, session_id: &str) -> DialogSession {
        self.store
            .load(session_id)
            .await
            .unwrap()
            .expect("session should be stored")
    }

    /// `(flow, node)` of the stored context, if any.
    pub async fn position(&self, session_id: &str) -> Option<(String, String)> {
        self.session(session_id)
            .await
            .current_position()
            .map(|(flow, node)| (flow.to_string(), node.to_string()))
    }
}

pub fn at(flow: &str, node: &str) -> Option<(String, String)> {
    Some((flow.to_string(), node.to_string()))
}

/// Drains whatever lifecycle events are currently buffered.
pub fn drain_events(rx: &mut broadcast::Receiver<DialogEvent>) -> Vec<DialogEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
