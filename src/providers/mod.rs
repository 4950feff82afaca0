//! External collaborators of the dialog engine.
//!
//! The engine never reads flow files or executes side effects itself. Flows
//! come from a [`FlowProvider`] and actions run through an [`ActionRunner`],
//! so embedders can plug in their own storage and action catalogue.

pub mod actions;
pub mod flows;

pub use actions::{ActionHandler, ActionRegistry};
pub use flows::{FileFlowProvider, StaticFlowProvider};

use crate::error::{Error, Result};
use crate::models::{ActionSpec, Event, Flow, StateUpdate, Variables};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Source of flow definitions.
#[async_trait]
pub trait FlowProvider: Send + Sync {
    /// Returns the flow, or `None` when no flow has that name.
    async fn find_flow(&self, name: &str) -> Result<Option<Arc<Flow>>>;

    /// Names of every known flow.
    async fn flow_names(&self) -> Result<Vec<String>>;

    /// Returns the flow, failing with a configuration error when it is missing.
    async fn get_flow(&self, name: &str) -> Result<Arc<Flow>> {
        self.find_flow(name)
            .await?
            .ok_or_else(|| Error::Configuration(format!("Flow '{}' not found", name)))
    }
}

/// Variables an action can read.
#[derive(Debug, Clone, Copy)]
pub struct ActionScope<'a> {
    pub session_id: &'a str,
    pub session: &'a Variables,
    pub temp: &'a Variables,
}

/// Result of a successful action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub update: StateUpdate,
}

impl ActionOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn session(vars: Variables) -> Self {
        Self {
            update: StateUpdate {
                session: Some(vars),
                temp: None,
            },
        }
    }

    pub fn temp(vars: Variables) -> Self {
        Self {
            update: StateUpdate {
                session: None,
                temp: Some(vars),
            },
        }
    }
}

/// An action that could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionFailure {
    pub message: String,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes the side effect named by an [`ActionSpec`].
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(
        &self,
        action: &ActionSpec,
        event: &Event,
        scope: ActionScope<'_>,
    ) -> std::result::Result<ActionOutcome, ActionFailure>;
}
