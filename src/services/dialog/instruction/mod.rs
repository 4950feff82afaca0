//! Instructions: the unit of work the dialog engine executes.
//!
//! A node is materialized into a short list of instructions by the
//! [`factory`], buffered in an [`InstructionQueue`] for the duration of one
//! turn, and executed one at a time by the [`InstructionProcessor`].

pub mod factory;
pub mod processor;
pub mod queue;

pub use processor::{InstructionContext, InstructionProcessor};
pub use queue::InstructionQueue;

use crate::error::{Error, Result};
use crate::models::StateUpdate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// The four kinds of instruction the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum InstructionKind {
    OnEnter,
    OnReceive,
    Transition,
    Wait,
}

impl InstructionKind {
    /// Parses an instruction tag, rejecting anything outside the four kinds.
    pub fn parse(tag: &str) -> Result<Self> {
        Self::from_str(tag).map_err(|_| Error::UnknownInstruction(tag.to_string()))
    }
}

/// One unit of work: an action to run, a condition to test or a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInstruction", into = "RawInstruction")]
pub struct Instruction {
    pub kind: InstructionKind,
    /// Action spec for `on-enter`/`on-receive`, condition for `transition`.
    pub function: String,
    /// Destination of a `transition`.
    pub node: Option<String>,
}

impl Instruction {
    pub fn on_enter(action: impl Into<String>) -> Self {
        Self {
            kind: InstructionKind::OnEnter,
            function: action.into(),
            node: None,
        }
    }

    pub fn on_receive(action: impl Into<String>) -> Self {
        Self {
            kind: InstructionKind::OnReceive,
            function: action.into(),
            node: None,
        }
    }

    pub fn transition(condition: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            kind: InstructionKind::Transition,
            function: condition.into(),
            node: Some(node.into()),
        }
    }

    pub fn wait() -> Self {
        Self {
            kind: InstructionKind::Wait,
            function: String::new(),
            node: None,
        }
    }

    /// Decodes an instruction from its wire form, e.g.
    /// `{"type": "transition", "fn": "true", "node": "next"}`.
    pub fn decode(value: serde_json::Value) -> Result<Self> {
        let raw: RawInstruction = serde_json::from_value(value)?;
        Self::try_from(raw)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawInstruction {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "fn", default)]
    function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node: Option<String>,
}

impl TryFrom<RawInstruction> for Instruction {
    type Error = Error;

    fn try_from(raw: RawInstruction) -> Result<Self> {
        let kind = InstructionKind::parse(&raw.kind)?;
        if kind == InstructionKind::Transition && raw.node.is_none() {
            return Err(Error::Configuration(format!(
                "Transition '{}' has no destination node",
                raw.function
            )));
        }
        Ok(Self {
            kind,
            function: raw.function,
            node: raw.node,
        })
    }
}

impl From<Instruction> for RawInstruction {
    fn from(instruction: Instruction) -> Self {
        let kind: &'static str = instruction.kind.into();
        Self {
            kind: kind.to_string(),
            function: instruction.function,
            node: instruction.node,
        }
    }
}

/// What executing one instruction asks the engine to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingResult {
    /// Nothing to apply; continue with the next instruction.
    None,
    /// Merge the update into the session and continue.
    Update(StateUpdate),
    /// Move to the given destination.
    Transition(String),
    /// Suspend the turn until the next event.
    Wait,
}
