//! Execution strategies for each instruction kind.

pub mod action;
pub mod transition;

pub use action::ActionStrategy;
pub use transition::TransitionStrategy;

use crate::error::Result;
use crate::services::dialog::instruction::{Instruction, InstructionContext, ProcessingResult};
use async_trait::async_trait;

/// Turns one instruction into a [`ProcessingResult`].
#[async_trait]
pub trait InstructionStrategy: Send + Sync {
    async fn execute(&self, instruction: &Instruction, ctx: &InstructionContext<'_>) -> Result<ProcessingResult>;
}
