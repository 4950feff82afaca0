use super::{Instruction, InstructionKind, ProcessingResult};
use crate::error::Result;
use crate::models::{DialogSession, Event};
use crate::services::dialog::election::Election;
use crate::services::dialog::strategies::{ActionStrategy, InstructionStrategy, TransitionStrategy};

/// Everything an instruction may read while it executes.
#[derive(Debug, Clone, Copy)]
pub struct InstructionContext<'a> {
    pub session: &'a DialogSession,
    pub event: &'a Event,
    pub election: &'a Election,
}

/// Routes each instruction to the strategy for its kind.
pub struct InstructionProcessor {
    action: ActionStrategy,
    transition: TransitionStrategy,
}

impl InstructionProcessor {
    pub fn new(action: ActionStrategy) -> Self {
        Self {
            action,
            transition: TransitionStrategy,
        }
    }

    pub async fn process(&self, instruction: &Instruction, ctx: &InstructionContext<'_>) -> Result<ProcessingResult> {
        match instruction.kind {
            InstructionKind::OnEnter | InstructionKind::OnReceive => self.action.execute(instruction, ctx).await,
            InstructionKind::Transition => self.transition.execute(instruction, ctx).await,
            InstructionKind::Wait => Ok(ProcessingResult::Wait),
        }
    }
}
