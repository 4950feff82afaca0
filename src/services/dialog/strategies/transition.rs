use super::InstructionStrategy;
use crate::error::{Error, Result};
use crate::services::dialog::condition::{Condition, ConditionContext};
use crate::services::dialog::instruction::{Instruction, InstructionContext, ProcessingResult};
use async_trait::async_trait;

/// Evaluates a `transition` instruction's condition and yields its destination
/// when the condition holds.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransitionStrategy;

#[async_trait]
impl InstructionStrategy for TransitionStrategy {
    async fn execute(&self, instruction: &Instruction, ctx: &InstructionContext<'_>) -> Result<ProcessingResult> {
        let destination = instruction.node.as_deref().ok_or_else(|| {
            Error::Configuration(format!("Transition '{}' has no destination node", instruction.function))
        })?;

        let condition = Condition::parse(&instruction.function)?;
        let values = ConditionContext::new(ctx.event, ctx.session, ctx.election);

        if condition.evaluate(&values) {
            tracing::debug!(
                session_id = %ctx.session.id,
                condition = %condition.source(),
                destination = %destination,
                "[DialogEngine] Condition matched"
            );
            Ok(ProcessingResult::Transition(destination.to_string()))
        } else {
            Ok(ProcessingResult::None)
        }
    }
}
