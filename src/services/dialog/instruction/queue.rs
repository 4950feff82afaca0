use super::Instruction;
use std::collections::VecDeque;

/// Per-turn FIFO of pending instructions. Never persisted: a waiting context
/// stores its [`ContextPhase`](crate::models::ContextPhase) instead and the
/// queue is rebuilt on the next turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionQueue {
    instructions: VecDeque<Instruction>,
}

impl InstructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, instructions: impl IntoIterator<Item = Instruction>) {
        self.instructions.extend(instructions);
    }

    pub fn dequeue(&mut self) -> Option<Instruction> {
        self.instructions.pop_front()
    }

    pub fn peek(&self) -> Option<&Instruction> {
        self.instructions.front()
    }

    pub fn clear(&mut self) {
        self.instructions.clear();
    }

    /// Puts a wait checkpoint at the head of the queue.
    pub fn wait(&mut self) {
        self.instructions.push_front(Instruction::wait());
    }

    pub fn has_instructions(&self) -> bool {
        !self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl FromIterator<Instruction> for InstructionQueue {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self {
            instructions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dialog::instruction::InstructionKind;

    #[test]
    fn test_fifo_order() {
        let mut queue = InstructionQueue::new();
        queue.enqueue([Instruction::on_enter("a"), Instruction::on_enter("b")]);
        queue.enqueue([Instruction::transition("true", "c")]);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue().unwrap().function, "a");
        assert_eq!(queue.peek().unwrap().function, "b");
        assert_eq!(queue.dequeue().unwrap().function, "b");
        assert_eq!(queue.dequeue().unwrap().node.as_deref(), Some("c"));
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_wait_goes_to_head() {
        let mut queue: InstructionQueue = [Instruction::on_receive("x")].into_iter().collect();
        queue.wait();

        assert_eq!(queue.dequeue().unwrap().kind, InstructionKind::Wait);
        assert_eq!(queue.dequeue().unwrap().kind, InstructionKind::OnReceive);
    }

    #[test]
    fn test_clear() {
        let mut queue: InstructionQueue = [Instruction::on_enter("a")].into_iter().collect();
        assert!(queue.has_instructions());
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.peek().is_none());
    }
}
