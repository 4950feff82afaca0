//! Materializes a node into instructions.

use super::{Instruction, InstructionQueue};
use crate::models::flow::normalize_flow_name;
use crate::models::{ContextPhase, Flow, Node, ReceiveBehavior};
use crate::services::dialog::navigator::Destination;

pub fn create_on_enter(node: &Node) -> Vec<Instruction> {
    node.on_enter
        .iter()
        .map(|action| Instruction::on_enter(action.as_str()))
        .collect()
}

/// Flow catch-all actions first, then the node's own. `None` when the node
/// never waits for input.
pub fn create_on_receive(node: &Node, flow: &Flow) -> Option<Vec<Instruction>> {
    let ReceiveBehavior::WaitWithActions(actions) = &node.on_receive else {
        return None;
    };

    Some(
        flow.catch_all
            .on_receive
            .iter()
            .chain(actions)
            .map(|action| Instruction::on_receive(action.as_str()))
            .collect(),
    )
}

/// Flow catch-all transitions first, then the node's own. Catch-all
/// transitions pointing back at `node` are dropped.
pub fn create_transition(flow: &Flow, node: &Node) -> Vec<Instruction> {
    let catch_all = flow
        .catch_all
        .next
        .iter()
        .filter(|transition| !points_at(&transition.node, flow, node));

    catch_all
        .chain(&node.next)
        .map(|transition| Instruction::transition(&transition.condition, &transition.node))
        .collect()
}

/// Whether `destination`, read from inside `flow`, leads straight back to `node`.
fn points_at(destination: &str, flow: &Flow, node: &Node) -> bool {
    match Destination::parse(destination) {
        Destination::Node(target) => target == node.name,
        Destination::Flow { flow: target, node: target_node } => {
            normalize_flow_name(&target) == normalize_flow_name(&flow.name)
                && target_node.as_deref().unwrap_or(&flow.start_node) == node.name
        }
        Destination::End | Destination::Return { .. } => false,
    }
}

/// Builds the queue for a node given where the context resumes.
pub fn build_queue(node: &Node, flow: &Flow, phase: ContextPhase) -> InstructionQueue {
    let mut queue = InstructionQueue::new();

    match phase {
        ContextPhase::Entering => {
            queue.enqueue(create_on_enter(node));
            if let Some(on_receive) = create_on_receive(node, flow) {
                queue.enqueue([Instruction::wait()]);
                queue.enqueue(on_receive);
            }
        }
        ContextPhase::Waiting => {
            if let Some(on_receive) = create_on_receive(node, flow) {
                queue.enqueue(on_receive);
            }
        }
        ContextPhase::TransitionsOnly => {}
    }

    queue.enqueue(create_transition(flow, node));
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionSpec, CatchAll, TransitionSpec};
    use crate::services::dialog::instruction::InstructionKind;

    fn flow_with_catch_all(nodes: Vec<Node>) -> Flow {
        Flow::new("main.flow.json", "entry", nodes)
            .unwrap()
            .with_catch_all(CatchAll {
                on_receive: vec![ActionSpec::new("logInput")],
                next: vec![
                    TransitionSpec::new("intent == 'help'", "help"),
                    TransitionSpec::new("intent == 'bye'", "entry"),
                ],
            })
    }

    fn kinds(queue: &mut InstructionQueue) -> Vec<InstructionKind> {
        std::iter::from_fn(|| queue.dequeue()).map(|i| i.kind).collect()
    }

    #[test]
    fn test_on_enter_keeps_order() {
        let node = Node::new("entry").on_enter(["a", "b", "c"]);
        let functions: Vec<_> = create_on_enter(&node).into_iter().map(|i| i.function).collect();
        assert_eq!(functions, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_on_receive_absent_vs_empty() {
        let flow = flow_with_catch_all(vec![Node::new("entry")]);

        assert!(create_on_receive(&Node::new("entry"), &flow).is_none());

        let waiting = Node::new("entry").on_receive(Vec::<ActionSpec>::new());
        let instructions = create_on_receive(&waiting, &flow).unwrap();
        assert_eq!(instructions, vec![Instruction::on_receive("logInput")]);
    }

    #[test]
    fn test_on_receive_catch_all_first() {
        let node = Node::new("entry").on_receive(["storeAnswer"]);
        let flow = flow_with_catch_all(vec![node.clone()]);

        let functions: Vec<_> = create_on_receive(&node, &flow)
            .unwrap()
            .into_iter()
            .map(|i| i.function)
            .collect();
        assert_eq!(functions, vec!["logInput", "storeAnswer"]);
    }

    #[test]
    fn test_transitions_filter_catch_all_self_loop() {
        let node = Node::new("entry").next("true", "entry");
        let flow = flow_with_catch_all(vec![node.clone(), Node::new("help")]);

        let targets: Vec<_> = create_transition(&flow, &node)
            .into_iter()
            .filter_map(|i| i.node)
            .collect();
        // the catch-all self loop is dropped, the node's own is kept
        assert_eq!(targets, vec!["help", "entry"]);
    }

    #[test]
    fn test_transitions_filter_qualified_self_loop() {
        let node = Node::new("entry").on_receive(["store"]);
        let flow = Flow::new("main.flow.json", "entry", [node.clone(), Node::new("help")])
            .unwrap()
            .with_catch_all(CatchAll {
                on_receive: Vec::new(),
                next: vec![
                    TransitionSpec::new("intent == 'restart'", "main.flow.json#entry"),
                    TransitionSpec::new("intent == 'reset'", "main.flow.json"),
                    TransitionSpec::new("intent == 'help'", "help"),
                    TransitionSpec::new("intent == 'other'", "other.flow.json#entry"),
                ],
            });

        let targets: Vec<_> = create_transition(&flow, &node)
            .into_iter()
            .filter_map(|i| i.node)
            .collect();
        assert_eq!(targets, vec!["help", "other.flow.json#entry"]);

        let help = flow.node("help").unwrap();
        let targets: Vec<_> = create_transition(&flow, help)
            .into_iter()
            .filter_map(|i| i.node)
            .collect();
        assert_eq!(targets, vec!["main.flow.json#entry", "main.flow.json", "other.flow.json#entry"]);
    }

    #[test]
    fn test_build_queue_entering() {
        let node = Node::new("entry").on_enter(["greet"]).on_receive(["store"]).next("true", "done");
        let flow = Flow::new("main.flow.json", "entry", [node.clone(), Node::new("done")]).unwrap();

        let mut queue = build_queue(&node, &flow, ContextPhase::Entering);
        assert_eq!(
            kinds(&mut queue),
            vec![
                InstructionKind::OnEnter,
                InstructionKind::Wait,
                InstructionKind::OnReceive,
                InstructionKind::Transition,
            ]
        );
    }

    #[test]
    fn test_build_queue_waiting_and_transitions_only() {
        let node = Node::new("entry").on_enter(["greet"]).on_receive(["store"]).next("true", "done");
        let flow = Flow::new("main.flow.json", "entry", [node.clone(), Node::new("done")]).unwrap();

        let mut queue = build_queue(&node, &flow, ContextPhase::Waiting);
        assert_eq!(
            kinds(&mut queue),
            vec![InstructionKind::OnReceive, InstructionKind::Transition]
        );

        let mut queue = build_queue(&node, &flow, ContextPhase::TransitionsOnly);
        assert_eq!(kinds(&mut queue), vec![InstructionKind::Transition]);
    }

    #[test]
    fn test_build_queue_empty_node() {
        let node = Node::new("entry");
        let flow = Flow::new("main.flow.json", "entry", [node.clone()]).unwrap();
        assert!(build_queue(&node, &flow, ContextPhase::Entering).is_empty());
    }
}
