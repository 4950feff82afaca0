//! Flow validation.
//!
//! Flows are authored outside the engine, so they are checked when loaded
//! rather than failing halfway through a conversation. Every problem found is
//! reported in a single [`Error::Configuration`].

use crate::error::{Error, Result};
use crate::models::flow::normalize_flow_name;
use crate::models::Flow;
use crate::providers::FlowProvider;
use crate::services::dialog::condition::Condition;
use crate::services::dialog::navigator::Destination;
use std::collections::HashSet;

/// Validates one flow on its own. References to other flows are accepted
/// without checking that they exist.
///
/// # Examples
/// ```
/// use flowbot::models::{Flow, Node};
/// use flowbot::validation::validate_flow;
///
/// let flow = Flow::new("main", "entry", [Node::new("entry").next("true", "END")]).unwrap();
/// assert!(validate_flow(&flow).is_ok());
///
/// let broken = Flow::new("main", "entry", [Node::new("entry").next("true", "nowhere")]).unwrap();
/// assert!(validate_flow(&broken).is_err());
/// ```
pub fn validate_flow(flow: &Flow) -> Result<()> {
    into_result(&flow.name, flow_issues(flow, None))
}

/// Validates every flow a provider knows, including cross-flow references.
/// Returns the number of flows checked.
pub async fn validate_flows(provider: &dyn FlowProvider) -> Result<usize> {
    let names = provider.flow_names().await?;
    let known: HashSet<String> = names.iter().cloned().collect();

    let mut problems = Vec::new();
    for name in &names {
        let flow = provider.get_flow(name).await?;
        problems.extend(
            flow_issues(&flow, Some(&known))
                .into_iter()
                .map(|issue| format!("{}: {}", flow.name, issue)),
        );
    }

    if problems.is_empty() {
        Ok(names.len())
    } else {
        Err(Error::Configuration(format!(
            "Invalid flows:\n  - {}",
            problems.join("\n  - ")
        )))
    }
}

/// Lists every problem in `flow`. When `known_flows` is given, flow references
/// must name one of them.
pub fn flow_issues(flow: &Flow, known_flows: Option<&HashSet<String>>) -> Vec<String> {
    let mut issues = Vec::new();

    if flow.name.trim().is_empty() {
        issues.push("flow name is empty".to_string());
    }
    if flow.node(&flow.start_node).is_none() {
        issues.push(format!("start node '{}' does not exist", flow.start_node));
    }
    if let Some(timeout_node) = &flow.timeout_node
        && flow.node(timeout_node).is_none()
    {
        issues.push(format!("timeout node '{}' does not exist", timeout_node));
    }

    for transition in &flow.catch_all.next {
        check_condition(&transition.condition, "catch-all", &mut issues);
        check_destination(flow, &transition.node, "catch-all", known_flows, &mut issues);
    }
    for action in &flow.catch_all.on_receive {
        if action.name().is_empty() {
            issues.push("catch-all has an empty action".to_string());
        }
    }

    for node in flow.nodes.values() {
        let owner = format!("node '{}'", node.name);

        let receive = node.on_receive.actions().unwrap_or_default();
        if node.on_enter.iter().chain(receive).any(|action| action.name().is_empty()) {
            issues.push(format!("{} has an empty action", owner));
        }

        for transition in &node.next {
            check_condition(&transition.condition, &owner, &mut issues);
            check_destination(flow, &transition.node, &owner, known_flows, &mut issues);
        }

        if let Some(timeout) = &node.timeout {
            check_destination(flow, timeout, &owner, known_flows, &mut issues);
        }
    }

    issues
}

fn check_condition(condition: &str, owner: &str, issues: &mut Vec<String>) {
    if let Err(err) = Condition::parse(condition) {
        issues.push(format!("{}: {}", owner, err));
    }
}

fn check_destination(
    flow: &Flow,
    destination: &str,
    owner: &str,
    known_flows: Option<&HashSet<String>>,
    issues: &mut Vec<String>,
) {
    if destination.trim().is_empty() {
        issues.push(format!("{} has a transition without destination", owner));
        return;
    }

    match Destination::parse(destination) {
        Destination::End | Destination::Return { .. } => {}
        Destination::Node(node) => {
            if flow.node(&node).is_none() {
                issues.push(format!("{} targets unknown node '{}'", owner, node));
            }
        }
        Destination::Flow { flow: target, .. } => {
            if let Some(known) = known_flows
                && !known.contains(&normalize_flow_name(&target))
            {
                issues.push(format!("{} targets unknown flow '{}'", owner, target));
            }
        }
    }
}

fn into_result(flow_name: &str, issues: Vec<String>) -> Result<()> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "Invalid flow '{}':\n  - {}",
            flow_name,
            issues.join("\n  - ")
        )))
    }
}
