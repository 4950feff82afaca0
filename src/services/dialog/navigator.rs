//! Destination resolution.
//!
//! A transition destination is one of:
//!
//! | Destination            | Meaning                                                    |
//! |------------------------|------------------------------------------------------------|
//! | `node`                 | node in the current flow                                   |
//! | `other.flow.json`      | start node of another flow, remembering where we came from |
//! | `other.flow.json#node` | specific node of another flow, remembering as above        |
//! | `#` / `#node`          | back to the parent node (or `node`), transitions only      |
//! | `##` / `##node`        | back to the parent node (or `node`), executed in full      |
//! | `END`                  | end of the current flow                                    |

use crate::error::Result;
use crate::models::flow::{is_flow_reference, END_DESTINATION};
use crate::models::{ContextPhase, DialogContext, Flow, JumpPoint};
use crate::providers::FlowProvider;
use std::sync::Arc;

/// A parsed destination string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    End,
    Node(String),
    Flow { flow: String, node: Option<String> },
    Return { node: Option<String>, execute: bool },
}

impl Destination {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == END_DESTINATION {
            return Self::End;
        }

        if let Some(rest) = raw.strip_prefix("##") {
            return Self::Return {
                node: non_empty(rest),
                execute: true,
            };
        }
        if let Some(rest) = raw.strip_prefix('#') {
            return Self::Return {
                node: non_empty(rest),
                execute: false,
            };
        }

        if is_flow_reference(raw) {
            return match raw.split_once('#') {
                Some((flow, node)) => Self::Flow {
                    flow: flow.to_string(),
                    node: non_empty(node),
                },
                None => Self::Flow {
                    flow: raw.to_string(),
                    node: None,
                },
            };
        }

        Self::Node(raw.to_string())
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Where the context ended up after a transition.
#[derive(Debug, Clone)]
pub enum Resolution {
    Moved { flow: Arc<Flow>, node: String },
    End,
}

/// Applies destinations to a [`DialogContext`], loading flows as needed.
#[derive(Clone)]
pub struct FlowNavigator {
    flows: Arc<dyn FlowProvider>,
}

impl FlowNavigator {
    pub fn new(flows: Arc<dyn FlowProvider>) -> Self {
        Self { flows }
    }

    /// Moves `context` to `destination`. Fails with a configuration error when
    /// the target flow or node does not exist; the context is untouched then.
    pub async fn navigate(&self, context: &mut DialogContext, destination: &str) -> Result<Resolution> {
        match Destination::parse(destination) {
            Destination::End => Ok(Resolution::End),

            Destination::Node(node) => {
                let flow = self.flows.get_flow(&context.current_flow).await?;
                flow.require_node(&node)?;
                context.move_to(flow.name.clone(), node.clone(), ContextPhase::Entering);
                Ok(Resolution::Moved { flow, node })
            }

            Destination::Flow { flow, node } => {
                let flow = self.flows.get_flow(&flow).await?;
                let node = match node {
                    Some(node) => flow.require_node(&node)?.name.clone(),
                    None => flow.start()?.name.clone(),
                };

                context.jump_points.push(JumpPoint {
                    flow: context.current_flow.clone(),
                    node: context.current_node.clone(),
                });
                context.move_to(flow.name.clone(), node.clone(), ContextPhase::Entering);
                Ok(Resolution::Moved { flow, node })
            }

            Destination::Return { node, execute } => {
                let Some(parent) = context.jump_points.last().cloned() else {
                    tracing::debug!(
                        flow = %context.current_flow,
                        node = %context.current_node,
                        "[DialogEngine] No parent flow to return to"
                    );
                    return Ok(Resolution::End);
                };

                let flow = self.flows.get_flow(&parent.flow).await?;
                let node = node.unwrap_or(parent.node);
                flow.require_node(&node)?;

                let phase = if execute {
                    ContextPhase::Entering
                } else {
                    ContextPhase::TransitionsOnly
                };
                context.jump_points.pop();
                context.move_to(flow.name.clone(), node.clone(), phase);
                Ok(Resolution::Moved { flow, node })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::Node;
    use crate::providers::StaticFlowProvider;

    fn navigator() -> FlowNavigator {
        let main = Flow::new("main.flow.json", "entry", [Node::new("entry"), Node::new("menu")]).unwrap();
        let sub = Flow::new("survey.flow.json", "ask", [Node::new("ask"), Node::new("thanks")]).unwrap();
        FlowNavigator::new(Arc::new(StaticFlowProvider::new([main, sub])))
    }

    #[test]
    fn test_parse_destinations() {
        assert_eq!(Destination::parse("END"), Destination::End);
        assert_eq!(Destination::parse("menu"), Destination::Node("menu".into()));
        assert_eq!(
            Destination::parse("survey.flow.json"),
            Destination::Flow { flow: "survey.flow.json".into(), node: None }
        );
        assert_eq!(
            Destination::parse("survey.flow.json#thanks"),
            Destination::Flow { flow: "survey.flow.json".into(), node: Some("thanks".into()) }
        );
        assert_eq!(Destination::parse("#"), Destination::Return { node: None, execute: false });
        assert_eq!(
            Destination::parse("##menu"),
            Destination::Return { node: Some("menu".into()), execute: true }
        );
    }

    #[tokio::test]
    async fn test_node_in_same_flow() {
        let mut ctx = DialogContext::at("main.flow.json", "entry");
        let resolution = navigator().navigate(&mut ctx, "menu").await.unwrap();

        assert!(matches!(resolution, Resolution::Moved { ref node, .. } if node == "menu"));
        assert_eq!(ctx.current_node, "menu");
        assert_eq!(ctx.previous_node.as_deref(), Some("entry"));
        assert_eq!(ctx.phase, ContextPhase::Entering);
    }

    #[tokio::test]
    async fn test_subflow_and_return() {
        let nav = navigator();
        let mut ctx = DialogContext::at("main.flow.json", "menu");

        nav.navigate(&mut ctx, "survey.flow.json").await.unwrap();
        assert_eq!(ctx.current_flow, "survey.flow.json");
        assert_eq!(ctx.current_node, "ask");
        assert_eq!(ctx.jump_points.len(), 1);

        nav.navigate(&mut ctx, "#").await.unwrap();
        assert_eq!(ctx.current_flow, "main.flow.json");
        assert_eq!(ctx.current_node, "menu");
        assert_eq!(ctx.phase, ContextPhase::TransitionsOnly);
        assert!(ctx.jump_points.is_empty());
    }

    #[tokio::test]
    async fn test_execute_parent_node() {
        let nav = navigator();
        let mut ctx = DialogContext::at("main.flow.json", "menu");
        nav.navigate(&mut ctx, "survey.flow.json#thanks").await.unwrap();
        assert_eq!(ctx.current_node, "thanks");

        nav.navigate(&mut ctx, "##entry").await.unwrap();
        assert_eq!(ctx.current_node, "entry");
        assert_eq!(ctx.phase, ContextPhase::Entering);
    }

    #[tokio::test]
    async fn test_return_without_parent_ends() {
        let mut ctx = DialogContext::at("main.flow.json", "entry");
        let resolution = navigator().navigate(&mut ctx, "#").await.unwrap();
        assert!(matches!(resolution, Resolution::End));
        assert_eq!(ctx.current_node, "entry");
    }

    #[tokio::test]
    async fn test_unknown_targets_are_configuration_errors() {
        let nav = navigator();
        let mut ctx = DialogContext::at("main.flow.json", "entry");

        assert!(matches!(nav.navigate(&mut ctx, "nowhere").await, Err(Error::Configuration(_))));
        assert!(matches!(nav.navigate(&mut ctx, "ghost.flow.json").await, Err(Error::Configuration(_))));
        assert_eq!(ctx.current_node, "entry");
        assert!(ctx.jump_points.is_empty());
    }
}
