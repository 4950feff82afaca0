//! Flow graph definitions.
//!
//! A [`Flow`] is an immutable graph of named [`Node`]s loaded from external
//! storage. The engine shares flows read-only across all sessions.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Destination that ends the current flow.
pub const END_DESTINATION: &str = "END";

/// Suffix that marks a destination as a reference to another flow.
pub const FLOW_SUFFIX: &str = ".flow.json";

/// An action reference: an identifier optionally followed by whitespace and an
/// argument document, e.g. `setVariable {"name":"x","value":1}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionSpec(String);

impl ActionSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The action identifier (everything before the first whitespace).
    pub fn name(&self) -> &str {
        self.0.split_whitespace().next().unwrap_or_default()
    }

    /// The raw argument text, if any.
    pub fn raw_args(&self) -> Option<&str> {
        let trimmed = self.0.trim_start();
        trimmed
            .find(char::is_whitespace)
            .map(|idx| trimmed[idx..].trim())
            .filter(|args| !args.is_empty())
    }

    /// Arguments parsed as JSON; non-JSON text is returned as a JSON string.
    pub fn args(&self) -> Option<serde_json::Value> {
        self.raw_args().map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
        })
    }
}

impl From<&str> for ActionSpec {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// What a node does once it has been entered.
///
/// `NoWait` means the node never waits for input and falls straight through to
/// its transitions. `WaitWithActions` means the node suspends the turn and runs
/// the given actions (possibly none) when the next event arrives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    from = "Option<Vec<ActionSpec>>",
    into = "Option<Vec<ActionSpec>>"
)]
pub enum ReceiveBehavior {
    #[default]
    NoWait,
    WaitWithActions(Vec<ActionSpec>),
}

impl ReceiveBehavior {
    pub fn is_no_wait(&self) -> bool {
        matches!(self, Self::NoWait)
    }

    pub fn actions(&self) -> Option<&[ActionSpec]> {
        match self {
            Self::NoWait => None,
            Self::WaitWithActions(actions) => Some(actions),
        }
    }
}

impl From<Option<Vec<ActionSpec>>> for ReceiveBehavior {
    fn from(value: Option<Vec<ActionSpec>>) -> Self {
        match value {
            None => Self::NoWait,
            Some(actions) => Self::WaitWithActions(actions),
        }
    }
}

impl From<ReceiveBehavior> for Option<Vec<ActionSpec>> {
    fn from(value: ReceiveBehavior) -> Self {
        match value {
            ReceiveBehavior::NoWait => None,
            ReceiveBehavior::WaitWithActions(actions) => Some(actions),
        }
    }
}

/// A candidate transition: move to `node` when `condition` is truthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub condition: String,
    pub node: String,
}

impl TransitionSpec {
    pub fn new(condition: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            node: node.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub on_enter: Vec<ActionSpec>,
    #[serde(default, skip_serializing_if = "ReceiveBehavior::is_no_wait")]
    pub on_receive: ReceiveBehavior,
    #[serde(default)]
    pub next: Vec<TransitionSpec>,
    /// Destination used when the context times out while waiting on this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_enter: Vec::new(),
            on_receive: ReceiveBehavior::NoWait,
            next: Vec::new(),
            timeout: None,
        }
    }

    pub fn on_enter<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionSpec>,
    {
        self.on_enter = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Makes the node wait for input, running `actions` on the next event.
    pub fn on_receive<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionSpec>,
    {
        self.on_receive = ReceiveBehavior::WaitWithActions(actions.into_iter().map(Into::into).collect());
        self
    }

    pub fn next(mut self, condition: impl Into<String>, node: impl Into<String>) -> Self {
        self.next.push(TransitionSpec::new(condition, node));
        self
    }

    pub fn timeout(mut self, destination: impl Into<String>) -> Self {
        self.timeout = Some(destination.into());
        self
    }
}

/// Instructions applied regardless of the current node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchAll {
    #[serde(default)]
    pub on_receive: Vec<ActionSpec>,
    #[serde(default)]
    pub next: Vec<TransitionSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub name: String,
    pub start_node: String,
    #[serde(with = "node_list")]
    pub nodes: IndexMap<String, Node>,
    #[serde(default)]
    pub catch_all: CatchAll,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_node: Option<String>,
}

impl Flow {
    /// Builds a flow, rejecting duplicate node names.
    pub fn new(
        name: impl Into<String>,
        start_node: impl Into<String>,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<Self> {
        let name = name.into();
        let mut by_name = IndexMap::new();
        for node in nodes {
            if by_name.contains_key(&node.name) {
                return Err(Error::Configuration(format!(
                    "Duplicate node '{}' in flow '{}'",
                    node.name, name
                )));
            }
            by_name.insert(node.name.clone(), node);
        }

        Ok(Self {
            name,
            start_node: start_node.into(),
            nodes: by_name,
            catch_all: CatchAll::default(),
            timeout_node: None,
        })
    }

    pub fn with_catch_all(mut self, catch_all: CatchAll) -> Self {
        self.catch_all = catch_all;
        self
    }

    pub fn with_timeout_node(mut self, node: impl Into<String>) -> Self {
        self.timeout_node = Some(node.into());
        self
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Looks up a node, failing with a configuration error when it is missing.
    pub fn require_node(&self, name: &str) -> Result<&Node> {
        self.node(name).ok_or_else(|| {
            Error::Configuration(format!("Node '{}' not found in flow '{}'", name, self.name))
        })
    }

    pub fn start(&self) -> Result<&Node> {
        self.node(&self.start_node).ok_or_else(|| {
            Error::Configuration(format!(
                "Start node '{}' missing from flow '{}'",
                self.start_node, self.name
            ))
        })
    }
}

/// Returns true when a destination refers to another flow (`x.flow.json` or
/// `x.flow.json#node`).
pub fn is_flow_reference(destination: &str) -> bool {
    destination.contains(FLOW_SUFFIX)
}

/// Normalizes a flow name so `main` and `main.flow.json` refer to the same flow.
pub fn normalize_flow_name(name: &str) -> String {
    if name.ends_with(FLOW_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, FLOW_SUFFIX)
    }
}

mod node_list {
    use super::Node;
    use indexmap::IndexMap;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(nodes: &IndexMap<String, Node>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(nodes.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IndexMap<String, Node>, D::Error> {
        let list = Vec::<Node>::deserialize(deserializer)?;
        let mut nodes = IndexMap::with_capacity(list.len());
        for node in list {
            if nodes.contains_key(&node.name) {
                return Err(D::Error::custom(format!("duplicate node name '{}'", node.name)));
            }
            nodes.insert(node.name.clone(), node);
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_spec_parts() {
        let spec = ActionSpec::new(r#"setVariable {"name":"x","value":1}"#);
        assert_eq!(spec.name(), "setVariable");
        assert_eq!(spec.args().unwrap()["name"], "x");

        let bare = ActionSpec::new("sayHi");
        assert_eq!(bare.name(), "sayHi");
        assert!(bare.raw_args().is_none());

        let text = ActionSpec::new("say hello there");
        assert_eq!(text.args(), Some(serde_json::json!("hello there")));
    }

    #[test]
    fn test_receive_behavior_absent_vs_empty() {
        let json = serde_json::json!({
            "name": "flow.flow.json",
            "startNode": "a",
            "nodes": [
                { "name": "a" },
                { "name": "b", "onReceive": [] },
                { "name": "c", "onReceive": null }
            ]
        });
        let flow: Flow = serde_json::from_value(json).unwrap();

        assert_eq!(flow.node("a").unwrap().on_receive, ReceiveBehavior::NoWait);
        assert_eq!(
            flow.node("b").unwrap().on_receive,
            ReceiveBehavior::WaitWithActions(vec![])
        );
        assert_eq!(flow.node("c").unwrap().on_receive, ReceiveBehavior::NoWait);
    }

    #[test]
    fn test_receive_behavior_serializes_back() {
        let node = Node::new("b").on_receive(Vec::<ActionSpec>::new());
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["onReceive"], serde_json::json!([]));

        let value = serde_json::to_value(Node::new("a")).unwrap();
        assert!(value.get("onReceive").is_none());
    }

    #[test]
    fn test_duplicate_nodes_rejected() {
        let json = serde_json::json!({
            "name": "dup.flow.json",
            "startNode": "a",
            "nodes": [{ "name": "a" }, { "name": "a" }]
        });
        let err = serde_json::from_value::<Flow>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate node name 'a'"));

        let err = Flow::new("dup.flow.json", "a", [Node::new("a"), Node::new("a")]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_nodes_keep_declaration_order() {
        let flow = Flow::new(
            "main.flow.json",
            "z",
            [Node::new("z"), Node::new("a"), Node::new("m")],
        )
        .unwrap();
        let names: Vec<_> = flow.nodes.keys().cloned().collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_missing_start_node() {
        let flow = Flow::new("main.flow.json", "nope", [Node::new("a")]).unwrap();
        assert!(matches!(flow.start(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_flow_names() {
        assert!(is_flow_reference("other.flow.json#entry"));
        assert!(!is_flow_reference("entry"));
        assert_eq!(normalize_flow_name("main"), "main.flow.json");
        assert_eq!(normalize_flow_name("main.flow.json"), "main.flow.json");
    }
}
