use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Free-form variables scoped to a session or a context.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Where a context resumes on its next turn. Persisted in place of the
/// instruction queue, which never outlives a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContextPhase {
    /// The node has not run yet: on-enter, wait/on-receive, transitions.
    Entering,
    /// The node suspended on a wait: on-receive, then transitions.
    Waiting,
    /// Returning from a subflow: only the node's transitions.
    TransitionsOnly,
}

/// A position to return to when a subflow exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpPoint {
    pub flow: String,
    pub node: String,
}

/// The short-lived part of a session: current position plus temp variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogContext {
    pub current_flow: String,
    pub current_node: String,
    pub phase: ContextPhase,
    #[serde(default)]
    pub previous_flow: Option<String>,
    #[serde(default)]
    pub previous_node: Option<String>,
    #[serde(default)]
    pub jump_points: Vec<JumpPoint>,
    #[serde(default)]
    pub temp: Variables,
}

impl DialogContext {
    /// A fresh context positioned on a node that has not been entered yet.
    pub fn at(flow: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            current_flow: flow.into(),
            current_node: node.into(),
            phase: ContextPhase::Entering,
            previous_flow: None,
            previous_node: None,
            jump_points: Vec::new(),
            temp: Variables::new(),
        }
    }

    /// Moves to a new position, remembering the current one.
    pub fn move_to(&mut self, flow: impl Into<String>, node: impl Into<String>, phase: ContextPhase) {
        let flow = flow.into();
        let node = node.into();
        self.previous_flow = Some(std::mem::replace(&mut self.current_flow, flow));
        self.previous_node = Some(std::mem::replace(&mut self.current_node, node));
        self.phase = phase;
    }
}

/// Absolute expiry timestamps for a session and its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expiry {
    pub context: DateTime<Utc>,
    pub session: DateTime<Utc>,
}

impl Expiry {
    pub fn is_context_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.context
    }

    pub fn is_session_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.session
    }
}

/// Variables to merge into the session after an action ran.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default)]
    pub session: Option<Variables>,
    #[serde(default)]
    pub temp: Option<Variables>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        self.session.as_ref().is_none_or(|vars| vars.is_empty())
            && self.temp.as_ref().is_none_or(|vars| vars.is_empty())
    }
}

/// The stateful record of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogSession {
    pub id: String,
    pub bot_id: String,
    #[serde(default)]
    pub session_vars: Variables,
    #[serde(default)]
    pub context: Option<DialogContext>,
    pub expiry: Expiry,
    pub created_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
}

impl DialogSession {
    pub fn new(id: impl Into<String>, bot_id: impl Into<String>, expiry: Expiry, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            bot_id: bot_id.into(),
            session_vars: Variables::new(),
            context: None,
            expiry,
            created_at: now,
            last_event_at: now,
        }
    }

    /// Discards the context while keeping the session identity and session vars.
    pub fn reset_context(&mut self) -> Option<DialogContext> {
        self.context.take()
    }

    /// Merges an action's state update. Later keys overwrite earlier ones.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(vars) = update.session {
            self.session_vars.extend(vars);
        }
        if let (Some(vars), Some(context)) = (update.temp, self.context.as_mut()) {
            context.temp.extend(vars);
        }
    }

    pub fn current_position(&self) -> Option<(&str, &str)> {
        self.context
            .as_ref()
            .map(|ctx| (ctx.current_flow.as_str(), ctx.current_node.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn session() -> DialogSession {
        let now = Utc::now();
        let expiry = Expiry {
            context: now + Duration::minutes(2),
            session: now + Duration::minutes(30),
        };
        DialogSession::new("s1", "bot", expiry, now)
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let now = Utc::now();
        let expiry = Expiry { context: now, session: now + Duration::seconds(1) };
        assert!(expiry.is_context_expired(now));
        assert!(!expiry.is_session_expired(now));
    }

    #[test]
    fn test_apply_merges_session_and_temp() {
        let mut session = session();
        session.context = Some(DialogContext::at("main.flow.json", "entry"));

        let mut vars = Variables::new();
        vars.insert("name".into(), json!("Ada"));
        let mut temp = Variables::new();
        temp.insert("attempts".into(), json!(1));

        session.apply(StateUpdate { session: Some(vars), temp: Some(temp) });

        assert_eq!(session.session_vars["name"], "Ada");
        assert_eq!(session.context.as_ref().unwrap().temp["attempts"], 1);
    }

    #[test]
    fn test_reset_context_keeps_session_vars() {
        let mut session = session();
        session.session_vars.insert("name".into(), json!("Ada"));
        session.context = Some(DialogContext::at("main.flow.json", "entry"));

        assert!(session.reset_context().is_some());
        assert!(session.context.is_none());
        assert_eq!(session.session_vars["name"], "Ada");
    }

    #[test]
    fn test_move_to_tracks_previous() {
        let mut ctx = DialogContext::at("main.flow.json", "entry");
        ctx.move_to("main.flow.json", "next", ContextPhase::Entering);
        assert_eq!(ctx.previous_node.as_deref(), Some("entry"));
        assert_eq!(ctx.current_node, "next");
    }

    #[test]
    fn test_phase_strings() {
        assert_eq!(ContextPhase::TransitionsOnly.to_string(), "transitions_only");
        assert_eq!("waiting".parse::<ContextPhase>().unwrap(), ContextPhase::Waiting);
    }
}
