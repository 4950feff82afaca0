//! Name-indexed catalogue of action handlers.

use super::{ActionFailure, ActionOutcome, ActionRunner, ActionScope};
use crate::models::{ActionSpec, Event, Variables};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A single named action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(
        &self,
        args: Option<Value>,
        event: &Event,
        scope: ActionScope<'_>,
    ) -> Result<ActionOutcome, ActionFailure>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(Option<Value>, &Event, ActionScope<'_>) -> Result<ActionOutcome, ActionFailure> + Send + Sync,
{
    async fn handle(
        &self,
        args: Option<Value>,
        event: &Event,
        scope: ActionScope<'_>,
    ) -> Result<ActionOutcome, ActionFailure> {
        (self.0)(args, event, scope)
    }
}

/// Dispatches actions to registered handlers by name.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with `setVariable`.
    pub fn with_builtins() -> Self {
        Self::new().with_fn("setVariable", set_variable)
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.register(name, handler);
        self
    }

    /// Registers a synchronous closure as an action.
    pub fn with_fn<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<Value>, &Event, ActionScope<'_>) -> Result<ActionOutcome, ActionFailure>
            + Send
            + Sync
            + 'static,
    {
        self.with_handler(name, Arc::new(FnHandler(handler)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry").field("actions", &self.names()).finish()
    }
}

#[async_trait]
impl ActionRunner for ActionRegistry {
    async fn run(
        &self,
        action: &ActionSpec,
        event: &Event,
        scope: ActionScope<'_>,
    ) -> Result<ActionOutcome, ActionFailure> {
        let handler = self
            .handlers
            .get(action.name())
            .ok_or_else(|| ActionFailure::new(format!("Action '{}' not found", action.name())))?;
        handler.handle(action.args(), event, scope).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VariableScope {
    Session,
    Temp,
}

#[derive(Debug, Deserialize)]
struct SetVariableArgs {
    #[serde(rename = "type", default = "default_scope")]
    scope: VariableScope,
    name: String,
    #[serde(default)]
    value: Value,
}

fn default_scope() -> VariableScope {
    VariableScope::Temp
}

/// `setVariable {"type": "session"|"temp", "name": ..., "value": ...}`
fn set_variable(
    args: Option<Value>,
    _event: &Event,
    _scope: ActionScope<'_>,
) -> Result<ActionOutcome, ActionFailure> {
    let args = args.ok_or_else(|| ActionFailure::new("setVariable requires arguments"))?;
    let args: SetVariableArgs = serde_json::from_value(args)
        .map_err(|e| ActionFailure::new(format!("Invalid setVariable arguments: {}", e)))?;

    let mut vars = Variables::new();
    vars.insert(args.name, args.value);

    Ok(match args.scope {
        VariableScope::Session => ActionOutcome::session(vars),
        VariableScope::Temp => ActionOutcome::temp(vars),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope<'a>(vars: &'a Variables) -> ActionScope<'a> {
        ActionScope {
            session_id: "s1",
            session: vars,
            temp: vars,
        }
    }

    #[tokio::test]
    async fn test_set_variable_session() {
        let registry = ActionRegistry::with_builtins();
        let vars = Variables::new();
        let event = Event::text("bot", "hi");

        let outcome = registry
            .run(
                &ActionSpec::new(r#"setVariable {"type":"session","name":"lang","value":"fr"}"#),
                &event,
                scope(&vars),
            )
            .await
            .unwrap();

        assert_eq!(outcome.update.session.unwrap()["lang"], json!("fr"));
        assert!(outcome.update.temp.is_none());
    }

    #[tokio::test]
    async fn test_set_variable_defaults_to_temp() {
        let registry = ActionRegistry::with_builtins();
        let vars = Variables::new();
        let outcome = registry
            .run(
                &ActionSpec::new(r#"setVariable {"name":"step","value":2}"#),
                &Event::text("bot", "hi"),
                scope(&vars),
            )
            .await
            .unwrap();
        assert_eq!(outcome.update.temp.unwrap()["step"], json!(2));
    }

    #[tokio::test]
    async fn test_unknown_action_fails() {
        let registry = ActionRegistry::new();
        let vars = Variables::new();
        let err = registry
            .run(&ActionSpec::new("launchRocket"), &Event::text("bot", "hi"), scope(&vars))
            .await
            .unwrap_err();
        assert!(err.message.contains("launchRocket"));
    }

    #[tokio::test]
    async fn test_closure_handler_sees_event_and_scope() {
        let registry = ActionRegistry::new().with_fn("echo", |_args, event, scope| {
            let mut vars = Variables::new();
            vars.insert("echo".into(), event.payload["text"].clone());
            vars.insert("session".into(), json!(scope.session_id));
            Ok(ActionOutcome::temp(vars))
        });
        let vars = Variables::new();
        let outcome = registry
            .run(&ActionSpec::new("echo"), &Event::text("bot", "ping"), scope(&vars))
            .await
            .unwrap();

        let temp = outcome.update.temp.unwrap();
        assert_eq!(temp["echo"], "ping");
        assert_eq!(temp["session"], "s1");
    }
}
