use super::InstructionStrategy;
use crate::error::{Error, Result};
use crate::models::{ActionSpec, DialogEvent, Variables};
use crate::providers::{ActionRunner, ActionScope};
use crate::services::dialog::instruction::{Instruction, InstructionContext, ProcessingResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Runs `on-enter` and `on-receive` instructions through the [`ActionRunner`],
/// bounded by a timeout.
pub struct ActionStrategy {
    runner: Arc<dyn ActionRunner>,
    timeout: Duration,
    events: broadcast::Sender<DialogEvent>,
}

impl ActionStrategy {
    pub fn new(runner: Arc<dyn ActionRunner>, timeout: Duration, events: broadcast::Sender<DialogEvent>) -> Self {
        Self { runner, timeout, events }
    }

    fn notify(&self, event: DialogEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl InstructionStrategy for ActionStrategy {
    async fn execute(&self, instruction: &Instruction, ctx: &InstructionContext<'_>) -> Result<ProcessingResult> {
        let action = ActionSpec::new(instruction.function.as_str());
        let session_id = ctx.session.id.as_str();
        let no_temp = Variables::new();
        let scope = ActionScope {
            session_id,
            session: &ctx.session.session_vars,
            temp: ctx.session.context.as_ref().map_or(&no_temp, |c| &c.temp),
        };

        self.notify(DialogEvent::ActionStarted {
            session_id: session_id.to_string(),
            action: action.name().to_string(),
        });
        tracing::debug!(session_id = %session_id, action = %action.name(), "[DialogEngine] Running action");

        let result = tokio::time::timeout(self.timeout, self.runner.run(&action, ctx.event, scope)).await;
        let outcome = match result {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(failure)) => Err(failure.message),
            Err(_) => Err(format!("timed out after {}ms", self.timeout.as_millis())),
        };

        self.notify(DialogEvent::ActionEnded {
            session_id: session_id.to_string(),
            action: action.name().to_string(),
            success: outcome.is_ok(),
        });

        match outcome {
            Ok(outcome) if outcome.update.is_empty() => Ok(ProcessingResult::None),
            Ok(outcome) => Ok(ProcessingResult::Update(outcome.update)),
            Err(message) => {
                tracing::warn!(
                    session_id = %session_id,
                    action = %action.name(),
                    error = %message,
                    "[DialogEngine] Action failed"
                );
                Err(Error::ActionExecution {
                    action: action.name().to_string(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DialogContext, DialogSession, Event, Expiry};
    use crate::providers::{ActionFailure, ActionOutcome, ActionRegistry};
    use crate::services::dialog::election::Election;
    use chrono::Utc;
    use serde_json::json;

    struct SlowRunner;

    #[async_trait]
    impl ActionRunner for SlowRunner {
        async fn run(
            &self,
            _action: &ActionSpec,
            _event: &Event,
            _scope: ActionScope<'_>,
        ) -> std::result::Result<ActionOutcome, ActionFailure> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ActionOutcome::none())
        }
    }

    fn session() -> DialogSession {
        let now = Utc::now();
        let mut session = DialogSession::new("s1", "bot", Expiry { context: now, session: now }, now);
        session.context = Some(DialogContext::at("main.flow.json", "entry"));
        session
    }

    fn strategy(runner: Arc<dyn ActionRunner>, timeout: Duration) -> (ActionStrategy, broadcast::Receiver<DialogEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (ActionStrategy::new(runner, timeout, tx), rx)
    }

    #[tokio::test]
    async fn test_update_is_returned() {
        let (strategy, mut rx) = strategy(Arc::new(ActionRegistry::with_builtins()), Duration::from_secs(1));
        let session = session();
        let event = Event::text("bot", "hi");
        let election = Election::default();
        let ctx = InstructionContext { session: &session, event: &event, election: &election };

        let result = strategy
            .execute(&Instruction::on_enter(r#"setVariable {"name":"x","value":1}"#), &ctx)
            .await
            .unwrap();

        let ProcessingResult::Update(update) = result else {
            panic!("expected an update, got {:?}", result);
        };
        assert_eq!(update.temp.unwrap()["x"], json!(1));
        assert!(matches!(rx.recv().await.unwrap(), DialogEvent::ActionStarted { .. }));
        assert!(matches!(rx.recv().await.unwrap(), DialogEvent::ActionEnded { success: true, .. }));
    }

    #[tokio::test]
    async fn test_empty_outcome_is_none() {
        let registry = ActionRegistry::new().with_fn("noop", |_, _, _| Ok(ActionOutcome::none()));
        let (strategy, _rx) = strategy(Arc::new(registry), Duration::from_secs(1));
        let session = session();
        let event = Event::text("bot", "hi");
        let election = Election::default();
        let ctx = InstructionContext { session: &session, event: &event, election: &election };

        let result = strategy.execute(&Instruction::on_receive("noop"), &ctx).await.unwrap();
        assert_eq!(result, ProcessingResult::None);
    }

    #[tokio::test]
    async fn test_failure_becomes_action_error() {
        let (strategy, mut rx) = strategy(Arc::new(ActionRegistry::new()), Duration::from_secs(1));
        let session = session();
        let event = Event::text("bot", "hi");
        let election = Election::default();
        let ctx = InstructionContext { session: &session, event: &event, election: &election };

        let err = strategy.execute(&Instruction::on_enter("missing"), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::ActionExecution { ref action, .. } if action == "missing"));
        let _started = rx.recv().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), DialogEvent::ActionEnded { success: false, .. }));
    }

    #[tokio::test]
    async fn test_timeout_becomes_action_error() {
        let (strategy, _rx) = strategy(Arc::new(SlowRunner), Duration::from_millis(50));
        let session = session();
        let event = Event::text("bot", "hi");
        let election = Election::default();
        let ctx = InstructionContext { session: &session, event: &event, election: &election };

        let err = strategy.execute(&Instruction::on_enter("slow"), &ctx).await.unwrap_err();
        match err {
            Error::ActionExecution { message, .. } => assert!(message.contains("timed out")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
