pub mod dialog_event;
pub mod event;
pub mod flow;
pub mod session;

pub use dialog_event::DialogEvent;
pub use event::{Event, NluPayload, Prediction};
pub use flow::{ActionSpec, CatchAll, Flow, Node, ReceiveBehavior, TransitionSpec};
pub use session::{
    ContextPhase, DialogContext, DialogSession, Expiry, JumpPoint, StateUpdate, Variables,
};
