//! Dialog engine.
//!
//! ```text
//!   Event ──► SessionRegistry ──► SessionActor (one per session id)
//!                                      │
//!                                      ▼
//!                                DialogEngine::process_event
//!                                      │  load / expire / create session
//!                                      │  elect intent
//!                                      ▼
//!                     factory::build_queue(node, flow, phase)
//!                                      │
//!                                      ▼
//!        ┌──────────── InstructionProcessor ◄──────────────┐
//!        │ on-enter / on-receive ─► ActionStrategy          │
//!        │ transition ─► TransitionStrategy ─► FlowNavigator┘ (rebuild queue)
//!        │ wait ─► save session, return
//!        └ queue exhausted ─► end flow, save, return
//! ```

pub mod actor;
pub mod clock;
pub mod condition;
pub mod constants;
pub mod election;
pub mod engine;
pub mod expiry;
pub mod instruction;
pub mod navigator;
pub mod registry;
pub mod strategies;
pub mod trace;

pub use actor::{SessionActor, SessionCommand, SessionHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use condition::{Condition, ConditionContext};
pub use election::{elect, Election};
pub use engine::{DialogEngine, ProcessingOutcome};
pub use expiry::{create_expiry, parse_duration};
pub use instruction::{Instruction, InstructionKind, InstructionQueue, ProcessingResult};
pub use navigator::{Destination, FlowNavigator};
pub use registry::SessionRegistry;
