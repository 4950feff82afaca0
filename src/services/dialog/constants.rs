//! Constants for the dialog engine and its session actors

/// Capacity of the lifecycle broadcast channel; slow subscribers lag past this
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
/// Flow whose start node handles timeouts when nothing more specific exists
pub const TIMEOUT_FLOW: &str = "timeout.flow.json";
/// Flow a failed transition is rerouted to when nothing more specific is set
pub const ERROR_FLOW: &str = "error.flow.json";
/// Temp variable naming the flow a failed transition is rerouted to
pub const ON_ERROR_FLOW_VAR: &str = "onErrorFlowTo";
/// Node name looked up in the current flow when a context times out
pub const TIMEOUT_NODE: &str = "timeout";
/// Event type of the synthetic event used for timeout turns
pub const TIMEOUT_EVENT_TYPE: &str = "timeout";
/// Attempts to reach a session actor before giving up
pub const MAX_DISPATCH_ATTEMPTS: u32 = 3;
