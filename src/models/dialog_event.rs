use serde::{Deserialize, Serialize};

/// Lifecycle notifications published by a [`DialogEngine`](crate::services::dialog::DialogEngine)
/// on its broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DialogEvent {
    SessionStarted {
        session_id: String,
    },
    SessionExpired {
        session_id: String,
    },
    ContextExpired {
        session_id: String,
        flow: String,
        node: String,
    },
    ActionStarted {
        session_id: String,
        action: String,
    },
    ActionEnded {
        session_id: String,
        action: String,
        success: bool,
    },
    Transitioned {
        session_id: String,
        from_flow: String,
        from_node: String,
        to_flow: String,
        to_node: String,
    },
    Waiting {
        session_id: String,
        node: String,
    },
    FlowEnded {
        session_id: String,
        flow: String,
    },
    ProcessingError {
        session_id: String,
        code: String,
        message: String,
    },
}

impl DialogEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionStarted { session_id }
            | Self::SessionExpired { session_id }
            | Self::ContextExpired { session_id, .. }
            | Self::ActionStarted { session_id, .. }
            | Self::ActionEnded { session_id, .. }
            | Self::Transitioned { session_id, .. }
            | Self::Waiting { session_id, .. }
            | Self::FlowEnded { session_id, .. }
            | Self::ProcessingError { session_id, .. } => session_id,
        }
    }
}
