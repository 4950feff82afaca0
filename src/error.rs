use thiserror::Error;

/// The error type for the dialog engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed configuration: timeout durations, missing flows or start nodes,
    /// duplicate node names. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An instruction tag outside `on-enter`, `on-receive`, `transition`, `wait`.
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),

    /// An action failed or timed out. The turn is abandoned without saving.
    #[error("Action '{action}' failed: {message}")]
    ActionExecution { action: String, message: String },

    /// The per-turn transition hop guard was exceeded.
    #[error("Transition loop detected after {hops} hops: {}", path.join(" -> "))]
    TransitionLoop { hops: u32, path: Vec<String> },

    /// A transition condition could not be parsed.
    #[error("Invalid condition: {0}")]
    Condition(String),

    /// The flow provider failed to produce a flow.
    #[error("Flow error: {0}")]
    Flow(String),

    /// The session store failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// The session actor could not be reached or dropped the turn.
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// An error from the config crate.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An I/O error while reading flow definitions.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors that leave the persisted session untouched and can be
    /// retried with the same event.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ActionExecution { .. } | Self::Store(_) | Self::SessionUnavailable(_)
        )
    }

    /// Short machine-readable code, used in lifecycle notifications.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::Config(_) => "CONFIGURATION_ERROR",
            Self::UnknownInstruction(_) => "UNKNOWN_INSTRUCTION",
            Self::ActionExecution { .. } => "ACTION_EXECUTION",
            Self::TransitionLoop { .. } => "TRANSITION_LOOP",
            Self::Condition(_) => "INVALID_CONDITION",
            Self::Flow(_) => "FLOW_ERROR",
            Self::Store(_) => "STORE_ERROR",
            Self::SessionUnavailable(_) => "SESSION_UNAVAILABLE",
            Self::Json(_) | Self::Yaml(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

/// A type alias for `Result<T, Error>` to simplify function signatures.
pub type Result<T> = std::result::Result<T, Error>;
