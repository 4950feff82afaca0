use serde::{Deserialize, Serialize};

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dialog: DialogConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub flows: FlowsConfig,
}

/// Global dialog settings. Timeout intervals may be overridden per bot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DialogConfig {
    /// How long a conversation context (flow, node, temp vars) survives without activity.
    pub context_timeout_interval: String,
    /// How long the session identity and session vars survive without activity.
    pub session_timeout_interval: String,
    /// Flow a brand new context starts in.
    pub default_flow: String,
    /// Maximum number of transitions a single turn may take.
    pub max_transition_hops: u32,
    /// Upper bound for one action execution, in milliseconds.
    pub action_timeout_ms: u64,
    /// Elected intents below this scaled confidence fall back to `none`.
    pub min_intent_confidence: f64,
    /// Bot-level overrides keyed by bot id.
    pub bots: HashMap<String, BotDialogConfig>,
}

/// Per-bot overrides. `None` falls back to the global value.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BotDialogConfig {
    pub context_timeout_interval: Option<String>,
    pub session_timeout_interval: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of each session actor's command channel.
    pub command_buffer: usize,
    /// Idle session actors shut down after this many seconds.
    pub actor_inactivity_timeout_secs: u64,
    /// Interval of the expiry sweeper, in seconds.
    pub sweeper_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlowsConfig {
    /// Directory holding `*.flow.json` / `*.flow.yaml` definitions.
    pub directory: String,
}

impl Config {
    /// Load configuration from environment variables, with defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            // Override with environment variables using `FLOWBOT__` prefix and `__` separator
            // e.g., FLOWBOT__DIALOG__CONTEXT_TIMEOUT_INTERVAL="5m"
            .add_source(
                config::Environment::with_prefix("FLOWBOT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl DialogConfig {
    /// Returns the overrides for a bot, or empty overrides if none are configured.
    pub fn for_bot(&self, bot_id: &str) -> BotDialogConfig {
        self.bots.get(bot_id).cloned().unwrap_or_default()
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

impl RuntimeConfig {
    pub fn actor_inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.actor_inactivity_timeout_secs)
    }

    pub fn sweeper_interval(&self) -> Duration {
        Duration::from_secs(self.sweeper_interval_secs)
    }
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            context_timeout_interval: "2m".to_string(),
            session_timeout_interval: "30m".to_string(),
            default_flow: "main.flow.json".to_string(),
            max_transition_hops: 32,
            action_timeout_ms: 10_000,
            min_intent_confidence: 0.3,
            bots: HashMap::new(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_buffer: 32,
            actor_inactivity_timeout_secs: 300,
            sweeper_interval_secs: 30,
        }
    }
}

impl Default for FlowsConfig {
    fn default() -> Self {
        Self {
            directory: "./flows".to_string(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use serde to serialize to pretty JSON
        match serde_json::to_string_pretty(&self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "Error serializing config"),
        }
    }
}
