//! Session and context expiry computation.

use crate::config::{BotDialogConfig, DialogConfig};
use crate::error::{Error, Result};
use crate::models::Expiry;
use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use std::sync::LazyLock;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(\d+(?:\.\d+)?)\s*(ms|msecs?|milliseconds?|s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?|d|days?|w|weeks?)?\s*$",
    )
    .expect("duration pattern is valid")
});

/// Parses a human duration such as `"500ms"`, `"30s"`, `"5m"`, `"2h"`, `"1d"`.
/// A bare number is interpreted as milliseconds.
pub fn parse_duration(input: &str) -> Result<TimeDelta> {
    let captures = DURATION_PATTERN
        .captures(input)
        .ok_or_else(|| Error::Configuration(format!("Invalid duration '{}'", input)))?;

    let amount: f64 = captures[1]
        .parse()
        .map_err(|_| Error::Configuration(format!("Invalid duration amount in '{}'", input)))?;

    let unit = captures
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| "ms".to_string());

    let unit_ms: f64 = match unit.chars().next() {
        Some('m') if unit.starts_with("ms") || unit.starts_with("msec") || unit.starts_with("milli") => 1.0,
        Some('s') => 1_000.0,
        Some('m') => 60_000.0,
        Some('h') => 3_600_000.0,
        Some('d') => 86_400_000.0,
        Some('w') => 604_800_000.0,
        _ => return Err(Error::Configuration(format!("Invalid duration unit in '{}'", input))),
    };

    let millis = (amount * unit_ms).round();
    if !millis.is_finite() || millis > i64::MAX as f64 {
        return Err(Error::Configuration(format!("Duration '{}' is out of range", input)));
    }

    TimeDelta::try_milliseconds(millis as i64)
        .ok_or_else(|| Error::Configuration(format!("Duration '{}' is out of range", input)))
}

/// Computes absolute expiry timestamps, preferring the bot's overrides over the
/// global defaults.
pub fn create_expiry(bot: &BotDialogConfig, global: &DialogConfig, now: DateTime<Utc>) -> Result<Expiry> {
    let context_interval = bot
        .context_timeout_interval
        .as_deref()
        .unwrap_or(&global.context_timeout_interval);
    let session_interval = bot
        .session_timeout_interval
        .as_deref()
        .unwrap_or(&global.session_timeout_interval);

    Ok(Expiry {
        context: now + parse_duration(context_interval)?,
        session: now + parse_duration(session_interval)?,
    })
}
