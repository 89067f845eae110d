use std::env;
use std::fmt::Display;
use std::str::FromStr;

use super::ServerConfig;
use super::merge::merge_config;
use super::utils::{parse_bool, parse_list};
use super::validation::validate;

/// Every environment variable the server reads
pub const ENV_KEYS: &[&str] = &[
    "HOST",
    "PORT",
    "IDLE_TIMEOUT_SECONDS",
    "WATCHDOG_INTERVAL_SECONDS",
    "SYNTHESIS_TIMEOUT_SECONDS",
    "SEGMENT_THRESHOLD",
    "MAX_TOOL_DEPTH",
    "SYNTHESIS_WORKERS",
    "AUDIO_FORMAT",
    "REPORT_ENABLED",
    "AUTH_ENABLED",
    "AUTH_TOKENS",
    "AUTH_ALLOWED_DEVICES",
];

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with sensible defaults.
    /// Also loads from .env file if present using dotenvy.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = merge_config(None)?;
        validate(&config)?;
        Ok(config)
    }
}

/// Raw string value, `None` when unset
pub(super) fn env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Parsed value, `None` when unset, an error when malformed
pub(super) fn env_parsed<T>(key: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {key} environment variable: {e}").into()),
        Err(_) => Ok(None),
    }
}

pub(super) fn env_bool(key: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(raw) => parse_bool(&raw)
            .map(Some)
            .ok_or_else(|| format!("Invalid {key} environment variable: {raw}").into()),
        Err(_) => Ok(None),
    }
}

pub(super) fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|raw| parse_list(&raw))
}
