//! Application Configuration Module
//!
//! Loads the voice service settings from environment variables (and a `.env`
//! file when present) into a single struct that `main` hands to the engines.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

// --- Application Constants ---

/// How long the gateway has to accept a connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
/// How long the console capture waits for a line before reporting no speech.
pub const DEFAULT_NO_SPEECH_TIMEOUT_SECS: u64 = 8;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub connect_timeout: Duration,
    pub no_speech_timeout: Duration,
    /// External speech recognizer. Console input is used when unset.
    pub capture_command: Option<String>,
    /// External text-to-speech program. Speech is paced silently when unset.
    pub speech_command: Option<String>,
    pub settings_path: Option<PathBuf>,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidNumber { name: String, value: String },
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GATEWAY_URL`: (Optional) WebSocket address of the gateway. Overrides the saved setting.
    // *   `GATEWAY_TOKEN`: (Optional) Access token sent as the `token` query parameter.
    // *   `CONNECT_TIMEOUT_SECS`: (Optional) Defaults to 5.
    // *   `NO_SPEECH_TIMEOUT_SECS`: (Optional) Defaults to 8.
    // *   `CAPTURE_COMMAND`: (Optional) Recognizer program printing `partial:`/`final:`/`error:` lines.
    // *   `SPEECH_COMMAND`: (Optional) Text-to-speech program; the text is passed as the last argument.
    // *   `SETTINGS_PATH`: (Optional) Where gateway settings are persisted.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Useful for local development; ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let connect_timeout = seconds(
            "CONNECT_TIMEOUT_SECS",
            non_empty("CONNECT_TIMEOUT_SECS"),
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?;
        let no_speech_timeout = seconds(
            "NO_SPEECH_TIMEOUT_SECS",
            non_empty("NO_SPEECH_TIMEOUT_SECS"),
            DEFAULT_NO_SPEECH_TIMEOUT_SECS,
        )?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gateway_url: non_empty("GATEWAY_URL"),
            gateway_token: non_empty("GATEWAY_TOKEN"),
            connect_timeout,
            no_speech_timeout,
            capture_command: non_empty("CAPTURE_COMMAND"),
            speech_command: non_empty("SPEECH_COMMAND"),
            settings_path: non_empty("SETTINGS_PATH").map(PathBuf::from),
            log_level,
        })
    }
}

fn seconds(name: &str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(Duration::from_secs(default)),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidNumber {
                name: name.to_string(),
                value,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();

        assert_eq!(config.gateway_url, None);
        assert_eq!(config.gateway_token, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.no_speech_timeout, Duration::from_secs(8));
        assert_eq!(config.capture_command, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn values_are_read_and_blank_ones_ignored() {
        let config = load(&[
            ("GATEWAY_URL", "ws://gateway:8787/ws"),
            ("GATEWAY_TOKEN", "  "),
            ("CONNECT_TIMEOUT_SECS", "2"),
            ("SPEECH_COMMAND", "espeak -v en"),
            ("SETTINGS_PATH", "/tmp/voice.json"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();

        assert_eq!(config.gateway_url.as_deref(), Some("ws://gateway:8787/ws"));
        assert_eq!(config.gateway_token, None);
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.speech_command.as_deref(), Some("espeak -v en"));
        assert_eq!(config.settings_path, Some(PathBuf::from("/tmp/voice.json")));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn bad_numbers_and_levels_are_rejected() {
        assert_eq!(
            load(&[("NO_SPEECH_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidNumber {
                name: "NO_SPEECH_TIMEOUT_SECS".to_string(),
                value: "soon".to_string(),
            })
        );
        assert!(load(&[("CONNECT_TIMEOUT_SECS", "0")]).is_err());
        assert_eq!(
            load(&[("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }
}
