//! Configuration module for the talkback server
//!
//! This module handles server configuration from various sources: YAML files and
//! environment variables. Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use talkback::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::core::session::SessionConfig;
use crate::core::tts::AudioFormat;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

/// Server configuration
///
/// Contains everything needed to run the server:
/// - Listener settings (host, port)
/// - Session defaults handed to every connection
/// - Device authentication settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Session settings
    pub idle_timeout_seconds: u64,
    pub watchdog_interval_seconds: u64,
    pub synthesis_timeout_seconds: u64,
    pub segment_threshold: usize,
    pub max_tool_depth: usize,
    pub synthesis_workers: usize,
    pub audio_format: AudioFormat,
    pub report_enabled: bool,

    // Authentication settings
    pub auth_enabled: bool,
    pub auth_tokens: Vec<String>,
    pub auth_allowed_devices: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            idle_timeout_seconds: session.idle_timeout.as_secs(),
            watchdog_interval_seconds: session.watchdog_interval.as_secs(),
            synthesis_timeout_seconds: session.synthesis_timeout.as_secs(),
            segment_threshold: session.segment_threshold,
            max_tool_depth: session.max_tool_depth,
            synthesis_workers: session.synthesis_workers,
            audio_format: session.audio_format,
            report_enabled: session.report_enabled,
            auth_enabled: false,
            auth_tokens: Vec::new(),
            auth_allowed_devices: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// The merged configuration is validated before it is returned.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // No .env loading here: the YAML file is the source of truth and only
        // real environment variables override it.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_seconds),
            watchdog_interval: Duration::from_secs(self.watchdog_interval_seconds),
            synthesis_timeout: Duration::from_secs(self.synthesis_timeout_seconds),
            segment_threshold: self.segment_threshold,
            max_tool_depth: self.max_tool_depth,
            synthesis_workers: self.synthesis_workers,
            audio_format: self.audio_format,
            report_enabled: self.report_enabled,
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    pub(super) fn cleanup_env_vars() {
        for key in env::ENV_KEYS {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_session_config_projection() {
        let config = ServerConfig {
            idle_timeout_seconds: 60,
            synthesis_timeout_seconds: 3,
            segment_threshold: 20,
            max_tool_depth: 2,
            audio_format: AudioFormat::Opus,
            report_enabled: true,
            ..ServerConfig::default()
        };

        let session = config.session_config();
        assert_eq!(session.idle_timeout, Duration::from_secs(60));
        assert_eq!(session.synthesis_timeout, Duration::from_secs(3));
        assert_eq!(session.watchdog_interval, Duration::from_secs(10));
        assert_eq!(session.segment_threshold, 20);
        assert_eq!(session.max_tool_depth, 2);
        assert_eq!(session.audio_format, AudioFormat::Opus);
        assert!(session.report_enabled);
    }

    #[test]
    fn test_address() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..ServerConfig::default()
        };
        assert_eq!(config.address(), "127.0.0.1:9000");
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

session:
  idle_timeout_seconds: 90
  segment_threshold: 12
  audio_format: opus
"#;
        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.idle_timeout_seconds, 90);
        assert_eq!(config.segment_threshold, 12);
        assert_eq!(config.audio_format, AudioFormat::Opus);
        // Defaults for everything else
        assert_eq!(config.max_tool_depth, 5);
        assert!(!config.auth_enabled);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_env_overrides_yaml() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080

session:
  max_tool_depth: 3
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            std::env::set_var("HOST", "0.0.0.0");
            std::env::set_var("MAX_TOOL_DEPTH", "7");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // ENV overrides YAML
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_tool_depth, 7);
        // YAML value used when no ENV
        assert_eq!(config.port, 8080);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_with_auth() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
auth:
  enabled: true
  tokens:
    - "token-a"
    - "token-b"
  allowed_devices:
    - "aa:bb:cc:dd:ee:ff"
"#;
        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();

        assert!(config.auth_enabled);
        assert_eq!(config.auth_tokens, vec!["token-a", "token-b"]);
        assert_eq!(config.auth_allowed_devices, vec!["aa:bb:cc:dd:ee:ff"]);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let result = ServerConfig::from_file(&PathBuf::from("/nonexistent/config.yaml"));

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_values() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "session:\n  max_tool_depth: 0\n").unwrap();

        let result = ServerConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_tool_depth"));
    }
}
