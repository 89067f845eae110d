use serde::Deserialize;
use std::path::PathBuf;

use crate::core::tts::AudioFormat;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Environment
/// variables can override any values specified here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///
/// session:
///   idle_timeout_seconds: 180
///   watchdog_interval_seconds: 10
///   synthesis_timeout_seconds: 10
///   segment_threshold: 10
///   max_tool_depth: 5
///   synthesis_workers: 10
///   audio_format: pcm
///   report_enabled: false
///
/// auth:
///   enabled: true
///   tokens:
///     - "device-token"
///   allowed_devices:
///     - "aa:bb:cc:dd:ee:ff"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub session: Option<SessionYaml>,
    pub auth: Option<AuthYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Session defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub idle_timeout_seconds: Option<u64>,
    pub watchdog_interval_seconds: Option<u64>,
    pub synthesis_timeout_seconds: Option<u64>,
    pub segment_threshold: Option<usize>,
    pub max_tool_depth: Option<usize>,
    pub synthesis_workers: Option<usize>,
    pub audio_format: Option<AudioFormat>,
    pub report_enabled: Option<bool>,
}

/// Device authentication from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub enabled: Option<bool>,
    pub tokens: Option<Vec<String>>,
    pub allowed_devices: Option<Vec<String>>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

session:
  idle_timeout_seconds: 120
  watchdog_interval_seconds: 5
  synthesis_timeout_seconds: 8
  segment_threshold: 16
  max_tool_depth: 4
  synthesis_workers: 6
  audio_format: opus
  report_enabled: true

auth:
  enabled: true
  tokens: ["t1"]
  allowed_devices: ["dev-1", "dev-2"]
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));

        let session = config.session.as_ref().unwrap();
        assert_eq!(session.idle_timeout_seconds, Some(120));
        assert_eq!(session.segment_threshold, Some(16));
        assert_eq!(session.audio_format, Some(AudioFormat::Opus));
        assert_eq!(session.report_enabled, Some(true));

        let auth = config.auth.as_ref().unwrap();
        assert_eq!(auth.enabled, Some(true));
        assert_eq!(auth.allowed_devices.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_yaml_config_partial() {
        let yaml = r#"
session:
  max_tool_depth: 2
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        assert!(config.server.is_none());
        assert!(config.auth.is_none());
        let session = config.session.as_ref().unwrap();
        assert_eq!(session.max_tool_depth, Some(2));
        assert!(session.idle_timeout_seconds.is_none());
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();

        assert!(config.server.is_none());
        assert!(config.session.is_none());
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_yaml_config_unknown_audio_format() {
        let yaml = "session:\n  audio_format: mp3\n";
        assert!(serde_yaml::from_str::<YamlConfig>(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "server:\n  host: \"localhost\"\n  port: 3000\n").unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();

        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("localhost".to_string())
        );
        assert_eq!(config.server.as_ref().unwrap().port, Some(3000));
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
