use super::ServerConfig;
use super::env::{env_bool, env_list, env_parsed, env_string};
use super::yaml::YamlConfig;

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// Validation is left to the caller.
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();
    let defaults = ServerConfig::default();
    let server = yaml.server.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let auth = yaml.auth.unwrap_or_default();

    // ENV > YAML > default for parsed values
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match env_parsed($env_var)? {
                Some(value) => value,
                None => $yaml_value.unwrap_or($default),
            }
        };
    }

    // Server configuration
    let host = env_string("HOST")
        .or(server.host)
        .unwrap_or(defaults.host);
    let port = get_parsed!("PORT", server.port, defaults.port);

    // Session configuration
    let idle_timeout_seconds = get_parsed!(
        "IDLE_TIMEOUT_SECONDS",
        session.idle_timeout_seconds,
        defaults.idle_timeout_seconds
    );
    let watchdog_interval_seconds = get_parsed!(
        "WATCHDOG_INTERVAL_SECONDS",
        session.watchdog_interval_seconds,
        defaults.watchdog_interval_seconds
    );
    let synthesis_timeout_seconds = get_parsed!(
        "SYNTHESIS_TIMEOUT_SECONDS",
        session.synthesis_timeout_seconds,
        defaults.synthesis_timeout_seconds
    );
    let segment_threshold = get_parsed!(
        "SEGMENT_THRESHOLD",
        session.segment_threshold,
        defaults.segment_threshold
    );
    let max_tool_depth = get_parsed!(
        "MAX_TOOL_DEPTH",
        session.max_tool_depth,
        defaults.max_tool_depth
    );
    let synthesis_workers = get_parsed!(
        "SYNTHESIS_WORKERS",
        session.synthesis_workers,
        defaults.synthesis_workers
    );
    let audio_format = get_parsed!(
        "AUDIO_FORMAT",
        session.audio_format,
        defaults.audio_format
    );
    let report_enabled = env_bool("REPORT_ENABLED")?
        .or(session.report_enabled)
        .unwrap_or(defaults.report_enabled);

    // Authentication configuration
    let auth_enabled = env_bool("AUTH_ENABLED")?
        .or(auth.enabled)
        .unwrap_or(defaults.auth_enabled);
    let auth_tokens = env_list("AUTH_TOKENS")
        .or(auth.tokens)
        .unwrap_or_default();
    let auth_allowed_devices = env_list("AUTH_ALLOWED_DEVICES")
        .or(auth.allowed_devices)
        .unwrap_or_default();

    Ok(ServerConfig {
        host,
        port,
        idle_timeout_seconds,
        watchdog_interval_seconds,
        synthesis_timeout_seconds,
        segment_threshold,
        max_tool_depth,
        synthesis_workers,
        audio_format,
        report_enabled,
        auth_enabled,
        auth_tokens,
        auth_allowed_devices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::cleanup_env_vars;
    use crate::config::yaml::{AuthYaml, SessionYaml};
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_merge_without_yaml_uses_defaults() {
        cleanup_env_vars();

        let config = merge_config(None).unwrap();
        let defaults = ServerConfig::default();

        assert_eq!(config.host, defaults.host);
        assert_eq!(config.port, defaults.port);
        assert_eq!(config.max_tool_depth, defaults.max_tool_depth);
        assert!(config.auth_tokens.is_empty());
    }

    #[test]
    #[serial]
    fn test_merge_yaml_values() {
        cleanup_env_vars();

        let yaml = YamlConfig {
            session: Some(SessionYaml {
                synthesis_workers: Some(4),
                report_enabled: Some(true),
                ..Default::default()
            }),
            auth: Some(AuthYaml {
                tokens: Some(vec!["yaml-token".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_config(Some(yaml)).unwrap();

        assert_eq!(config.synthesis_workers, 4);
        assert!(config.report_enabled);
        assert_eq!(config.auth_tokens, vec!["yaml-token"]);
    }

    #[test]
    #[serial]
    fn test_merge_env_list_overrides_yaml_list() {
        cleanup_env_vars();

        unsafe {
            std::env::set_var("AUTH_TOKENS", "env-token");
        }

        let yaml = YamlConfig {
            auth: Some(AuthYaml {
                tokens: Some(vec!["yaml-token".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config = merge_config(Some(yaml)).unwrap();

        assert_eq!(config.auth_tokens, vec!["env-token"]);

        cleanup_env_vars();
    }
}
