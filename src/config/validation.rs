use super::ServerConfig;

/// Validate a merged configuration
///
/// Checks that:
/// - every timeout and interval is positive
/// - segment threshold, tool depth and synthesis workers are at least 1
/// - enabling auth comes with at least one token
pub fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let positive = [
        ("idle_timeout_seconds", config.idle_timeout_seconds),
        ("watchdog_interval_seconds", config.watchdog_interval_seconds),
        ("synthesis_timeout_seconds", config.synthesis_timeout_seconds),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(format!("{name} must be greater than zero").into());
        }
    }

    let at_least_one = [
        ("segment_threshold", config.segment_threshold),
        ("max_tool_depth", config.max_tool_depth),
        ("synthesis_workers", config.synthesis_workers),
    ];
    for (name, value) in at_least_one {
        if value < 1 {
            return Err(format!("{name} must be at least 1").into());
        }
    }

    validate_auth(config.auth_enabled, &config.auth_tokens)
}

/// Enabling auth requires at least one non-empty token
pub fn validate_auth(enabled: bool, tokens: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if enabled && tokens.iter().all(|t| t.trim().is_empty()) {
        return Err("When AUTH_ENABLED=true, AUTH_TOKENS must contain at least one token".into());
    }
    Ok(())
}
