use std::sync::Arc;

use crate::auth::{DeviceAuthenticator, TokenAuthenticator};
use crate::config::ServerConfig;
use crate::core::provisioning::{Provisioner, StaticProvisioner};
use crate::core::report::{LogReportSink, ReportSink};

mod restart;

pub use restart::{ProcessRestart, RestartError, RestartHook};

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Decides whether a device may connect
    pub authenticator: Arc<dyn DeviceAuthenticator>,
    /// Resolves device-specific collaborators for each session
    pub provisioner: Arc<dyn Provisioner>,
    /// Destination of spoken-segment reports
    pub report_sink: Arc<dyn ReportSink>,
    /// Runs when a client requests a server restart
    pub restart: Arc<dyn RestartHook>,
}

impl AppState {
    /// State wired with the built-in collaborators
    pub fn new(config: ServerConfig) -> Self {
        let authenticator = Arc::new(TokenAuthenticator::from_config(&config));
        Self {
            config,
            authenticator,
            provisioner: Arc::new(StaticProvisioner::default()),
            report_sink: Arc::new(LogReportSink),
            restart: Arc::new(ProcessRestart::default()),
        }
    }

    /// Replace the provisioner, e.g. with one backed by a device console
    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_restart_hook(mut self, restart: Arc<dyn RestartHook>) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_report_sink(mut self, report_sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = report_sink;
        self
    }

    /// Check that the default synthesizer can produce the configured wire
    /// format. Devices would otherwise be announced a format whose audio is
    /// never sent.
    pub fn check_audio_format(&self) -> Result<(), String> {
        let format = self.config.audio_format;
        let synthesizer = self.provisioner.defaults().synthesizer;
        if synthesizer.supports_format(format) {
            Ok(())
        } else {
            let info = synthesizer.provider_info();
            let provider = info["provider"].as_str().unwrap_or("unknown");
            Err(format!(
                "AUDIO_FORMAT={format} is not supported by the configured synthesizer ({provider})"
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::AudioFormat;

    #[test]
    fn test_default_synthesizer_supports_pcm() {
        let state = AppState::new(ServerConfig::default());
        assert!(state.check_audio_format().is_ok());
    }

    #[test]
    fn test_unsupported_audio_format_is_reported() {
        let config = ServerConfig {
            audio_format: AudioFormat::Opus,
            ..ServerConfig::default()
        };
        let err = AppState::new(config).check_audio_format().unwrap_err();
        assert!(err.contains("AUDIO_FORMAT=opus"));
        assert!(err.contains("silent"));
    }
}
