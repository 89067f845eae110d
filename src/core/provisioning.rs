//! Device provisioning
//!
//! A provisioner resolves the capability set a device should use. When it
//! fails the session falls back to the default capabilities and runs in
//! needs-binding mode.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::llm::{LanguageModel, LoopbackModel};
use crate::core::memory::{Memory, NoMemory};
use crate::core::stt::{NullRecognizer, Recognizer};
use crate::core::tools::{EmptyToolbox, NoRemoteTools, RemoteTools, ToolDispatcher};
use crate::core::tts::{SilentSynthesizer, Synthesizer};

/// Identity a client presents when connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub client_id: Option<String>,
    pub client_ip: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Device requires binding (code {bind_code})")]
    DeviceBind { bind_code: String },
    #[error("Provisioning failed: {0}")]
    Other(String),
}

impl ProvisioningError {
    /// Bind code to read out to the user, when one was issued
    pub fn bind_code(&self) -> Option<&str> {
        match self {
            ProvisioningError::DeviceBind { bind_code } if !bind_code.is_empty() => Some(bind_code),
            _ => None,
        }
    }
}

/// Collaborators bound to one session
#[derive(Clone)]
pub struct Capabilities {
    pub recognizer: Arc<dyn Recognizer>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub model: Arc<dyn LanguageModel>,
    pub memory: Arc<dyn Memory>,
    pub tools: Arc<dyn ToolDispatcher>,
    pub remote_tools: Arc<dyn RemoteTools>,
    pub system_prompt: Option<String>,
}

impl Capabilities {
    /// Collaborators that need no external service
    pub fn loopback() -> Self {
        Self {
            recognizer: Arc::new(NullRecognizer::new()),
            synthesizer: Arc::new(SilentSynthesizer::new()),
            model: Arc::new(LoopbackModel::new()),
            memory: Arc::new(NoMemory),
            tools: Arc::new(EmptyToolbox),
            remote_tools: Arc::new(NoRemoteTools),
            system_prompt: None,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("system_prompt", &self.system_prompt)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Resolve the device-specific capabilities
    async fn provision(&self, device: &DeviceIdentity) -> Result<Capabilities, ProvisioningError>;

    /// Capabilities used when provisioning fails
    fn defaults(&self) -> Capabilities;
}

/// Provisioner that hands every device the same capabilities
#[derive(Debug, Clone)]
pub struct StaticProvisioner {
    capabilities: Capabilities,
}

impl StaticProvisioner {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }
}

impl Default for StaticProvisioner {
    fn default() -> Self {
        Self::new(Capabilities::loopback())
    }
}

#[async_trait]
impl Provisioner for StaticProvisioner {
    async fn provision(&self, _device: &DeviceIdentity) -> Result<Capabilities, ProvisioningError> {
        Ok(self.capabilities.clone())
    }

    fn defaults(&self) -> Capabilities {
        self.capabilities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_code_only_for_bind_errors() {
        let err = ProvisioningError::DeviceBind {
            bind_code: "123456".to_string(),
        };
        assert_eq!(err.bind_code(), Some("123456"));
        assert_eq!(
            ProvisioningError::DeviceBind {
                bind_code: String::new()
            }
            .bind_code(),
            None
        );
        assert_eq!(ProvisioningError::DeviceNotFound("d".into()).bind_code(), None);
    }

    #[tokio::test]
    async fn test_static_provisioner_returns_capabilities() {
        let provisioner = StaticProvisioner::default();
        let device = DeviceIdentity {
            device_id: "aa:bb".to_string(),
            client_id: None,
            client_ip: "127.0.0.1".to_string(),
        };
        let caps = provisioner.provision(&device).await.unwrap();
        assert!(caps.system_prompt.is_none());
    }
}
