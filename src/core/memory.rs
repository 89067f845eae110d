use async_trait::async_trait;

use crate::core::dialogue::Message;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MemoryError {
    #[error("Memory query failed: {0}")]
    QueryFailed(String),
    #[error("Memory save failed: {0}")]
    SaveFailed(String),
}

/// Long-term memory store
#[async_trait]
pub trait Memory: Send + Sync {
    /// Context relevant to `text`, if any
    async fn query(&self, text: &str) -> Result<Option<String>, MemoryError>;

    /// Persist a finished dialogue
    async fn save(&self, dialogue: Vec<Message>) -> Result<(), MemoryError>;
}

/// Memory store that remembers nothing
#[derive(Debug, Clone, Default)]
pub struct NoMemory;

#[async_trait]
impl Memory for NoMemory {
    async fn query(&self, _text: &str) -> Result<Option<String>, MemoryError> {
        Ok(None)
    }

    async fn save(&self, _dialogue: Vec<Message>) -> Result<(), MemoryError> {
        Ok(())
    }
}
