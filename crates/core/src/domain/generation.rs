use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

/// Text generation backend. One implementation per vendor, chosen at startup.
#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    async fn close(&self) {}
}
