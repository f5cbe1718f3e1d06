use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::comments::{OwnComment, Reply};
use crate::domain::items::Item;
use crate::types::content_id::ContentId;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. })
    }
}

/// The external feed: where items come from and where responses go back to.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Account name the source posts as; replies authored by it are ignored.
    fn account_name(&self) -> &str;

    async fn fetch_newest(&self, limit: usize) -> Result<Vec<Item>, SourceError>;

    async fn fetch_own_comments(&self, limit: usize) -> Result<Vec<OwnComment>, SourceError>;

    async fn fetch_replies(&self, comment_id: &str) -> Result<Vec<Reply>, SourceError>;

    async fn post_comment(&self, item_id: &ContentId, text: &str) -> Result<String, SourceError>;

    async fn post_reply(&self, comment_id: &str, text: &str) -> Result<String, SourceError>;
}
