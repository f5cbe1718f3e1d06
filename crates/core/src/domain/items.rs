use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::content_id::ContentId;

#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: ContentId,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedResponse {
    pub item_id: ContentId,
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

/// Durable proof that the account already commented on an item.
#[derive(Debug, Clone, Serialize)]
pub struct PostedComment {
    pub item_id: ContentId,
    pub comment_id: String,
    pub text: String,
    pub posted_at: DateTime<Utc>,
}
