use chrono::Utc;
use tracing::warn;

use quill_core::domain::comments::{Reply, ReplyNode};
use quill_infra::db::{find_depth, find_reply, upsert_reply, DbPool};

/// A reply admitted for an answer, with its depth in the thread.
#[derive(Debug, Clone)]
pub struct QueuedReply {
    pub reply: Reply,
    pub depth: u32,
}

pub struct ConversationTracker {
    db: DbPool,
    max_depth: u32,
}

impl ConversationTracker {
    pub fn new(db: DbPool, max_depth: u32) -> Self {
        Self { db, max_depth }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Depth of the thread at `comment_id`; 0 when the comment is not part of
    /// a recorded conversation. A failed lookup reports the maximum so the
    /// caller rejects rather than recurses.
    pub async fn depth_of(&self, comment_id: &str) -> u32 {
        match find_depth(&self.db, comment_id).await {
            Ok(depth) => depth.unwrap_or(0),
            Err(err) => {
                warn!(comment_id, error = %err, "depth lookup failed");
                self.max_depth
            }
        }
    }

    pub fn admits(&self, depth: u32) -> bool {
        depth <= self.max_depth
    }

    /// Whether `reply_id` needs no further answer: delivered, answered but
    /// not yet confirmed, or recorded past the depth limit. Treats a failed
    /// lookup as processed.
    pub async fn is_processed(&self, reply_id: &str) -> bool {
        match find_reply(&self.db, reply_id).await {
            Ok(Some(node)) => node.is_terminal(self.max_depth),
            Ok(None) => false,
            Err(err) => {
                warn!(reply_id, error = %err, "processed lookup failed");
                true
            }
        }
    }

    pub async fn record_reply(&self, node: &ReplyNode) -> bool {
        match upsert_reply(&self.db, node).await {
            Ok(()) => true,
            Err(err) => {
                warn!(reply_id = %node.reply_id, error = %err, "failed to record reply");
                false
            }
        }
    }
}

pub fn pending_node(queued: &QueuedReply, response: String) -> ReplyNode {
    ReplyNode {
        parent_comment_id: queued.reply.parent_id.clone(),
        reply_id: queued.reply.id.clone(),
        text: queued.reply.body.clone(),
        author: queued.reply.author.clone(),
        depth: queued.depth,
        response: Some(response),
        response_id: None,
        processed: false,
        created_at: Utc::now(),
    }
}
