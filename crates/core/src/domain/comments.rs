use chrono::{DateTime, Utc};
use serde::Serialize;

/// A comment authored by the bot account, as listed by the content source.
#[derive(Debug, Clone, Serialize)]
pub struct OwnComment {
    pub id: String,
    pub item_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A direct reply to one of the bot's comments.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub id: String,
    pub parent_id: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// One step of a conversation thread. Depth 1 is a reply to a top-level
/// comment; every later reply sits one deeper than the comment it answers.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyNode {
    pub parent_comment_id: String,
    pub reply_id: String,
    pub text: String,
    pub author: String,
    pub depth: u32,
    pub response: Option<String>,
    pub response_id: Option<String>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl ReplyNode {
    /// Delivered or answered nodes are terminal, as is any node deeper than
    /// `max_depth`. An answer recorded ahead of delivery counts.
    pub fn is_terminal(&self, max_depth: u32) -> bool {
        self.processed || self.response.is_some() || self.depth > max_depth
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::ReplyNode;

    fn node(depth: u32, processed: bool) -> ReplyNode {
        ReplyNode {
            parent_comment_id: "c1".to_string(),
            reply_id: "r1".to_string(),
            text: "hi".to_string(),
            author: "someone".to_string(),
            depth,
            response: None,
            response_id: None,
            processed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn node_is_terminal_once_answered_or_too_deep() {
        assert!(!node(3, false).is_terminal(5));
        assert!(!node(5, false).is_terminal(5));
        assert!(node(6, false).is_terminal(5));
        assert!(node(1, true).is_terminal(5));

        let mut pending = node(2, false);
        pending.response = Some("on its way".to_string());
        assert!(pending.is_terminal(5));
    }
}
