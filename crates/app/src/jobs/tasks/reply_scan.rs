use tracing::{debug, info, warn};

use crate::conversation::QueuedReply;
use crate::dedup::SeenKey;
use crate::jobs::queue::QueueSender;
use crate::jobs::JobError;
use crate::state::AppState;
use quill_infra::db::has_any_comment;

#[derive(Debug, Default)]
pub struct ReplyScanStats {
    pub comments: usize,
    pub queued: usize,
    pub rejected: usize,
    pub skipped: usize,
}

/// Collects new replies to the account's comments. Does nothing until the
/// account has posted at least once.
pub async fn run(
    state: &AppState,
    replies: &QueueSender<QueuedReply>,
) -> Result<ReplyScanStats, JobError> {
    let mut stats = ReplyScanStats::default();
    if !has_any_comment(&state.db).await? {
        debug!("no comments posted yet; reply scan waits");
        return Ok(stats);
    }

    let account = state.source.account_name().to_string();
    let own = state
        .source
        .fetch_own_comments(state.config.own_comments_limit)
        .await?;
    stats.comments = own.len();

    for comment in own {
        let found = match state.source.fetch_replies(&comment.id).await {
            Ok(found) => found,
            Err(err) if err.is_rate_limited() => return Err(err.into()),
            Err(err) => {
                warn!(comment_id = %comment.id, error = %err, "fetching replies failed");
                continue;
            }
        };
        for reply in found {
            if reply.author.eq_ignore_ascii_case(&account) {
                continue;
            }
            if state.tracker.is_processed(&reply.id).await
                || state.dedup.seen(SeenKey::Reply(&reply.id)).await
            {
                stats.skipped += 1;
                continue;
            }
            let depth = state.tracker.depth_of(&reply.parent_id).await + 1;
            state.dedup.mark_seen(SeenKey::Reply(&reply.id)).await;
            if !state.tracker.admits(depth) {
                info!(
                    reply_id = %reply.id,
                    depth,
                    max_depth = state.tracker.max_depth(),
                    "conversation too deep; not answering"
                );
                stats.rejected += 1;
                continue;
            }
            info!(reply_id = %reply.id, author = %reply.author, depth, "new reply queued");
            if replies.push(QueuedReply { reply, depth }) {
                stats.queued += 1;
            }
        }
    }
    Ok(stats)
}
