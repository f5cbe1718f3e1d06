use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::jobs::shutdown::Shutdown;
use quill_core::domain::source::{ContentSource, SourceError};
use quill_core::types::content_id::ContentId;
use quill_infra::db::{has_commented, insert_posted_comment, DbPool};

#[derive(Debug, Default)]
struct LimiterState {
    last_post: Option<Instant>,
    blocked_until: Option<Instant>,
}

/// Single-token limiter shared by every outbound post. A permit holds the
/// lock until it is dropped, so callers are served one at a time.
#[derive(Debug)]
pub struct PostLimiter {
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

pub struct PostPermit<'a> {
    state: MutexGuard<'a, LimiterState>,
}

impl PostLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Waits for the next post slot. `None` once shutdown is requested.
    pub async fn acquire(&self, shutdown: &mut Shutdown) -> Option<PostPermit<'_>> {
        let state = tokio::select! {
            state = self.state.lock() => state,
            _ = shutdown.wait() => return None,
        };
        let mut ready_at = state.last_post.map(|last| last + self.min_interval);
        if let Some(blocked) = state.blocked_until {
            ready_at = Some(ready_at.map_or(blocked, |ready| ready.max(blocked)));
        }
        if let Some(ready_at) = ready_at {
            let now = Instant::now();
            if ready_at > now {
                debug!(wait_ms = (ready_at - now).as_millis() as u64, "waiting for post slot");
                tokio::select! {
                    _ = sleep_until(ready_at) => {}
                    _ = shutdown.wait() => return None,
                }
            }
        }
        if shutdown.is_set() {
            return None;
        }
        Some(PostPermit { state })
    }
}

impl PostPermit<'_> {
    pub fn mark_posted(mut self) {
        self.state.last_post = Some(Instant::now());
        self.state.blocked_until = None;
    }

    /// Holds back every caller for `wait` after the origin refused a post.
    pub fn defer(mut self, wait: Duration) {
        self.state.blocked_until = Some(Instant::now() + wait);
    }
}

pub struct CommentDispatcher {
    source: Arc<dyn ContentSource>,
    db: DbPool,
    limiter: PostLimiter,
    rate_limit_backoff: Duration,
}

impl CommentDispatcher {
    pub fn new(
        source: Arc<dyn ContentSource>,
        db: DbPool,
        min_interval: Duration,
        rate_limit_backoff: Duration,
    ) -> Self {
        Self {
            source,
            db,
            limiter: PostLimiter::new(min_interval),
            rate_limit_backoff,
        }
    }

    /// Posts a top-level comment and records it. `None` when the item was
    /// already commented on, delivery failed, or shutdown cut the wait short.
    pub async fn post(
        &self,
        item_id: &ContentId,
        text: &str,
        shutdown: &mut Shutdown,
    ) -> Option<String> {
        let Some(permit) = self.limiter.acquire(shutdown).await else {
            info!(item_id = %item_id, "shutdown requested; comment not posted");
            return None;
        };
        match has_commented(&self.db, item_id.as_str()).await {
            Ok(false) => {}
            Ok(true) => {
                info!(item_id = %item_id, "item already has a comment; not posting");
                return None;
            }
            Err(err) => {
                warn!(item_id = %item_id, error = %err, "posted comment lookup failed; not posting");
                return None;
            }
        }

        let comment_id = match self.source.post_comment(item_id, text).await {
            Ok(comment_id) => comment_id,
            Err(err) => {
                self.refused(permit, &err);
                warn!(item_id = %item_id, error = %err, "posting comment failed");
                return None;
            }
        };
        permit.mark_posted();
        info!(item_id = %item_id, comment_id = %comment_id, "comment posted");

        match insert_posted_comment(&self.db, item_id.as_str(), &comment_id, text, Utc::now()).await {
            Ok(true) => {}
            Ok(false) => warn!(item_id = %item_id, comment_id = %comment_id, "posted comment was already recorded"),
            Err(err) => warn!(item_id = %item_id, error = %err, "failed to record posted comment"),
        }
        Some(comment_id)
    }

    pub async fn reply(&self, parent_id: &str, text: &str, shutdown: &mut Shutdown) -> Option<String> {
        let Some(permit) = self.limiter.acquire(shutdown).await else {
            info!(parent_id, "shutdown requested; reply not posted");
            return None;
        };
        match self.source.post_reply(parent_id, text).await {
            Ok(reply_id) => {
                permit.mark_posted();
                info!(parent_id, reply_id = %reply_id, "reply posted");
                Some(reply_id)
            }
            Err(err) => {
                self.refused(permit, &err);
                warn!(parent_id, error = %err, "posting reply failed");
                None
            }
        }
    }

    fn refused(&self, permit: PostPermit<'_>, err: &SourceError) {
        if let SourceError::RateLimited { retry_after } = err {
            let wait = retry_after.unwrap_or(self.rate_limit_backoff);
            warn!(wait_secs = wait.as_secs(), "origin rate limited posting");
            permit.defer(wait);
        }
    }
}
