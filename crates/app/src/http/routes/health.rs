use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::state::{AppState, LoopHealth};
use quill_infra::db::{count_items, count_posted_comments, count_processed_replies};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subreddit: String,
    pub account: String,
    pub generation_available: bool,
    pub loops: LoopHealth,
    pub queues: QueueDepths,
    pub cache: CacheStatus,
    pub store: StoreCounts,
}

#[derive(Debug, Serialize)]
pub struct QueueDepths {
    pub posts: usize,
    pub comments: usize,
    pub replies: usize,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub entries: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct StoreCounts {
    pub items: Option<i64>,
    pub posted_comments: Option<i64>,
    pub processed_replies: Option<i64>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let loops = state.loop_health.lock().await.clone();
    let store = store_counts(&state).await;
    let status = if store.items.is_some() { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        subreddit: state.config.subreddit.clone(),
        account: state.source.account_name().to_string(),
        generation_available: state.generator.is_available(),
        loops,
        queues: QueueDepths {
            posts: state.queues.posts.depth(),
            comments: state.queues.comments.depth(),
            replies: state.queues.replies.depth(),
        },
        cache: CacheStatus {
            entries: state.dedup.cached_len().await,
            capacity: state.config.cache_size,
        },
        store,
    })
}

async fn store_counts(state: &AppState) -> StoreCounts {
    let items = count_items(&state.db)
        .await
        .map_err(|err| warn!(error = %err, "counting items failed"))
        .ok();
    let posted_comments = count_posted_comments(&state.db)
        .await
        .map_err(|err| warn!(error = %err, "counting posted comments failed"))
        .ok();
    let processed_replies = count_processed_replies(&state.db)
        .await
        .map_err(|err| warn!(error = %err, "counting processed replies failed"))
        .ok();
    StoreCounts {
        items,
        posted_comments,
        processed_replies,
    }
}
