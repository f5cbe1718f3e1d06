use tracing::info;

use crate::jobs::queue::QueueSender;
use crate::state::AppState;
use quill_core::domain::items::Item;

pub async fn run(state: &AppState, posts: &QueueSender<Item>) -> usize {
    info!(subreddit = %state.config.subreddit, "scanning for new items");
    state.scanner.scan(posts).await.len()
}

pub async fn initial(state: &AppState, posts: &QueueSender<Item>) -> usize {
    state.scanner.initial_scan(posts).await.len()
}
