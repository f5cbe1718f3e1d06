use tracing::debug;

use crate::jobs::queue::QueueSender;
use crate::state::AppState;
use quill_core::domain::items::{GeneratedResponse, Item};

/// Generates a response for `item` and hands it to the comment queue.
pub async fn process(
    state: &AppState,
    item: Item,
    comments: &QueueSender<GeneratedResponse>,
) -> bool {
    debug!(item_id = %item.id, "processing item");
    match state.generator.generate(&item).await {
        Some(response) => comments.push(response),
        None => false,
    }
}
