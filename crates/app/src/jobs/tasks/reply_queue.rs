use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::config::ReplyDelay;
use crate::conversation::{pending_node, QueuedReply};
use crate::jobs::shutdown::Shutdown;
use crate::state::AppState;

/// Answers one queued reply: generate, record, pause, deliver, mark
/// processed. The answer is recorded before delivery so the thread depth
/// survives a crash mid-delivery.
pub async fn process(state: &AppState, queued: QueuedReply, shutdown: &mut Shutdown) -> bool {
    let Some(text) = state
        .generator
        .generate_reply(&queued.reply.body, queued.depth)
        .await
    else {
        return false;
    };

    let mut node = pending_node(&queued, text.clone());
    if !state.tracker.record_reply(&node).await {
        warn!(reply_id = %queued.reply.id, "reply not recorded; skipping delivery");
        return false;
    }

    let delay = humanizing_delay(state.config.reply_delay);
    info!(reply_id = %queued.reply.id, delay_secs = delay.as_secs(), "waiting before reply");
    if !shutdown.sleep(delay).await {
        return false;
    }

    let Some(response_id) = state.dispatcher.reply(&queued.reply.id, &text, shutdown).await else {
        return false;
    };
    node.processed = true;
    node.response_id = Some(response_id);
    state.tracker.record_reply(&node).await
}

fn humanizing_delay(range: ReplyDelay) -> Duration {
    if range.max <= range.min {
        return range.min;
    }
    rand::thread_rng().gen_range(range.min..=range.max)
}
