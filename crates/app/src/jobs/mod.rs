pub mod queue;
pub mod scheduler;
pub mod shutdown;
pub mod tasks;

use std::future::Future;

use thiserror::Error;
use tracing::{info, warn};

use crate::conversation::QueuedReply;
use crate::jobs::queue::{work_queue, QueueSender};
use crate::jobs::shutdown::Shutdown;
use crate::state::{AppState, LoopName};
use quill_core::domain::items::{GeneratedResponse, Item};
use quill_core::domain::source::SourceError;

const RECENT_RESPONSES_LOGGED: i64 = 5;
const RESPONSE_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("content source error: {0}")]
    Source(#[from] SourceError),
    #[error("posted comments db error: {0}")]
    PostedComments(#[from] quill_infra::db::PostedCommentsRepoError),
}

/// Runs the five pipeline loops until `shutdown` fires.
pub async fn start(state: AppState, shutdown: Shutdown, skip_initial_scan: bool) -> Result<(), JobError> {
    let (posts_tx, posts_rx) = work_queue::<Item>(state.queues.posts.clone());
    let (comments_tx, comments_rx) = work_queue::<GeneratedResponse>(state.queues.comments.clone());
    let (replies_tx, replies_rx) = work_queue::<QueuedReply>(state.queues.replies.clone());

    log_recent_responses(&state).await;
    if skip_initial_scan {
        info!("initial scan skipped");
    } else {
        let queued = tasks::post_scan::initial(&state, &posts_tx).await;
        info!(queued, "initial scan complete");
    }

    let config = state.config.clone();

    let scan_state = state.clone();
    let scan_job = scheduler::run_interval(
        LoopName::ScheduledScan.as_str(),
        config.scan_interval,
        config.loop_backoff,
        false,
        shutdown.clone(),
        move || {
            let state = scan_state.clone();
            let posts = posts_tx.clone();
            async move {
                tracked(&state, LoopName::ScheduledScan, async {
                    tasks::post_scan::run(&state, &posts).await;
                    true
                })
                .await;
                Ok(())
            }
        },
    );

    let post_state = state.clone();
    let post_job = scheduler::drain_queue(
        LoopName::PostQueue.as_str(),
        posts_rx,
        shutdown.clone(),
        move |item| {
            let state = post_state.clone();
            let comments = comments_tx.clone();
            async move {
                tracked(
                    &state,
                    LoopName::PostQueue,
                    tasks::post_queue::process(&state, item, &comments),
                )
                .await;
            }
        },
    );

    let dispatch_state = state.clone();
    let dispatch_shutdown = shutdown.clone();
    let dispatch_job = scheduler::drain_queue(
        LoopName::CommentDispatch.as_str(),
        comments_rx,
        shutdown.clone(),
        move |response| {
            let state = dispatch_state.clone();
            let mut shutdown = dispatch_shutdown.clone();
            async move {
                tracked(
                    &state,
                    LoopName::CommentDispatch,
                    tasks::comment_dispatch::deliver(&state, response, &mut shutdown),
                )
                .await;
            }
        },
    );

    let reply_scan_state = state.clone();
    let reply_scan_job = scheduler::run_interval(
        LoopName::ScheduledReplyScan.as_str(),
        config.reply_scan_interval,
        config.loop_backoff,
        true,
        shutdown.clone(),
        move || {
            let state = reply_scan_state.clone();
            let replies = replies_tx.clone();
            async move { scan_replies(&state, &replies).await }
        },
    );

    let reply_state = state.clone();
    let reply_shutdown = shutdown.clone();
    let reply_job = scheduler::drain_queue(
        LoopName::ReplyQueue.as_str(),
        replies_rx,
        shutdown,
        move |queued| {
            let state = reply_state.clone();
            let mut shutdown = reply_shutdown.clone();
            async move {
                tracked(
                    &state,
                    LoopName::ReplyQueue,
                    tasks::reply_queue::process(&state, queued, &mut shutdown),
                )
                .await;
            }
        },
    );

    tokio::try_join!(scan_job, post_job, dispatch_job, reply_scan_job, reply_job)?;
    info!("all loops stopped");
    Ok(())
}

async fn scan_replies(
    state: &AppState,
    replies: &QueueSender<QueuedReply>,
) -> Result<(), JobError> {
    state.record_run(LoopName::ScheduledReplyScan).await;
    match tasks::reply_scan::run(state, replies).await {
        Ok(stats) => {
            info!(
                comments = stats.comments,
                queued = stats.queued,
                rejected = stats.rejected,
                skipped = stats.skipped,
                "reply scan complete"
            );
            state.record_outcome(LoopName::ScheduledReplyScan, true).await;
            Ok(())
        }
        Err(err) => {
            state.record_outcome(LoopName::ScheduledReplyScan, false).await;
            Err(err)
        }
    }
}

async fn tracked<Fut>(state: &AppState, name: LoopName, work: Fut)
where
    Fut: Future<Output = bool>,
{
    state.record_run(name).await;
    let success = work.await;
    state.record_outcome(name, success).await;
}

async fn log_recent_responses(state: &AppState) {
    match state.dedup.recent_responses(RECENT_RESPONSES_LOGGED).await {
        Ok(recent) if recent.is_empty() => info!("no previously processed items"),
        Ok(recent) => {
            info!(count = recent.len(), "found previously processed items");
            for item in recent {
                info!(
                    item_id = %item.item_id,
                    title = %item.title,
                    responded_at = %item.response_at,
                    response = %item.last_response_preview(RESPONSE_PREVIEW_CHARS),
                    "previous response"
                );
            }
        }
        Err(err) => warn!(error = %err, "failed to load recent responses"),
    }
}
