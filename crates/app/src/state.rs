use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::conversation::ConversationTracker;
use crate::dedup::DedupStore;
use crate::dispatch::CommentDispatcher;
use crate::generator::ResponseGenerator;
use crate::jobs::queue::QueueGauge;
use crate::scanner::Scanner;
use quill_core::domain::source::ContentSource;
use quill_infra::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub source: Arc<dyn ContentSource>,
    pub dedup: Arc<DedupStore>,
    pub scanner: Arc<Scanner>,
    pub generator: Arc<ResponseGenerator>,
    pub dispatcher: Arc<CommentDispatcher>,
    pub tracker: Arc<ConversationTracker>,
    pub queues: QueueGauges,
    pub loop_health: Arc<Mutex<LoopHealth>>,
}

#[derive(Debug, Clone)]
pub struct QueueGauges {
    pub posts: QueueGauge,
    pub comments: QueueGauge,
    pub replies: QueueGauge,
}

impl Default for QueueGauges {
    fn default() -> Self {
        Self {
            posts: QueueGauge::new("posts"),
            comments: QueueGauge::new("comments"),
            replies: QueueGauge::new("replies"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopName {
    ScheduledScan,
    PostQueue,
    CommentDispatch,
    ScheduledReplyScan,
    ReplyQueue,
}

impl LoopName {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopName::ScheduledScan => "scheduled_scan",
            LoopName::PostQueue => "process_post_queue",
            LoopName::CommentDispatch => "comment_dispatch",
            LoopName::ScheduledReplyScan => "scheduled_reply_scan",
            LoopName::ReplyQueue => "process_reply_queue",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopStatus {
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoopHealth {
    pub scheduled_scan: LoopStatus,
    pub process_post_queue: LoopStatus,
    pub comment_dispatch: LoopStatus,
    pub scheduled_reply_scan: LoopStatus,
    pub process_reply_queue: LoopStatus,
}

impl LoopHealth {
    pub fn status_mut(&mut self, name: LoopName) -> &mut LoopStatus {
        match name {
            LoopName::ScheduledScan => &mut self.scheduled_scan,
            LoopName::PostQueue => &mut self.process_post_queue,
            LoopName::CommentDispatch => &mut self.comment_dispatch,
            LoopName::ScheduledReplyScan => &mut self.scheduled_reply_scan,
            LoopName::ReplyQueue => &mut self.process_reply_queue,
        }
    }
}

impl AppState {
    pub async fn record_run(&self, name: LoopName) {
        let mut health = self.loop_health.lock().await;
        health.status_mut(name).last_run_at = Some(Utc::now());
    }

    pub async fn record_outcome(&self, name: LoopName, success: bool) {
        let mut health = self.loop_health.lock().await;
        let status = health.status_mut(name);
        if success {
            status.last_success_at = Some(Utc::now());
            status.successes += 1;
        } else {
            status.failures += 1;
        }
    }
}
