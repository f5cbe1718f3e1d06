use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dedup::DedupStore;
use crate::jobs::queue::QueueSender;
use quill_core::domain::items::Item;
use quill_core::domain::source::{ContentSource, SourceError};
use quill_core::text::preview;

#[derive(Debug, Default)]
struct ScanState {
    rate_limited_until: Option<Instant>,
}

/// Polls the feed for new items. The state lock is held for a whole scan, so
/// a second caller waits for the running scan to finish.
pub struct Scanner {
    source: Arc<dyn ContentSource>,
    dedup: Arc<DedupStore>,
    fetch_limit: usize,
    rate_limit_backoff: Duration,
    state: Mutex<ScanState>,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn ContentSource>,
        dedup: Arc<DedupStore>,
        fetch_limit: usize,
        rate_limit_backoff: Duration,
    ) -> Self {
        Self {
            source,
            dedup,
            fetch_limit,
            rate_limit_backoff,
            state: Mutex::new(ScanState::default()),
        }
    }

    pub async fn scan(&self, queue: &QueueSender<Item>) -> Vec<Item> {
        let mut state = self.state.lock().await;
        self.scan_locked(&mut state, queue).await
    }

    /// Startup scan. Forgets the in-memory cache first so the newest window is
    /// evaluated again; the durable table still filters handled items.
    pub async fn initial_scan(&self, queue: &QueueSender<Item>) -> Vec<Item> {
        let mut state = self.state.lock().await;
        info!(limit = self.fetch_limit, "initial scan of newest items");
        self.dedup.reset_cache().await;
        self.scan_locked(&mut state, queue).await
    }

    async fn scan_locked(&self, state: &mut ScanState, queue: &QueueSender<Item>) -> Vec<Item> {
        if let Some(until) = state.rate_limited_until {
            if Instant::now() < until {
                debug!("scan skipped while rate limited");
                return Vec::new();
            }
            state.rate_limited_until = None;
        }

        let fetched = match self.source.fetch_newest(self.fetch_limit).await {
            Ok(items) => items,
            Err(SourceError::RateLimited { retry_after }) => {
                let wait = retry_after.unwrap_or(self.rate_limit_backoff);
                warn!(wait_secs = wait.as_secs(), "feed rate limited; pausing scans");
                state.rate_limited_until = Some(Instant::now() + wait);
                return Vec::new();
            }
            Err(err) => {
                warn!(error = %err, "fetching newest items failed");
                return Vec::new();
            }
        };

        let mut novel = Vec::new();
        for item in fetched {
            if !self.dedup.admit_item(&item).await {
                continue;
            }
            info!(
                item_id = %item.id,
                title = %item.title,
                preview = %preview(&item.body, 10),
                "new item detected"
            );
            if queue.push(item.clone()) {
                novel.push(item);
            }
        }
        if novel.is_empty() {
            info!("no new items found in this scan");
        }
        novel
    }
}
