use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::conversation::ConversationTracker;
use crate::dedup::DedupStore;
use crate::dispatch::CommentDispatcher;
use crate::generator::ResponseGenerator;
use crate::scanner::Scanner;
use crate::state::{AppState, LoopHealth, QueueGauges};
use quill_core::domain::filter::ContentFilter;
use quill_core::domain::source::ContentSource;
use quill_core::error::CoreError;
use quill_infra::db::{connect, DbPoolError};
use quill_infra::llm::build_provider;
use quill_infra::reddit::RedditClient;

const REDDIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("db error: {0}")]
    Db(#[from] DbPoolError),
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("content filter error: {0}")]
    Filter(#[from] CoreError),
}

pub async fn build_state(config: AppConfig, persona: String) -> Result<AppState, WiringError> {
    let db = connect(&config.database_url).await?;
    let http = Client::builder().timeout(REDDIT_TIMEOUT).build()?;
    let source: Arc<dyn ContentSource> = Arc::new(RedditClient::new(
        http,
        config.reddit.clone(),
        config.subreddit.clone(),
    ));

    let service = match build_provider(&config.llm) {
        Ok(service) => {
            info!(provider = service.name(), model = %config.llm.model, "generation service ready");
            Some(service)
        }
        Err(err) => {
            warn!(error = %err, "generation service unavailable; items will be skipped");
            None
        }
    };
    let filter = ContentFilter::new(&config.filter_terms, config.filter_threshold)?;

    let dedup = Arc::new(DedupStore::new(
        db.clone(),
        config.subreddit.clone(),
        config.cache_size,
    ));
    let scanner = Scanner::new(
        source.clone(),
        dedup.clone(),
        config.fetch_limit,
        config.rate_limit_backoff,
    );
    let generator = ResponseGenerator::new(service, filter, persona, db.clone(), dedup.clone());
    let dispatcher = CommentDispatcher::new(
        source.clone(),
        db.clone(),
        config.min_post_interval,
        config.rate_limit_backoff,
    );
    let tracker = ConversationTracker::new(db.clone(), config.max_conversation_depth);

    Ok(AppState {
        config: Arc::new(config),
        db,
        source,
        dedup,
        scanner: Arc::new(scanner),
        generator: Arc::new(generator),
        dispatcher: Arc::new(dispatcher),
        tracker: Arc::new(tracker),
        queues: QueueGauges::default(),
        loop_health: Arc::new(Mutex::new(LoopHealth::default())),
    })
}
