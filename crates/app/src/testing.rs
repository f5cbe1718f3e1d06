use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::conversation::ConversationTracker;
use crate::dedup::DedupStore;
use crate::dispatch::CommentDispatcher;
use crate::generator::ResponseGenerator;
use crate::scanner::Scanner;
use crate::state::{AppState, LoopHealth, QueueGauges};
use quill_core::domain::comments::{OwnComment, Reply};
use quill_core::domain::filter::ContentFilter;
use quill_core::domain::generation::{GenerationError, GenerationService};
use quill_core::domain::items::Item;
use quill_core::domain::source::{ContentSource, SourceError};
use quill_core::types::content_id::ContentId;
use quill_infra::db::{connect_in_memory, run_migrations, DbPool};

pub const ACCOUNT: &str = "quill_bot";

pub async fn test_pool() -> DbPool {
    let pool = connect_in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

pub fn item(id: &str, title: &str, body: &str) -> Item {
    Item {
        id: ContentId::try_from(id).unwrap(),
        title: title.to_string(),
        body: body.to_string(),
        author: "poster".to_string(),
        created_at: Utc::now(),
    }
}

pub fn reply(id: &str, parent_id: &str, author: &str, body: &str) -> Reply {
    Reply {
        id: id.to_string(),
        parent_id: parent_id.to_string(),
        author: author.to_string(),
        body: body.to_string(),
        created_at: Utc::now(),
    }
}

pub fn test_config(overrides: &[(&'static str, &'static str)]) -> AppConfig {
    let mut vars = HashMap::from([
        ("CLIENT_ID", "id"),
        ("CLIENT_SECRET", "secret"),
        ("USERNAME", ACCOUNT),
        ("PASSWORD", "hunter2"),
        ("USER_AGENT", "quill-tests/0.1"),
        ("MIN_POST_INTERVAL", "0"),
        ("REPLY_DELAY_MIN", "0"),
        ("REPLY_DELAY_MAX", "0"),
    ]);
    vars.extend(overrides.iter().copied());
    AppConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string())).unwrap()
}

pub async fn test_state(
    config: AppConfig,
    source: Arc<FakeSource>,
    service: Option<Arc<FakeGenerator>>,
) -> AppState {
    let db = test_pool().await;
    let source: Arc<dyn ContentSource> = source;
    let service = service.map(|service| service as Arc<dyn GenerationService>);
    let dedup = Arc::new(DedupStore::new(
        db.clone(),
        config.subreddit.clone(),
        config.cache_size,
    ));
    let filter = ContentFilter::new(&config.filter_terms, config.filter_threshold).unwrap();
    AppState {
        scanner: Arc::new(Scanner::new(
            source.clone(),
            dedup.clone(),
            config.fetch_limit,
            config.rate_limit_backoff,
        )),
        generator: Arc::new(ResponseGenerator::new(
            service,
            filter,
            "persona".to_string(),
            db.clone(),
            dedup.clone(),
        )),
        dispatcher: Arc::new(CommentDispatcher::new(
            source.clone(),
            db.clone(),
            config.min_post_interval,
            config.rate_limit_backoff,
        )),
        tracker: Arc::new(ConversationTracker::new(
            db.clone(),
            config.max_conversation_depth,
        )),
        dedup,
        source,
        db,
        config: Arc::new(config),
        queues: QueueGauges::default(),
        loop_health: Arc::new(AsyncMutex::new(LoopHealth::default())),
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: String,
    pub text: String,
    pub id: String,
    pub at: Instant,
}

#[derive(Default)]
struct SourceInner {
    items: Vec<Item>,
    own_comments: Vec<OwnComment>,
    replies: HashMap<String, Vec<Reply>>,
    fetch_errors: VecDeque<SourceError>,
    post_errors: VecDeque<SourceError>,
    fetch_calls: usize,
    deliveries: Vec<Delivery>,
}

#[derive(Default)]
pub struct FakeSource {
    inner: Mutex<SourceInner>,
}

impl FakeSource {
    pub fn with_items(items: Vec<Item>) -> Self {
        let source = Self::default();
        source.inner.lock().unwrap().items = items;
        source
    }

    pub fn add_own_comment(&self, id: &str, item_id: &str) {
        self.inner.lock().unwrap().own_comments.push(OwnComment {
            id: id.to_string(),
            item_id: item_id.to_string(),
            body: "my comment".to_string(),
            created_at: Utc::now(),
        });
    }

    pub fn add_reply(&self, reply: Reply) {
        self.inner
            .lock()
            .unwrap()
            .replies
            .entry(reply.parent_id.clone())
            .or_default()
            .push(reply);
    }

    pub fn fail_fetch(&self, err: SourceError) {
        self.inner.lock().unwrap().fetch_errors.push_back(err);
    }

    pub fn fail_post(&self, err: SourceError) {
        self.inner.lock().unwrap().post_errors.push_back(err);
    }

    pub fn fetch_calls(&self) -> usize {
        self.inner.lock().unwrap().fetch_calls
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.inner.lock().unwrap().deliveries.clone()
    }

    pub fn delivery_times(&self) -> Vec<Instant> {
        self.deliveries().into_iter().map(|delivery| delivery.at).collect()
    }

    fn deliver(&self, target: &str, text: &str) -> Result<String, SourceError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.post_errors.pop_front() {
            return Err(err);
        }
        let id = format!("posted{}", inner.deliveries.len() + 1);
        inner.deliveries.push(Delivery {
            target: target.to_string(),
            text: text.to_string(),
            id: id.clone(),
            at: Instant::now(),
        });
        Ok(id)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    fn account_name(&self) -> &str {
        ACCOUNT
    }

    async fn fetch_newest(&self, limit: usize) -> Result<Vec<Item>, SourceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.fetch_calls += 1;
        if let Some(err) = inner.fetch_errors.pop_front() {
            return Err(err);
        }
        Ok(inner.items.iter().take(limit).cloned().collect())
    }

    async fn fetch_own_comments(&self, limit: usize) -> Result<Vec<OwnComment>, SourceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.own_comments.iter().take(limit).cloned().collect())
    }

    async fn fetch_replies(&self, comment_id: &str) -> Result<Vec<Reply>, SourceError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.replies.get(comment_id).cloned().unwrap_or_default())
    }

    async fn post_comment(&self, item_id: &ContentId, text: &str) -> Result<String, SourceError> {
        self.deliver(item_id.as_str(), text)
    }

    async fn post_reply(&self, comment_id: &str, text: &str) -> Result<String, SourceError> {
        self.deliver(comment_id, text)
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String, GenerationError> + Send + Sync>;

pub struct FakeGenerator {
    respond: Responder,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn with<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(text: &'static str) -> Self {
        Self::with(move |_| Ok(text.to_string()))
    }

    pub fn failing() -> Self {
        Self::with(|_| Err(GenerationError::ServiceUnavailable("offline".to_string())))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for FakeGenerator {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.respond)(prompt)
    }
}
