use std::collections::HashSet;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use quill_core::domain::items::{GeneratedResponse, Item};
use quill_infra::db::{
    item_exists, recent_responses, store_response, upsert_item, DbPool, ItemMetadata, ItemRecord,
    ItemsRepoError,
};

/// Bounded set of observed ids. Reaching capacity clears the whole set; the
/// durable table stays authoritative, so a dropped entry only costs one more
/// lookup.
#[derive(Debug)]
pub struct PostCache {
    capacity: usize,
    ids: HashSet<String>,
}

impl PostCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashSet::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ids.contains(key)
    }

    pub fn insert(&mut self, key: String) {
        if self.ids.len() >= self.capacity {
            debug!(capacity = self.capacity, "post cache full, clearing");
            self.ids.clear();
        }
        self.ids.insert(key);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Item and reply ids live in separate namespaces of the same cache.
#[derive(Debug, Clone, Copy)]
pub enum SeenKey<'a> {
    Item(&'a str),
    Reply(&'a str),
}

impl SeenKey<'_> {
    fn cache_key(self) -> String {
        match self {
            SeenKey::Item(id) => format!("item:{id}"),
            SeenKey::Reply(id) => format!("reply:{id}"),
        }
    }
}

pub struct DedupStore {
    db: DbPool,
    subreddit: String,
    cache: Mutex<PostCache>,
}

impl DedupStore {
    pub fn new(db: DbPool, subreddit: impl Into<String>, capacity: usize) -> Self {
        Self {
            db,
            subreddit: subreddit.into(),
            cache: Mutex::new(PostCache::new(capacity)),
        }
    }

    pub async fn seen(&self, key: SeenKey<'_>) -> bool {
        self.cache.lock().await.contains(&key.cache_key())
    }

    pub async fn mark_seen(&self, key: SeenKey<'_>) {
        self.cache.lock().await.insert(key.cache_key());
    }

    pub async fn exists_durable(&self, item_id: &str) -> Result<bool, ItemsRepoError> {
        item_exists(&self.db, item_id).await
    }

    pub async fn persist(
        &self,
        item: &Item,
        response: Option<&GeneratedResponse>,
    ) -> Result<(), ItemsRepoError> {
        upsert_item(&self.db, &self.record(item, response)).await
    }

    /// Novelty decision for a fetched item: absent from the cache and absent
    /// from the durable table. A novel item is marked seen and persisted
    /// without a response. The cache lock is held for the whole decision so
    /// two callers cannot both admit the same id.
    pub async fn admit_item(&self, item: &Item) -> bool {
        let key = SeenKey::Item(item.id.as_str()).cache_key();
        let mut cache = self.cache.lock().await;
        if cache.contains(&key) {
            return false;
        }
        match self.exists_durable(item.id.as_str()).await {
            Ok(true) => {
                cache.insert(key);
                return false;
            }
            Ok(false) => {}
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "durable lookup failed; skipping item");
                return false;
            }
        }
        cache.insert(key);
        if let Err(err) = self.persist(item, None).await {
            warn!(item_id = %item.id, error = %err, "failed to persist new item");
        }
        true
    }

    /// Writes the first response for an item. `false` means one was already
    /// stored.
    pub async fn store_response(
        &self,
        item: &Item,
        response: &GeneratedResponse,
    ) -> Result<bool, ItemsRepoError> {
        store_response(&self.db, &self.record(item, Some(response))).await
    }

    pub async fn reset_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn recent_responses(&self, limit: i64) -> Result<Vec<ItemMetadata>, ItemsRepoError> {
        recent_responses(&self.db, limit).await
    }

    fn record(&self, item: &Item, response: Option<&GeneratedResponse>) -> ItemRecord {
        ItemRecord {
            item_id: item.id.as_str().to_string(),
            subreddit: self.subreddit.clone(),
            title: item.title.clone(),
            body: item.body.clone(),
            author: item.author.clone(),
            created_at: item.created_at,
            response: response.map(|response| response.text.clone()),
            response_at: response.map(|response| response.generated_at),
        }
    }
}

pub fn new_response(item: &Item, text: String) -> GeneratedResponse {
    GeneratedResponse {
        item_id: item.id.clone(),
        text,
        generated_at: Utc::now(),
    }
}
