use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dedup::{new_response, DedupStore};
use quill_core::domain::filter::ContentFilter;
use quill_core::domain::generation::GenerationService;
use quill_core::domain::items::{GeneratedResponse, Item};
use quill_core::text::preview;
use quill_infra::db::{has_commented, DbPool};

/// Generated text containing any of these is dropped instead of delivered.
pub const DISALLOWED_MARKERS: &[&str] = &["discrimination", "discriminatory"];

const LOG_PREVIEW_CHARS: usize = 100;

pub struct ResponseGenerator {
    service: Option<Arc<dyn GenerationService>>,
    filter: ContentFilter,
    persona: String,
    db: DbPool,
    dedup: Arc<DedupStore>,
}

impl ResponseGenerator {
    pub fn new(
        service: Option<Arc<dyn GenerationService>>,
        filter: ContentFilter,
        persona: String,
        db: DbPool,
        dedup: Arc<DedupStore>,
    ) -> Self {
        Self {
            service,
            filter,
            persona,
            db,
            dedup,
        }
    }

    pub fn is_available(&self) -> bool {
        self.service.is_some()
    }

    /// Response for a top-level item, persisted before it is returned.
    pub async fn generate(&self, item: &Item) -> Option<GeneratedResponse> {
        match has_commented(&self.db, item.id.as_str()).await {
            Ok(false) => {}
            Ok(true) => {
                debug!(item_id = %item.id, "already commented; skipping generation");
                return None;
            }
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "posted comment lookup failed; skipping item");
                return None;
            }
        }
        let Some(service) = self.service.as_ref() else {
            warn!(item_id = %item.id, "generation service unavailable; skipping item");
            return None;
        };

        let text = match self.filter.should_short_circuit(item) {
            Some(deflection) => {
                info!(item_id = %item.id, "content filter short-circuited generation");
                deflection
            }
            None => {
                let prompt = self.item_prompt(item);
                self.run(service.as_ref(), &prompt).await?
            }
        };

        let response = new_response(item, text);
        match self.dedup.store_response(item, &response).await {
            Ok(true) => Some(response),
            Ok(false) => {
                info!(item_id = %item.id, "response already stored; dropping duplicate");
                None
            }
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "failed to persist response");
                None
            }
        }
    }

    /// Response to a reply sitting at `depth` in its thread. Recording it is
    /// left to the conversation tracker.
    pub async fn generate_reply(&self, text: &str, depth: u32) -> Option<String> {
        let Some(service) = self.service.as_ref() else {
            warn!(depth, "generation service unavailable; skipping reply");
            return None;
        };
        if let Some(deflection) = self.filter.check_text(text) {
            info!(depth, "content filter short-circuited reply generation");
            return Some(deflection);
        }
        let prompt = self.reply_prompt(text, depth);
        self.run(service.as_ref(), &prompt).await
    }

    pub async fn close(&self) {
        if let Some(service) = self.service.as_ref() {
            service.close().await;
        }
    }

    async fn run(&self, service: &dyn GenerationService, prompt: &str) -> Option<String> {
        info!(
            provider = service.name(),
            prompt = %preview(prompt, LOG_PREVIEW_CHARS),
            "sending prompt"
        );
        debug!(prompt, "full prompt");
        let text = match service.generate(prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                warn!(provider = service.name(), error = %err, "generation failed");
                return None;
            }
        };
        info!(response = %preview(&text, LOG_PREVIEW_CHARS), "received response");
        debug!(response = %text, "full response");
        if text.is_empty() {
            warn!("generation returned empty text");
            return None;
        }
        if contains_disallowed(&text) {
            warn!("generated text failed the safety check; dropping it");
            return None;
        }
        Some(text)
    }

    fn item_prompt(&self, item: &Item) -> String {
        let mut prompt = format!(
            "{}\n\nWrite a short comment replying to this post.\n\nTitle: {}\n",
            self.persona.trim_end(),
            item.title
        );
        if !item.body.trim().is_empty() {
            prompt.push_str(&format!("Body: {}\n", item.body));
        }
        prompt.push_str("\nComment:");
        prompt
    }

    fn reply_prompt(&self, text: &str, depth: u32) -> String {
        format!(
            "{}\n\nSomeone replied to your comment. This is message {} of the conversation; \
keep the answer brief and natural.\n\nReply: {}\n\nYour answer:",
            self.persona.trim_end(),
            depth,
            text
        )
    }
}

pub fn contains_disallowed(text: &str) -> bool {
    let lowered = text.to_lowercase();
    DISALLOWED_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::{contains_disallowed, ResponseGenerator};
    use crate::dedup::DedupStore;
    use crate::testing::{item, test_pool, FakeGenerator};
    use quill_core::domain::filter::{ContentFilter, DEFAULT_DEFLECTION};
    use quill_core::domain::generation::GenerationService;
    use quill_infra::db::{find_response, insert_posted_comment, DbPool};

    async fn generator(
        pool: DbPool,
        service: Option<Arc<FakeGenerator>>,
    ) -> ResponseGenerator {
        let dedup = Arc::new(DedupStore::new(pool.clone(), "test", 100));
        let service = service.map(|service| service as Arc<dyn GenerationService>);
        ResponseGenerator::new(
            service,
            ContentFilter::default(),
            "persona".to_string(),
            pool,
            dedup,
        )
    }

    #[test]
    fn disallowed_markers_match_case_insensitively() {
        assert!(contains_disallowed("That is Discrimination, plain and simple"));
        assert!(!contains_disallowed("What a lovely garden"));
    }

    #[tokio::test]
    async fn response_is_persisted_once() {
        let pool = test_pool().await;
        let service = Arc::new(FakeGenerator::answering("Nice photo!"));
        let generator = generator(pool.clone(), Some(service.clone())).await;
        let post = item("a1", "My cat", "look at him");

        let response = generator.generate(&post).await.unwrap();
        assert_eq!(response.text, "Nice photo!");
        assert_eq!(find_response(&pool, "a1").await.unwrap().as_deref(), Some("Nice photo!"));
        assert!(service.prompts()[0].contains("My cat"));

        assert!(generator.generate(&post).await.is_none());
    }

    #[tokio::test]
    async fn existing_comment_skips_generation() {
        let pool = test_pool().await;
        insert_posted_comment(&pool, "a1", "c1", "hi", Utc::now()).await.unwrap();
        let service = Arc::new(FakeGenerator::answering("hello"));
        let generator = generator(pool, Some(service.clone())).await;
        assert!(generator.generate(&item("a1", "t", "b")).await.is_none());
        assert!(service.prompts().is_empty());
    }

    #[tokio::test]
    async fn missing_service_yields_none() {
        let generator = generator(test_pool().await, None).await;
        assert!(generator.generate(&item("a1", "t", "b")).await.is_none());
        assert!(generator.generate_reply("hi", 1).await.is_none());
    }

    #[tokio::test]
    async fn filtered_item_gets_deflection_without_calling_service() {
        let service = Arc::new(FakeGenerator::answering("unused"));
        let generator = generator(test_pool().await, Some(service.clone())).await;
        let post = item("p1", "election politics", "vote now");
        let response = generator.generate(&post).await.unwrap();
        assert_eq!(response.text, DEFAULT_DEFLECTION);
        assert!(service.prompts().is_empty());
    }

    #[tokio::test]
    async fn unsafe_or_failed_generation_is_dropped() {
        let pool = test_pool().await;
        let service = Arc::new(FakeGenerator::answering("this is discrimination"));
        let unsafe_text = generator(pool.clone(), Some(service)).await;
        assert!(unsafe_text.generate(&item("a1", "t", "b")).await.is_none());
        assert_eq!(find_response(&pool, "a1").await.unwrap(), None);

        let failing = Arc::new(FakeGenerator::failing());
        let offline = generator(test_pool().await, Some(failing)).await;
        assert!(offline.generate(&item("b2", "t", "b")).await.is_none());
    }

    #[tokio::test]
    async fn reply_prompt_carries_depth() {
        let service = Arc::new(FakeGenerator::answering("glad you asked"));
        let generator = generator(test_pool().await, Some(service.clone())).await;
        let answer = generator.generate_reply("why though?", 3).await;
        assert_eq!(answer.as_deref(), Some("glad you asked"));
        let prompts = service.prompts();
        assert!(prompts[0].contains("message 3"));
        assert!(prompts[0].contains("why though?"));
    }
}
