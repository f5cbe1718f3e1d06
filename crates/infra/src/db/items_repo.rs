use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use quill_core::text::preview;

#[derive(Debug, Error)]
pub enum ItemsRepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct ItemRecord {
    pub item_id: String,
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub response: Option<String>,
    pub response_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct ItemMetadata {
    pub item_id: String,
    pub title: String,
    pub response: String,
    pub response_at: DateTime<Utc>,
}

impl ItemMetadata {
    pub fn last_response_preview(&self, max_chars: usize) -> String {
        preview(&self.response, max_chars)
    }
}

/// Inserts or refreshes an item. A response already stored is kept.
pub async fn upsert_item(pool: &SqlitePool, record: &ItemRecord) -> Result<(), ItemsRepoError> {
    sqlx::query(
        r#"
        INSERT INTO items (
            item_id,
            subreddit,
            title,
            body,
            author,
            created_at,
            response,
            response_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (item_id)
        DO UPDATE SET
            subreddit = excluded.subreddit,
            title = excluded.title,
            body = excluded.body,
            author = excluded.author,
            created_at = excluded.created_at,
            response = COALESCE(items.response, excluded.response),
            response_at = COALESCE(items.response_at, excluded.response_at)
        "#,
    )
    .bind(&record.item_id)
    .bind(&record.subreddit)
    .bind(&record.title)
    .bind(&record.body)
    .bind(&record.author)
    .bind(record.created_at)
    .bind(&record.response)
    .bind(record.response_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Writes the generated response for an item. Returns `false` when the item
/// already carries a response; the first one wins.
pub async fn store_response(
    pool: &SqlitePool,
    record: &ItemRecord,
) -> Result<bool, ItemsRepoError> {
    let result = sqlx::query(
        r#"
        INSERT INTO items (
            item_id,
            subreddit,
            title,
            body,
            author,
            created_at,
            response,
            response_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (item_id)
        DO UPDATE SET
            response = excluded.response,
            response_at = excluded.response_at
        WHERE items.response IS NULL
        "#,
    )
    .bind(&record.item_id)
    .bind(&record.subreddit)
    .bind(&record.title)
    .bind(&record.body)
    .bind(&record.author)
    .bind(record.created_at)
    .bind(&record.response)
    .bind(record.response_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn item_exists(pool: &SqlitePool, item_id: &str) -> Result<bool, ItemsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT 1
        FROM items
        WHERE item_id = ?
        LIMIT 1
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn find_response(
    pool: &SqlitePool,
    item_id: &str,
) -> Result<Option<String>, ItemsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT response
        FROM items
        WHERE item_id = ?
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(row.try_get("response")?),
        None => Ok(None),
    }
}

pub async fn recent_responses(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<ItemMetadata>, ItemsRepoError> {
    let rows = sqlx::query(
        r#"
        SELECT item_id, title, response, response_at
        FROM items
        WHERE response IS NOT NULL
        ORDER BY response_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(ItemMetadata {
            item_id: row.try_get("item_id")?,
            title: row.try_get("title")?,
            response: row.try_get("response")?,
            response_at: row.try_get("response_at")?,
        });
    }
    Ok(items)
}

pub async fn count_items(pool: &SqlitePool) -> Result<i64, ItemsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM items
        "#,
    )
    .fetch_one(pool)
    .await?;
    let count: i64 = row.try_get("count")?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::test_pool;

    fn record(item_id: &str, response: Option<&str>) -> ItemRecord {
        ItemRecord {
            item_id: item_id.to_string(),
            subreddit: "test".to_string(),
            title: "title".to_string(),
            body: "body".to_string(),
            author: "author".to_string(),
            created_at: Utc::now(),
            response: response.map(str::to_string),
            response_at: response.map(|_| Utc::now()),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_existing_response() {
        let pool = test_pool().await;
        upsert_item(&pool, &record("a1", Some("first"))).await.unwrap();
        upsert_item(&pool, &record("a1", None)).await.unwrap();
        assert!(item_exists(&pool, "a1").await.unwrap());
        assert_eq!(find_response(&pool, "a1").await.unwrap().as_deref(), Some("first"));
        assert_eq!(count_items(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_response_is_written_once() {
        let pool = test_pool().await;
        upsert_item(&pool, &record("a1", None)).await.unwrap();
        assert!(store_response(&pool, &record("a1", Some("first"))).await.unwrap());
        assert!(!store_response(&pool, &record("a1", Some("second"))).await.unwrap());
        assert_eq!(find_response(&pool, "a1").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn store_response_inserts_missing_item() {
        let pool = test_pool().await;
        assert!(store_response(&pool, &record("b2", Some("text"))).await.unwrap());
        assert!(item_exists(&pool, "b2").await.unwrap());
    }

    #[tokio::test]
    async fn recent_responses_skip_unanswered_items() {
        let pool = test_pool().await;
        upsert_item(&pool, &record("a1", None)).await.unwrap();
        upsert_item(&pool, &record("b2", Some("answered"))).await.unwrap();
        let recent = recent_responses(&pool, 5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].item_id, "b2");
    }

    #[test]
    fn preview_truncates_long_responses() {
        let meta = ItemMetadata {
            item_id: "a1".to_string(),
            title: "t".to_string(),
            response: "abcdefgh".to_string(),
            response_at: Utc::now(),
        };
        assert_eq!(meta.last_response_preview(3), "abc...");
        assert_eq!(meta.last_response_preview(20), "abcdefgh");
    }
}
