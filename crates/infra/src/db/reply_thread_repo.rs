use sqlx::{Row, SqlitePool};
use thiserror::Error;

use quill_core::domain::comments::ReplyNode;

#[derive(Debug, Error)]
pub enum ReplyThreadRepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("invalid depth: {0}")]
    InvalidDepth(i64),
}

pub async fn upsert_reply(pool: &SqlitePool, node: &ReplyNode) -> Result<(), ReplyThreadRepoError> {
    sqlx::query(
        r#"
        INSERT INTO reply_thread (
            parent_comment_id,
            reply_id,
            reply_text,
            author,
            depth,
            response,
            response_id,
            processed,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (reply_id)
        DO UPDATE SET
            parent_comment_id = excluded.parent_comment_id,
            reply_text = excluded.reply_text,
            author = excluded.author,
            depth = excluded.depth,
            response = COALESCE(excluded.response, reply_thread.response),
            response_id = COALESCE(excluded.response_id, reply_thread.response_id),
            processed = MAX(excluded.processed, reply_thread.processed)
        "#,
    )
    .bind(&node.parent_comment_id)
    .bind(&node.reply_id)
    .bind(&node.text)
    .bind(&node.author)
    .bind(i64::from(node.depth))
    .bind(&node.response)
    .bind(&node.response_id)
    .bind(node.processed)
    .bind(node.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Depth of the thread at `comment_id`, either as a recorded reply or as the
/// bot's own answer to one.
pub async fn find_depth(
    pool: &SqlitePool,
    comment_id: &str,
) -> Result<Option<u32>, ReplyThreadRepoError> {
    let row = sqlx::query(
        r#"
        SELECT MAX(depth) AS depth
        FROM reply_thread
        WHERE reply_id = ? OR response_id = ?
        "#,
    )
    .bind(comment_id)
    .bind(comment_id)
    .fetch_one(pool)
    .await?;
    let depth: Option<i64> = row.try_get("depth")?;
    depth
        .map(|value| u32::try_from(value).map_err(|_| ReplyThreadRepoError::InvalidDepth(value)))
        .transpose()
}

pub async fn find_reply(
    pool: &SqlitePool,
    reply_id: &str,
) -> Result<Option<ReplyNode>, ReplyThreadRepoError> {
    let row = sqlx::query(
        r#"
        SELECT parent_comment_id,
               reply_id,
               reply_text,
               author,
               depth,
               response,
               response_id,
               processed,
               created_at
        FROM reply_thread
        WHERE reply_id = ?
        "#,
    )
    .bind(reply_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let depth: i64 = row.try_get("depth")?;
    Ok(Some(ReplyNode {
        parent_comment_id: row.try_get("parent_comment_id")?,
        reply_id: row.try_get("reply_id")?,
        text: row.try_get("reply_text")?,
        author: row.try_get("author")?,
        depth: u32::try_from(depth).map_err(|_| ReplyThreadRepoError::InvalidDepth(depth))?,
        response: row.try_get("response")?,
        response_id: row.try_get("response_id")?,
        processed: row.try_get("processed")?,
        created_at: row.try_get("created_at")?,
    }))
}

pub async fn count_processed_replies(pool: &SqlitePool) -> Result<i64, ReplyThreadRepoError> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM reply_thread
        WHERE processed = 1
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

    fn node(reply_id: &str, depth: u32) -> ReplyNode {
        ReplyNode {
            parent_comment_id: "c1".to_string(),
            reply_id: reply_id.to_string(),
            text: "what do you mean?".to_string(),
            author: "someone".to_string(),
            depth,
            response: None,
            response_id: None,
            processed: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unknown_comment_has_no_depth() {
        let pool = test_pool().await;
        assert_eq!(find_depth(&pool, "nope").await.unwrap(), None);
        assert!(find_reply(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bot_answer_inherits_reply_depth() {
        let pool = test_pool().await;
        upsert_reply(&pool, &node("r1", 2)).await.unwrap();
        assert!(!find_reply(&pool, "r1").await.unwrap().unwrap().processed);

        let mut delivered = node("r1", 2);
        delivered.response = Some("I mean this".to_string());
        delivered.response_id = Some("b1".to_string());
        delivered.processed = true;
        upsert_reply(&pool, &delivered).await.unwrap();

        assert!(find_reply(&pool, "r1").await.unwrap().unwrap().processed);
        assert_eq!(find_depth(&pool, "r1").await.unwrap(), Some(2));
        assert_eq!(find_depth(&pool, "b1").await.unwrap(), Some(2));
        assert_eq!(count_processed_replies(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn processed_flag_never_resets() {
        let pool = test_pool().await;
        let mut delivered = node("r1", 1);
        delivered.response = Some("answer".to_string());
        delivered.processed = true;
        upsert_reply(&pool, &delivered).await.unwrap();
        upsert_reply(&pool, &node("r1", 1)).await.unwrap();
        let stored = find_reply(&pool, "r1").await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.response.as_deref(), Some("answer"));
    }
}
