use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostedCommentsRepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Records a delivered comment. Returns `false` when either the comment id or
/// the item already has a record.
pub async fn insert_posted_comment(
    pool: &SqlitePool,
    item_id: &str,
    comment_id: &str,
    comment_text: &str,
    posted_at: DateTime<Utc>,
) -> Result<bool, PostedCommentsRepoError> {
    let result = sqlx::query(
        r#"
        INSERT INTO posted_comments (item_id, comment_id, comment_text, posted_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(item_id)
    .bind(comment_id)
    .bind(comment_text)
    .bind(posted_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn has_commented(
    pool: &SqlitePool,
    item_id: &str,
) -> Result<bool, PostedCommentsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT 1
        FROM posted_comments
        WHERE item_id = ?
        LIMIT 1
        "#,
    )
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn has_any_comment(pool: &SqlitePool) -> Result<bool, PostedCommentsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT 1
        FROM posted_comments
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn count_posted_comments(pool: &SqlitePool) -> Result<i64, PostedCommentsRepoError> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM posted_comments
        "#,
    )
    .fetch_one(pool)
    .await?;
    let count: i64 = row.try_get("count")?;
    Ok(count)
}
