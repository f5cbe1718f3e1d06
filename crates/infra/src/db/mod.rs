pub mod items_repo;
pub mod migrations;
pub mod pool;
pub mod posted_comments_repo;
pub mod reply_thread_repo;

pub use items_repo::{
    count_items, find_response, item_exists, recent_responses, store_response, upsert_item,
    ItemMetadata, ItemRecord, ItemsRepoError,
};
pub use migrations::run_migrations;
pub use pool::{connect, connect_in_memory, DbPool, DbPoolError};
pub use posted_comments_repo::{
    count_posted_comments, has_any_comment, has_commented, insert_posted_comment,
    PostedCommentsRepoError,
};
pub use reply_thread_repo::{
    count_processed_replies, find_depth, find_reply, upsert_reply,
    ReplyThreadRepoError,
};

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let pool = connect_in_memory().await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
