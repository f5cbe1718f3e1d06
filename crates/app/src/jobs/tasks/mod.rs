pub mod comment_dispatch;
pub mod post_queue;
pub mod post_scan;
pub mod reply_queue;
pub mod reply_scan;
