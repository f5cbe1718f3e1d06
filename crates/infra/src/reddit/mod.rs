pub mod client;

pub use client::{RedditClient, RedditCredentials, RedditError};
