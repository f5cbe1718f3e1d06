pub mod comments;
pub mod filter;
pub mod generation;
pub mod items;
pub mod source;
