use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid content id: {0}")]
    InvalidContentId(String),
    #[error("invalid filter threshold: {0}")]
    InvalidThreshold(f64),
}
