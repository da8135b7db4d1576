use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedXmlError {
    #[error("failed to parse XML: {0}")]
    Parse(String),

    #[error("failed to serialize XML: {0}")]
    Write(String),
}
