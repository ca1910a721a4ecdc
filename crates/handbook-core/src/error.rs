use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to extract text from {path}: {reason}")]
    Extraction { path: String, reason: String },

    #[error("Chunking failed: {0}")]
    Chunking(String),

    #[error("Index build failed: {0}")]
    IndexBuild(String),

    #[error("Index load failed: {0}")]
    IndexLoad(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),
}

impl Error {
    /// True for failures a caller recovers from by rebuilding the index.
    pub fn is_index_load(&self) -> bool {
        matches!(self, Error::IndexLoad(_))
    }

    pub fn is_generation(&self) -> bool {
        matches!(self, Error::Generation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
