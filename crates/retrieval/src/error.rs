use paper_vector_store::VectorStoreError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("No content extracted from document '{0}'")]
    NoContentExtracted(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("Corrupt snapshot {}: {reason}", path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Empty query")]
    EmptyQuery,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Answer service failed: {0}")]
    AnswerFailure(String),

    #[error("Keyword extraction failed: {0}")]
    KeywordFailure(String),

    #[error("Vector store error: {0}")]
    Store(VectorStoreError),
}

impl From<VectorStoreError> for RetrievalError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::EmbeddingError(msg) => Self::EmbeddingFailure(msg),
            VectorStoreError::PersistenceError(msg) => Self::PersistenceFailure(msg),
            VectorStoreError::IndexCorrupt { path, reason } => Self::IndexCorrupt { path, reason },
            other => Self::Store(other),
        }
    }
}

impl From<paper_chunker::ChunkerError> for RetrievalError {
    fn from(err: paper_chunker::ChunkerError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
