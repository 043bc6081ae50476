//! # Paper Retrieval
//!
//! Ingestion and semantic passage retrieval over a persistent vector index.
//!
//! ## Pipeline
//!
//! ```text
//! Document text
//!     │
//!     ├──> Chunker (sentence packing with overlap)
//!     │      └─> Passages
//!     │
//!     ├──> Embedder (batch, outside the index lock)
//!     │      └─> Normalized vectors
//!     │
//!     └──> FlatIndex + MetadataStore (write lock)
//!            └─> SnapshotStore.save
//!
//! Query ──> Embedder ──> FlatIndex.search ──> document filter ──> ranked passages
//!                                                                  └─> AnswerService
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use paper_retrieval::{RetrievalConfig, RetrievalService};
//!
//! #[tokio::main]
//! async fn main() -> paper_retrieval::Result<()> {
//!     let config = RetrievalConfig::default().with_env_overrides()?;
//!     let service = RetrievalService::open(&config).await?;
//!
//!     service.ingest("paper-42", "Extracted paper text ...").await?;
//!     for hit in service.search("attention mechanism", 5, Some("paper-42")).await? {
//!         println!("{:.3} {}", hit.score, hit.text);
//!     }
//!
//!     service.shutdown().await
//! }
//! ```

mod answer;
mod config;
mod error;
mod service;
mod status;

pub use answer::{
    render_sections, Answer, AnswerService, BoxError, ContextSections, KeywordExtractor,
    ScoredPassage,
};
pub use config::{RetrievalConfig, MODEL_DIR_ENV, STORAGE_DIR_ENV};
pub use error::{Result, RetrievalError};
pub use service::{IngestOutcome, RetrievalService, DEFAULT_ASK_TOP_K};
pub use status::StorageStats;
