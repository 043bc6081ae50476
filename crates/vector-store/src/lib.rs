//! # Paper Vector Store
//!
//! Embedding, exact inner-product search and durable snapshots for paper passages.
//!
//! ## Features
//!
//! - **Exact search** over L2-normalized vectors (inner product == cosine similarity)
//! - **Pluggable embeddings**: ONNX Runtime models or a deterministic hashing model
//! - **Append-only ids**: a vector id is its insertion position and is never reused
//! - **Atomic snapshots**: index, metadata and id counter are replaced as one unit
//!
//! ## Architecture
//!
//! ```text
//! Passage text[]
//!     │
//!     ├──> Embedder (ONNX / hashing)
//!     │      └─> Vector[D], L2-normalized
//!     │
//!     ├──> FlatIndex (row id == vector id)
//!     │      └─> Inner-product top-k
//!     │
//!     ├──> MetadataStore (vector id → Passage)
//!     │
//!     └──> SnapshotStore
//!            ├─> paper_index.bin
//!            ├─> metadata_store.json
//!            └─> current_vector_id.txt
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use paper_vector_store::{Embedder, FlatIndex, HashingEmbedder, MetadataStore, Passage};
//!
//! #[tokio::main]
//! async fn main() -> paper_vector_store::Result<()> {
//!     let embedder = HashingEmbedder::new(256);
//!     let mut index = FlatIndex::new(embedder.dimension());
//!     let mut metadata = MetadataStore::new();
//!
//!     let text = "Attention weights are computed with a softmax.".to_string();
//!     let vector = embedder.embed(&text).await?;
//!     let id = index.insert(&vector)?;
//!     metadata.put(id, Passage::new("paper-1", text));
//!
//!     let query = embedder.embed("softmax attention").await?;
//!     for (id, score) in index.search(&query, 5)? {
//!         println!("{id}: {score:.3}");
//!     }
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod flat_index;
mod metadata;
mod onnx;
mod snapshot;
mod types;

pub use embeddings::{
    Embedder, EmbedderConfig, EmbeddingMode, EmbeddingModel, HashingEmbedder, EMBEDDING_MODE_ENV,
};
pub use error::{Result, VectorStoreError};
pub use flat_index::FlatIndex;
pub use metadata::MetadataStore;
pub use snapshot::{
    FilePresence, LoadPolicy, LoadReport, LoadedSnapshot, SnapshotFileNames, SnapshotPaths,
    SnapshotStore,
};
pub use types::{Passage, VectorId};
