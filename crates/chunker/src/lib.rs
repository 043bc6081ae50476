//! # Paper Chunker
//!
//! Sentence-aware chunking of extracted paper text for embedding and retrieval.
//!
//! ## Philosophy
//!
//! Chunks are built from whole sentences so that:
//! - No sentence is ever cut mid-way (an oversized sentence becomes its own chunk)
//! - Consecutive chunks share trailing sentences to keep context across boundaries
//! - Fragments too short to carry meaning are filtered out
//!
//! ## Pipeline
//!
//! ```text
//! Page text
//!     │
//!     ├──> Normalization
//!     │    ├─> Drop bare page-number lines
//!     │    └─> Collapse whitespace
//!     │
//!     ├──> Sentence split on `.`, `!`, `?` + whitespace
//!     │
//!     └──> Greedy packing
//!          ├─> Close chunk when `chunk_size` would be exceeded
//!          ├─> Seed next chunk with the last `overlap_sentences`
//!          └─> Drop chunks of `min_chunk_chars` or less
//! ```
//!
//! ## Example
//!
//! ```rust
//! use paper_chunker::{Chunker, ChunkerConfig};
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let text = "Transformers replaced recurrence with attention. ".repeat(80);
//!
//! for chunk in chunker.chunk(&text) {
//!     println!("{} chars", chunk.chars().count());
//! }
//! ```

mod chunker;
mod config;
mod error;
mod text;

pub use chunker::{chunk, Chunker};
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use text::{join_pages, normalize_text, split_sentences, MIN_PAGE_CHARS};
