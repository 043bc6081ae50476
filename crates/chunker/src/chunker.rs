use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::text::{join_pages, normalize_text, split_sentences};

/// Main chunker interface for extracted paper text
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker, rejecting invalid configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk already-concatenated document text
    #[must_use]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Vec::new();
        }

        let sentences = split_sentences(&normalized);
        let packed = pack_sentences(
            &sentences,
            self.config.chunk_size,
            self.config.overlap_sentences,
        );
        let total = packed.len();

        let chunks: Vec<String> = packed
            .into_iter()
            .filter(|chunk| chunk.trim().chars().count() > self.config.min_chunk_chars)
            .collect();

        log::debug!(
            "Chunked {} sentences into {} chunks ({} too short)",
            sentences.len(),
            chunks.len(),
            total - chunks.len()
        );
        chunks
    }

    /// Chunk per-page text, skipping near-empty pages
    #[must_use]
    pub fn chunk_pages<S: AsRef<str>>(&self, pages: &[S]) -> Vec<String> {
        self.chunk(&join_pages(pages))
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            config: ChunkerConfig::default(),
        }
    }
}

/// Chunk `text` with the default short-chunk filter.
///
/// Unlike [`Chunker::new`] this never fails: a zero `chunk_size` packs every
/// sentence into its own chunk.
#[must_use]
pub fn chunk(text: &str, chunk_size: usize, overlap_sentences: usize) -> Vec<String> {
    let chunker = Chunker {
        config: ChunkerConfig {
            chunk_size,
            overlap_sentences,
            ..ChunkerConfig::default()
        },
    };
    chunker.chunk(text)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Length of `sentences` joined by single spaces.
fn joined_len(sentences: &[&str]) -> usize {
    if sentences.is_empty() {
        return 0;
    }
    sentences.iter().map(|s| char_len(s)).sum::<usize>() + sentences.len() - 1
}

fn pack_sentences(sentences: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for &sentence in sentences {
        let sentence_len = char_len(sentence);

        if !current.is_empty() && current_len + 1 + sentence_len > chunk_size {
            chunks.push(current.join(" ").trim().to_string());

            let keep = overlap.min(current.len());
            current.drain(..current.len() - keep);
            current_len = joined_len(&current);

            // The seed must leave room for the sentence that forced the split,
            // otherwise the same chunk would be emitted again.
            while !current.is_empty() && current_len + 1 + sentence_len > chunk_size {
                current.remove(0);
                current_len = joined_len(&current);
            }
        }

        current_len = if current.is_empty() {
            sentence_len
        } else {
            current_len + 1 + sentence_len
        };
        current.push(sentence);
    }

    if !current.is_empty() {
        let last = current.join(" ").trim().to_string();
        if !last.is_empty() {
            chunks.push(last);
        }
    }

    chunks
}
