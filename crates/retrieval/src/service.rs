use crate::answer::{Answer, AnswerService, KeywordExtractor, ScoredPassage};
use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::status::StorageStats;
use paper_chunker::{join_pages, Chunker};
use paper_vector_store::{
    Embedder, EmbeddingModel, FlatIndex, MetadataStore, Passage, SnapshotStore, VectorId,
    VectorStoreError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Number of sections handed to the answer service when the caller has no preference.
pub const DEFAULT_ASK_TOP_K: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The document already has passages; nothing was changed.
    AlreadyIngested,
    Ingested {
        chunks_added: usize,
        /// False when the snapshot could not be written; memory is ahead of disk.
        persisted: bool,
    },
}

struct IndexState {
    index: FlatIndex,
    metadata: MetadataStore,
    next_id: VectorId,
    dirty: bool,
}

impl IndexState {
    fn append(
        &mut self,
        document_id: &str,
        chunks: Vec<String>,
        vectors: &[Vec<f32>],
    ) -> paper_vector_store::Result<()> {
        for (text, vector) in chunks.into_iter().zip(vectors) {
            let id = self.index.insert(vector)?;
            self.metadata.put(id, Passage::new(document_id, text));
            self.next_id = id + 1;
        }
        Ok(())
    }

    fn rollback(&mut self, len: usize) {
        self.index.truncate(len);
        self.metadata.truncate_from(len as VectorId);
        self.next_id = len as VectorId;
    }

    fn resolve(&self, id: VectorId, score: f32) -> Option<ScoredPassage> {
        let passage = self.metadata.get(id)?;
        Some(ScoredPassage {
            vector_id: id,
            document_id: passage.document_id.clone(),
            text: passage.text.clone(),
            score,
        })
    }
}

/// Ingests documents and answers similarity queries over their passages.
///
/// One value owns the index; share it behind an `Arc`. Searches run
/// concurrently under a read lock, ingestion and removal take the write lock.
pub struct RetrievalService {
    state: RwLock<IndexState>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    snapshots: SnapshotStore,
    recovered_on_load: Vec<String>,
}

impl RetrievalService {
    /// Build the configured embedding model and open the storage directory.
    pub async fn open(config: &RetrievalConfig) -> Result<Self> {
        let embedder = EmbeddingModel::from_config(&config.embedder)?;
        Self::init(config, Arc::new(embedder)).await
    }

    /// Load any existing snapshot; the service is usable only once this returns.
    pub async fn init(config: &RetrievalConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        let chunker = Chunker::new(config.chunker.clone())?;

        tokio::fs::create_dir_all(&config.storage_dir)
            .await
            .map_err(|e| {
                RetrievalError::PersistenceFailure(format!(
                    "create {}: {e}",
                    config.storage_dir.display()
                ))
            })?;

        let snapshots = SnapshotStore::new(config.snapshot_paths());
        let loaded = snapshots
            .load(embedder.dimension(), config.load_policy)
            .await?;

        log::info!(
            "Retrieval service ready: {} vectors from {} documents (model {}, dim {})",
            loaded.index.count(),
            loaded.metadata.document_ids().len(),
            embedder.model_id(),
            embedder.dimension()
        );
        if !loaded.report.recovered.is_empty() {
            log::warn!(
                "Snapshot load recovered from {} problem(s); see status for details",
                loaded.report.recovered.len()
            );
        }

        Ok(Self {
            state: RwLock::new(IndexState {
                index: loaded.index,
                metadata: loaded.metadata,
                next_id: loaded.next_id,
                dirty: false,
            }),
            embedder,
            chunker,
            snapshots,
            recovered_on_load: loaded.report.recovered,
        })
    }

    /// Save pending changes, if any.
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.dirty {
            return Ok(());
        }
        self.snapshots
            .save(&state.index, &state.metadata, state.next_id)
            .await?;
        state.dirty = false;
        log::info!("Pending changes saved on shutdown");
        Ok(())
    }

    pub async fn contains_document(&self, document_id: &str) -> bool {
        self.state
            .read()
            .await
            .metadata
            .contains_document(document_id)
    }

    pub async fn documents(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .metadata
            .document_ids()
            .into_iter()
            .collect()
    }

    /// Chunk, embed and index a document's text, then persist the snapshot.
    pub async fn ingest(&self, document_id: &str, raw_text: &str) -> Result<IngestOutcome> {
        if self.contains_document(document_id).await {
            log::info!("Document '{document_id}' already ingested, skipping");
            return Ok(IngestOutcome::AlreadyIngested);
        }

        let started = Instant::now();
        let chunks = self.chunker.chunk(raw_text);
        if chunks.is_empty() {
            return Err(RetrievalError::NoContentExtracted(document_id.to_string()));
        }

        let vectors = self
            .embedder
            .embed_batch(&chunks)
            .await
            .map_err(embedding_failure)?;
        if vectors.len() != chunks.len() {
            return Err(RetrievalError::EmbeddingFailure(format!(
                "embedder returned {} vectors for {} passages",
                vectors.len(),
                chunks.len()
            )));
        }

        let mut state = self.state.write().await;
        if state.metadata.contains_document(document_id) {
            log::info!("Document '{document_id}' was ingested concurrently, skipping");
            return Ok(IngestOutcome::AlreadyIngested);
        }

        let dimension = state.index.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(embedding_failure(VectorStoreError::InvalidDimension {
                expected: dimension,
                actual: bad.len(),
            }));
        }

        let chunks_added = chunks.len();
        let base = state.index.count();
        if let Err(err) = state.append(document_id, chunks, &vectors) {
            state.rollback(base);
            return Err(err.into());
        }

        let saved = self
            .snapshots
            .save(&state.index, &state.metadata, state.next_id)
            .await;
        let persisted = match saved {
            Ok(()) => {
                state.dirty = false;
                true
            }
            Err(err) => {
                log::error!("Indexed '{document_id}' but failed to persist snapshot: {err}");
                state.dirty = true;
                false
            }
        };

        log::info!(
            "Ingested '{document_id}': {chunks_added} passages in {} ms",
            started.elapsed().as_millis()
        );
        Ok(IngestOutcome::Ingested {
            chunks_added,
            persisted,
        })
    }

    /// Ingest per-page text, skipping near-empty pages.
    pub async fn ingest_pages<S: AsRef<str>>(
        &self,
        document_id: &str,
        pages: &[S],
    ) -> Result<IngestOutcome> {
        let text = join_pages(pages);
        self.ingest(document_id, &text).await
    }

    /// Best `top_k` passages for `query`, optionally restricted to one document.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ScoredPassage>> {
        if top_k == 0 || self.state.read().await.index.is_empty() {
            return Ok(Vec::new());
        }
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(embedding_failure)?;

        let state = self.state.read().await;
        let mut results: Vec<ScoredPassage> = match document_id {
            None => state
                .index
                .search(&vector, top_k)?
                .into_iter()
                .filter_map(|(id, score)| state.resolve(id, score))
                .collect(),
            Some(wanted) => {
                // The filter is applied after ranking, so rank everything.
                let mut matched = Vec::with_capacity(top_k);
                for (id, score) in state.index.search(&vector, state.index.count())? {
                    let Some(passage) = state.resolve(id, score) else {
                        continue;
                    };
                    if passage.document_id == wanted {
                        matched.push(passage);
                        if matched.len() >= top_k {
                            break;
                        }
                    }
                }
                matched
            }
        };
        drop(state);

        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.vector_id.cmp(&b.vector_id))
        });
        results.truncate(top_k);

        log::debug!(
            "Query '{query}' (document {document_id:?}) returned {} passages",
            results.len()
        );
        Ok(results)
    }

    /// Retrieve context for `query` and pass it to `answerer`.
    pub async fn ask(
        &self,
        query: &str,
        top_k: usize,
        document_id: Option<&str>,
        answerer: &dyn AnswerService,
    ) -> Result<Answer> {
        let sections = self.search(query, top_k, document_id).await?;
        let answer = answerer
            .answer(query, &sections)
            .await
            .map_err(|e| RetrievalError::AnswerFailure(e.to_string()))?;
        Ok(Answer {
            query: query.to_string(),
            answer,
            sections,
        })
    }

    /// Run `extractor` over the stored text of one document.
    ///
    /// Returns an empty list for unknown documents without calling the extractor.
    pub async fn document_keywords(
        &self,
        document_id: &str,
        extractor: &dyn KeywordExtractor,
    ) -> Result<Vec<String>> {
        let text = {
            let state = self.state.read().await;
            state
                .metadata
                .iter()
                .filter(|(_, passage)| passage.document_id == document_id)
                .map(|(_, passage)| passage.text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };
        if text.is_empty() {
            return Ok(Vec::new());
        }
        extractor
            .extract_keywords(&text)
            .await
            .map_err(|e| RetrievalError::KeywordFailure(e.to_string()))
    }

    /// Drop a document by rebuilding the index from the surviving vectors.
    ///
    /// Surviving passages keep their relative order but are renumbered from 0.
    /// Returns the number of passages removed.
    pub async fn remove_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        if !state.metadata.contains_document(document_id) {
            return Ok(0);
        }

        let mut index = FlatIndex::new(state.index.dimension());
        let mut metadata = MetadataStore::new();
        let mut removed = 0usize;
        for (id, passage) in state.metadata.iter() {
            if passage.document_id == document_id {
                removed += 1;
                continue;
            }
            let vector = state.index.vector(id).ok_or_else(|| {
                RetrievalError::Store(VectorStoreError::IndexError(format!(
                    "no vector stored for id {id}"
                )))
            })?;
            let new_id = index.insert(vector)?;
            metadata.put(new_id, passage.clone());
        }

        let next_id = metadata.next_id();
        let saved = self.snapshots.save(&index, &metadata, next_id).await;
        state.index = index;
        state.metadata = metadata;
        state.next_id = next_id;
        state.dirty = match saved {
            Ok(()) => false,
            Err(err) => {
                log::error!("Removed '{document_id}' but failed to persist snapshot: {err}");
                true
            }
        };

        log::info!("Removed {removed} passages of '{document_id}'");
        Ok(removed)
    }

    pub async fn status(&self) -> StorageStats {
        let files_exist = self.snapshots.paths().presence().await;
        let state = self.state.read().await;
        StorageStats {
            total_vectors: state.index.count(),
            metadata_entries: state.metadata.len(),
            next_vector_id: state.next_id,
            dimension: state.index.dimension(),
            documents: state.metadata.document_ids().len(),
            unsaved_changes: state.dirty,
            files_exist,
            recovered_on_load: self.recovered_on_load.clone(),
        }
    }
}

fn embedding_failure(err: VectorStoreError) -> RetrievalError {
    RetrievalError::EmbeddingFailure(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(dimension: usize) -> IndexState {
        IndexState {
            index: FlatIndex::new(dimension),
            metadata: MetadataStore::new(),
            next_id: 0,
            dirty: false,
        }
    }

    #[test]
    fn append_advances_counter() {
        let mut state = state(2);
        state
            .append(
                "paper",
                vec!["one".to_string(), "two".to_string()],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .unwrap();
        assert_eq!(state.next_id, 2);
        assert_eq!(state.metadata.len(), 2);
        assert_eq!(state.resolve(1, 0.5).map(|p| p.text), Some("two".to_string()));
    }

    #[test]
    fn failed_append_rolls_back_whole_batch() {
        let mut state = state(2);
        state
            .append("old", vec!["kept".to_string()], &[vec![1.0, 0.0]])
            .unwrap();

        let base = state.index.count();
        let err = state.append(
            "new",
            vec!["a".to_string(), "b".to_string()],
            &[vec![0.0, 1.0], vec![1.0, 0.0, 0.0]],
        );
        assert!(err.is_err());
        assert_eq!(state.index.count(), 2);

        state.rollback(base);
        assert_eq!(state.index.count(), 1);
        assert_eq!(state.metadata.len(), 1);
        assert_eq!(state.next_id, 1);
        assert!(!state.metadata.contains_document("new"));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(IngestOutcome::Ingested {
            chunks_added: 3,
            persisted: true,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "ingested", "chunks_added": 3, "persisted": true})
        );
        let json = serde_json::to_value(IngestOutcome::AlreadyIngested).unwrap();
        assert_eq!(json, serde_json::json!({"status": "already_ingested"}));
    }
}
