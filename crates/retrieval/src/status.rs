use paper_vector_store::{FilePresence, VectorId};
use serde::Serialize;

/// Snapshot of index size and persistence health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total_vectors: usize,
    pub metadata_entries: usize,
    pub next_vector_id: VectorId,
    pub dimension: usize,
    /// Number of distinct documents
    pub documents: usize,
    /// In-memory state is ahead of the last successful save
    pub unsaved_changes: bool,
    pub files_exist: FilePresence,
    /// Snapshot problems repaired or discarded when the service started
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recovered_on_load: Vec<String>,
}
