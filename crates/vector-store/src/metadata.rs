use crate::types::{Passage, VectorId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Vector id → passage mapping kept parallel to the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataStore {
    entries: BTreeMap<VectorId, Passage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedMetadata {
    schema_version: u32,
    entries: BTreeMap<VectorId, Passage>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, id: VectorId, passage: Passage) {
        self.entries.insert(id, passage);
    }

    #[must_use]
    pub fn get(&self, id: VectorId) -> Option<&Passage> {
        self.entries.get(&id)
    }

    /// Linear scan; document checks are rare compared to lookups.
    #[must_use]
    pub fn contains_document(&self, document_id: &str) -> bool {
        self.entries
            .values()
            .any(|passage| passage.document_id == document_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One past the highest id, or 0 when empty.
    #[must_use]
    pub fn next_id(&self) -> VectorId {
        self.entries
            .last_key_value()
            .map_or(0, |(id, _)| id.saturating_add(1))
    }

    #[must_use]
    pub fn document_ids(&self) -> BTreeSet<String> {
        self.entries
            .values()
            .map(|passage| passage.document_id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VectorId, &Passage)> {
        self.entries.iter().map(|(id, passage)| (*id, passage))
    }

    /// True when the ids are exactly `0..len`, i.e. they line up with index rows.
    #[must_use]
    pub fn is_dense(&self) -> bool {
        self.entries
            .keys()
            .enumerate()
            .all(|(pos, id)| *id == pos as VectorId)
    }

    /// Remove every entry with id >= `id`.
    pub fn truncate_from(&mut self, id: VectorId) {
        drop(self.entries.split_off(&id));
    }

    pub(crate) fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let persisted = PersistedMetadata {
            schema_version: METADATA_SCHEMA_VERSION,
            entries: self.entries.clone(),
        };
        serde_json::to_vec_pretty(&persisted)
    }

    pub(crate) fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let persisted: PersistedMetadata =
            serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        if persisted.schema_version != METADATA_SCHEMA_VERSION {
            return Err(format!(
                "unsupported metadata schema_version {} (expected {METADATA_SCHEMA_VERSION})",
                persisted.schema_version
            ));
        }
        Ok(Self {
            entries: persisted.entries,
        })
    }
}
