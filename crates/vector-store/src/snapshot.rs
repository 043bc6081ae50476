use crate::error::{Result, VectorStoreError};
use crate::flat_index::FlatIndex;
use crate::metadata::MetadataStore;
use crate::types::VectorId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// File names of the three snapshot artifacts inside the storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotFileNames {
    pub index: String,
    pub metadata: String,
    pub counter: String,
}

impl Default for SnapshotFileNames {
    fn default() -> Self {
        Self {
            index: "paper_index.bin".to_string(),
            metadata: "metadata_store.json".to_string(),
            counter: "current_vector_id.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
    pub counter: PathBuf,
}

impl SnapshotPaths {
    #[must_use]
    pub fn in_dir(dir: &Path, names: &SnapshotFileNames) -> Self {
        Self {
            index: dir.join(&names.index),
            metadata: dir.join(&names.metadata),
            counter: dir.join(&names.counter),
        }
    }

    /// Which artifacts exist on disk; unreadable paths count as absent.
    pub async fn presence(&self) -> FilePresence {
        FilePresence {
            index: exists(&self.index).await,
            metadata: exists(&self.metadata).await,
            vector_id: exists(&self.counter).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePresence {
    pub index: bool,
    pub metadata: bool,
    pub vector_id: bool,
}

/// What to do with a snapshot artifact that exists but cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Refuse to start.
    Strict,
    /// Log and start from an empty component (previous data is lost).
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub index_loaded: bool,
    pub metadata_loaded: bool,
    pub counter_loaded: bool,
    /// Problems that were recovered from: discarded artifacts under
    /// [`LoadPolicy::Lenient`] and unsaved index tails under either policy.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recovered: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoadedSnapshot {
    pub index: FlatIndex,
    pub metadata: MetadataStore,
    pub next_id: VectorId,
    pub report: LoadReport,
}

/// Saves and restores index + metadata + id counter as one unit.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    paths: SnapshotPaths,
}

impl SnapshotStore {
    #[must_use]
    pub const fn new(paths: SnapshotPaths) -> Self {
        Self { paths }
    }

    #[must_use]
    pub const fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }

    /// Write all three artifacts to temporary files, then rename them into place.
    ///
    /// Nothing is renamed unless every write succeeded. The index is renamed
    /// first, so a save interrupted during the rename phase leaves an index with
    /// extra trailing vectors; [`SnapshotStore::load`] drops that tail.
    pub async fn save(
        &self,
        index: &FlatIndex,
        metadata: &MetadataStore,
        next_id: VectorId,
    ) -> Result<()> {
        log::debug!(
            "Saving snapshot ({} vectors, next id {next_id}) to {}",
            index.count(),
            self.paths.index.display()
        );

        let artifacts = [
            (&self.paths.index, index.encode()),
            (&self.paths.metadata, metadata.encode()?),
            (&self.paths.counter, next_id.to_string().into_bytes()),
        ];

        for (path, _) in &artifacts {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|err| {
                    VectorStoreError::PersistenceError(format!(
                        "create {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }

        let mut staged = Vec::with_capacity(artifacts.len());
        for (path, bytes) in &artifacts {
            let tmp = tmp_path(path);
            let written = fs::write(&tmp, bytes).await;
            staged.push(tmp);
            if let Err(err) = written {
                remove_all(&staged).await;
                return Err(VectorStoreError::PersistenceError(format!(
                    "write {}: {err}",
                    path.display()
                )));
            }
        }

        for (idx, (path, _)) in artifacts.iter().enumerate() {
            if let Err(err) = fs::rename(&staged[idx], path).await {
                remove_all(&staged[idx..]).await;
                return Err(VectorStoreError::PersistenceError(format!(
                    "replace {}: {err}",
                    path.display()
                )));
            }
        }

        log::info!(
            "Snapshot saved: {} vectors, {} metadata entries",
            index.count(),
            metadata.len()
        );
        Ok(())
    }

    /// Restore a snapshot; missing artifacts start empty and never fail.
    pub async fn load(&self, dimension: usize, policy: LoadPolicy) -> Result<LoadedSnapshot> {
        let mut report = LoadReport::default();

        let index_bytes = self.read_artifact(&self.paths.index, policy, &mut report).await?;
        let index_present = index_bytes.is_some();
        let mut index = match index_bytes {
            None => FlatIndex::new(dimension),
            Some(bytes) => match FlatIndex::decode(&bytes).and_then(|i| ensure_dim(i, dimension)) {
                Ok(index) => {
                    log::info!("Loaded index with {} vectors", index.count());
                    report.index_loaded = true;
                    index
                }
                Err(reason) => {
                    recover(policy, &self.paths.index, reason, &mut report)?;
                    FlatIndex::new(dimension)
                }
            },
        };

        let metadata_bytes = self
            .read_artifact(&self.paths.metadata, policy, &mut report)
            .await?;
        let metadata_present = metadata_bytes.is_some();
        let mut metadata = match metadata_bytes {
            None => MetadataStore::new(),
            Some(bytes) => match MetadataStore::decode(&bytes) {
                Ok(metadata) => {
                    log::info!("Loaded metadata for {} vectors", metadata.len());
                    report.metadata_loaded = true;
                    metadata
                }
                Err(reason) => {
                    recover(policy, &self.paths.metadata, reason, &mut report)?;
                    MetadataStore::new()
                }
            },
        };

        let counter = match self
            .read_artifact(&self.paths.counter, policy, &mut report)
            .await?
        {
            None => None,
            Some(bytes) => match parse_counter(&bytes) {
                Ok(value) => {
                    report.counter_loaded = true;
                    Some(value)
                }
                Err(reason) => {
                    recover(policy, &self.paths.counter, reason, &mut report)?;
                    None
                }
            },
        };

        if metadata.is_dense() && index.count() > metadata.len() {
            // Torn save: the index was replaced but the metadata was not.
            let reason = format!(
                "dropped {} index vectors beyond the {} saved metadata entries",
                index.count() - metadata.len(),
                metadata.len()
            );
            log::warn!("Repairing {}: {reason}", self.paths.index.display());
            report
                .recovered
                .push(format!("{}: {reason}", self.paths.index.display()));
            index.truncate(metadata.len());
        }

        if index.count() != metadata.len() || !metadata.is_dense() {
            let reason = format!(
                "index holds {} vectors but metadata has {} entries (dense ids: {})",
                index.count(),
                metadata.len(),
                metadata.is_dense()
            );
            // A mismatch caused by a missing artifact is a fresh start, not corruption.
            let mismatch_policy = if index_present && metadata_present {
                policy
            } else {
                LoadPolicy::Lenient
            };
            recover(mismatch_policy, &self.paths.index, reason, &mut report)?;
            index = FlatIndex::new(dimension);
            metadata = MetadataStore::new();
            report.index_loaded = false;
            report.metadata_loaded = false;
        }

        let next_id = metadata.next_id();
        match counter {
            Some(value) if value != next_id => {
                log::warn!(
                    "Vector id counter {value} disagrees with metadata, using {next_id}"
                );
            }
            Some(value) => log::info!("Loaded current vector id: {value}"),
            None => log::info!("Starting with vector id: {next_id}"),
        }

        Ok(LoadedSnapshot {
            index,
            metadata,
            next_id,
            report,
        })
    }

    async fn read_artifact(
        &self,
        path: &Path,
        policy: LoadPolicy,
        report: &mut LoadReport,
    ) -> Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No existing {}, starting fresh", path.display());
                Ok(None)
            }
            Err(err) => {
                recover(policy, path, format!("read failed: {err}"), report)?;
                Ok(None)
            }
        }
    }
}

fn ensure_dim(index: FlatIndex, expected: usize) -> std::result::Result<FlatIndex, String> {
    if index.dimension() != expected {
        return Err(format!(
            "index dimension {} does not match embedder dimension {expected}",
            index.dimension()
        ));
    }
    Ok(index)
}

fn parse_counter(bytes: &[u8]) -> std::result::Result<VectorId, String> {
    let raw = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    raw.trim()
        .parse::<VectorId>()
        .map_err(|e| format!("invalid counter '{}': {e}", raw.trim()))
}

fn recover(
    policy: LoadPolicy,
    path: &Path,
    reason: String,
    report: &mut LoadReport,
) -> Result<()> {
    match policy {
        LoadPolicy::Strict => Err(VectorStoreError::IndexCorrupt {
            path: path.to_path_buf(),
            reason,
        }),
        LoadPolicy::Lenient => {
            log::warn!(
                "Discarding unreadable snapshot {}: {reason}",
                path.display()
            );
            report
                .recovered
                .push(format!("{}: {reason}", path.display()));
            Ok(())
        }
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        let _ = fs::remove_file(path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Passage;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn store_in(dir: &Path) -> SnapshotStore {
        SnapshotStore::new(SnapshotPaths::in_dir(dir, &SnapshotFileNames::default()))
    }

    fn sample() -> (FlatIndex, MetadataStore) {
        let mut index = FlatIndex::new(2);
        let mut metadata = MetadataStore::new();
        for (doc, v) in [("a", [1.0, 0.0]), ("a", [0.0, 1.0]), ("b", [0.6, 0.8])] {
            let id = index.insert(&v).unwrap();
            metadata.put(id, Passage::new(doc, format!("text {id}")));
        }
        (index, metadata)
    }

    #[tokio::test]
    async fn missing_files_start_empty() {
        let tmp = TempDir::new().unwrap();
        let loaded = store_in(tmp.path())
            .load(4, LoadPolicy::Strict)
            .await
            .unwrap();
        assert_eq!(loaded.index.count(), 0);
        assert_eq!(loaded.index.dimension(), 4);
        assert!(loaded.metadata.is_empty());
        assert_eq!(loaded.next_id, 0);
        assert_eq!(loaded.report, LoadReport::default());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 3).await.unwrap();

        let presence = store.paths().presence().await;
        assert!(presence.index && presence.metadata && presence.vector_id);
        let counter = std::fs::read_to_string(&store.paths().counter).unwrap();
        assert_eq!(counter, "3");

        let loaded = store.load(2, LoadPolicy::Strict).await.unwrap();
        assert_eq!(loaded.index, index);
        assert_eq!(loaded.metadata, metadata);
        assert_eq!(loaded.next_id, 3);
        assert!(loaded.report.index_loaded && loaded.report.metadata_loaded);
        assert!(loaded.report.counter_loaded);
    }

    #[tokio::test]
    async fn save_leaves_no_temporary_files() {
        let tmp = TempDir::new().unwrap();
        let (index, metadata) = sample();
        store_in(tmp.path())
            .save(&index, &metadata, 3)
            .await
            .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "current_vector_id.txt".to_string(),
                "metadata_store.json".to_string(),
                "paper_index.bin".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 3).await.unwrap();

        // A directory squatting on the metadata temp path makes that write fail.
        std::fs::create_dir(tmp.path().join("metadata_store.json.tmp")).unwrap();
        let mut grown = index.clone();
        grown.insert(&[0.0, -1.0]).unwrap();
        let err = store.save(&grown, &metadata, 4).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::PersistenceError(_)));
        assert!(!tmp.path().join("paper_index.bin.tmp").exists());

        let loaded = store.load(2, LoadPolicy::Strict).await.unwrap();
        assert_eq!(loaded.index.count(), 3);
    }

    #[tokio::test]
    async fn torn_save_keeps_previously_saved_passages() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 3).await.unwrap();
        let old_metadata = std::fs::read(&store.paths().metadata).unwrap();
        let old_counter = std::fs::read(&store.paths().counter).unwrap();

        let mut grown_index = index.clone();
        let mut grown_metadata = metadata.clone();
        let id = grown_index.insert(&[0.0, -1.0]).unwrap();
        grown_metadata.put(id, Passage::new("c", "text 3"));
        store.save(&grown_index, &grown_metadata, 4).await.unwrap();

        // Only the index rename landed.
        std::fs::write(&store.paths().metadata, old_metadata).unwrap();
        std::fs::write(&store.paths().counter, old_counter).unwrap();

        for policy in [LoadPolicy::Strict, LoadPolicy::Lenient] {
            let loaded = store.load(2, policy).await.unwrap();
            assert_eq!(loaded.index, index);
            assert_eq!(loaded.metadata, metadata);
            assert_eq!(loaded.next_id, 3);
            assert!(loaded.report.index_loaded && loaded.report.metadata_loaded);
            assert_eq!(loaded.report.recovered.len(), 1);
        }
    }

    #[tokio::test]
    async fn shorter_index_than_metadata_is_corruption() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        let mut short = index.clone();
        short.truncate(2);
        store.save(&short, &metadata, 3).await.unwrap();

        assert!(matches!(
            store.load(2, LoadPolicy::Strict).await,
            Err(VectorStoreError::IndexCorrupt { .. })
        ));
        let loaded = store.load(2, LoadPolicy::Lenient).await.unwrap();
        assert_eq!(loaded.index.count(), 0);
        assert!(loaded.metadata.is_empty());
    }

    #[tokio::test]
    async fn corrupt_index_strict_fails() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 3).await.unwrap();
        std::fs::write(&store.paths().index, b"garbage").unwrap();

        let err = store.load(2, LoadPolicy::Strict).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::IndexCorrupt { .. }));
    }

    #[tokio::test]
    async fn corrupt_index_lenient_falls_back_to_empty() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 3).await.unwrap();
        std::fs::write(&store.paths().index, b"garbage").unwrap();

        let loaded = store.load(2, LoadPolicy::Lenient).await.unwrap();
        assert_eq!(loaded.index.count(), 0);
        assert!(loaded.metadata.is_empty());
        assert_eq!(loaded.next_id, 0);
        assert!(!loaded.report.recovered.is_empty());
    }

    #[tokio::test]
    async fn dimension_change_is_corruption() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 3).await.unwrap();

        assert!(store.load(8, LoadPolicy::Strict).await.is_err());
        let loaded = store.load(8, LoadPolicy::Lenient).await.unwrap();
        assert_eq!(loaded.index.dimension(), 8);
        assert!(loaded.metadata.is_empty());
    }

    #[tokio::test]
    async fn missing_metadata_resets_index_even_when_strict() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 3).await.unwrap();
        std::fs::remove_file(&store.paths().metadata).unwrap();

        let loaded = store.load(2, LoadPolicy::Strict).await.unwrap();
        assert_eq!(loaded.index.count(), 0);
        assert_eq!(loaded.next_id, 0);
    }

    #[tokio::test]
    async fn stale_counter_is_reconciled() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(tmp.path());
        let (index, metadata) = sample();
        store.save(&index, &metadata, 1).await.unwrap();

        let loaded = store.load(2, LoadPolicy::Strict).await.unwrap();
        assert_eq!(loaded.next_id, 3);
    }

    #[test]
    fn tmp_path_appends_suffix() {
        assert_eq!(
            tmp_path(Path::new("/data/paper_index.bin")),
            PathBuf::from("/data/paper_index.bin.tmp")
        );
    }
}
