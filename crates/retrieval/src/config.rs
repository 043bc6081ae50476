use crate::error::{Result, RetrievalError};
use paper_chunker::ChunkerConfig;
use paper_vector_store::{
    EmbedderConfig, EmbeddingMode, LoadPolicy, SnapshotFileNames, SnapshotPaths,
    EMBEDDING_MODE_ENV,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides [`RetrievalConfig::storage_dir`].
pub const STORAGE_DIR_ENV: &str = "PAPER_STORAGE_DIR";
/// Overrides [`EmbedderConfig::model_dir`].
pub const MODEL_DIR_ENV: &str = "PAPER_MODEL_DIR";

/// Everything needed to open a [`crate::RetrievalService`].
///
/// Loaded from TOML; every section is optional:
///
/// ```toml
/// storage_dir = "data"
/// load_policy = "strict"
///
/// [chunker]
/// chunk_size = 4000
///
/// [embedder]
/// mode = "stub"
/// dimension = 384
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory holding the snapshot artifacts
    pub storage_dir: PathBuf,
    pub chunker: ChunkerConfig,
    pub embedder: EmbedderConfig,
    pub load_policy: LoadPolicy,
    pub snapshot: SnapshotFileNames,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("data"),
            chunker: ChunkerConfig::default(),
            embedder: EmbedderConfig::default(),
            load_policy: LoadPolicy::default(),
            snapshot: SnapshotFileNames::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| RetrievalError::InvalidConfig(e.to_string()))
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            RetrievalError::InvalidConfig(format!("read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&raw)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `PAPER_EMBEDDING_MODE`, `PAPER_STORAGE_DIR` and `PAPER_MODEL_DIR`.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(EMBEDDING_MODE_ENV) {
            self.embedder.mode = EmbeddingMode::parse(&raw)
                .map_err(|e| RetrievalError::InvalidConfig(e.to_string()))?;
        }
        if let Some(dir) = lookup(STORAGE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(MODEL_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.embedder.model_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(RetrievalError::InvalidConfig(
                "storage_dir must not be empty".to_string(),
            ));
        }
        self.chunker.validate()?;
        self.embedder
            .validate()
            .map_err(RetrievalError::InvalidConfig)?;

        let names = [
            &self.snapshot.index,
            &self.snapshot.metadata,
            &self.snapshot.counter,
        ];
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(RetrievalError::InvalidConfig(
                "snapshot file names must not be empty".to_string(),
            ));
        }
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(RetrievalError::InvalidConfig(
                "snapshot file names must be distinct".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn snapshot_paths(&self) -> SnapshotPaths {
        SnapshotPaths::in_dir(&self.storage_dir, &self.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = RetrievalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunker.chunk_size, 2000);
        assert_eq!(config.load_policy, LoadPolicy::Lenient);
        assert_eq!(
            config.snapshot_paths().index,
            PathBuf::from("data/paper_index.bin")
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RetrievalConfig::from_toml_str(
            r#"
storage_dir = "/var/lib/papers"
load_policy = "strict"

[chunker]
chunk_size = 4000

[embedder]
mode = "stub"
dimension = 384
"#,
        )
        .unwrap();

        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/papers"));
        assert_eq!(config.load_policy, LoadPolicy::Strict);
        assert_eq!(config.chunker.chunk_size, 4000);
        assert_eq!(config.chunker.overlap_sentences, 6);
        assert_eq!(config.embedder.mode, EmbeddingMode::Stub);
        assert_eq!(config.embedder.dimension, 384);
        assert_eq!(config.embedder.max_batch, 32);
        assert_eq!(config.snapshot, SnapshotFileNames::default());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = RetrievalConfig::from_toml_str("load_policy = \"maybe\"").unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidConfig(_)));
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            (EMBEDDING_MODE_ENV, "stub"),
            (STORAGE_DIR_ENV, "/tmp/papers"),
            (MODEL_DIR_ENV, ""),
        ]
        .into_iter()
        .collect();

        let config = RetrievalConfig::default()
            .with_overrides_from(|key| env.get(key).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.embedder.mode, EmbeddingMode::Stub);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/papers"));
        assert_eq!(config.embedder.model_dir, PathBuf::from("models"));
    }

    #[test]
    fn bad_mode_override_fails() {
        let result = RetrievalConfig::default().with_overrides_from(|key| {
            (key == EMBEDDING_MODE_ENV).then(|| "gpu".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn validate_catches_bad_sections() {
        let mut config = RetrievalConfig::default();
        config.chunker.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.embedder.dimension = 0;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.snapshot.counter = config.snapshot.index.clone();
        assert!(config.validate().is_err());
    }
}
