use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for sentence packing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters (a single longer sentence may exceed it)
    pub chunk_size: usize,

    /// Number of trailing sentences carried into the next chunk
    pub overlap_sentences: usize,

    /// Chunks whose trimmed length is at or below this are discarded
    pub min_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            overlap_sentences: 6,
            min_chunk_chars: 100,
        }
    }
}

impl ChunkerConfig {
    /// Larger chunks, matching the wider context window of answer generation
    pub fn for_long_context() -> Self {
        Self {
            chunk_size: 4000,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::invalid_config("chunk_size must be > 0"));
        }

        if self.min_chunk_chars >= self.chunk_size {
            return Err(ChunkerError::invalid_config(format!(
                "min_chunk_chars ({}) must be below chunk_size ({})",
                self.min_chunk_chars, self.chunk_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ChunkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 2000);
        assert_eq!(config.overlap_sentences, 6);
    }

    #[test]
    fn test_preset_configs_valid() {
        assert!(ChunkerConfig::for_long_context().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ChunkerConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // Invalid: filter would swallow every chunk
        config.chunk_size = 100;
        config.min_chunk_chars = 100;
        assert!(config.validate().is_err());

        config.min_chunk_chars = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ChunkerConfig = serde_json::from_str(r#"{"chunk_size": 500}"#).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.overlap_sentences, 6);
        assert_eq!(config.min_chunk_chars, 100);
    }
}
