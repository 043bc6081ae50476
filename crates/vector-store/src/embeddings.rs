use crate::error::{Result, VectorStoreError};
use crate::onnx::OnnxBackend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::spawn_blocking;

/// Environment override for [`EmbedderConfig::mode`].
pub const EMBEDDING_MODE_ENV: &str = "PAPER_EMBEDDING_MODE";

/// Maps text to fixed-dimension, L2-normalized vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a batch; output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("Empty embedding result".to_string()))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    /// Sentence-transformer model exported to ONNX
    #[default]
    Onnx,
    /// Deterministic feature hashing, no model files required
    Stub,
}

impl EmbeddingMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "stub" => Ok(Self::Stub),
            other => Err(VectorStoreError::EmbeddingError(format!(
                "Unsupported embedding mode '{other}' (expected 'onnx' or 'stub')"
            ))),
        }
    }

    /// `PAPER_EMBEDDING_MODE` if set, otherwise `fallback`.
    pub fn from_env_or(fallback: Self) -> Result<Self> {
        match env::var(EMBEDDING_MODE_ENV) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Ok(fallback),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Onnx => "onnx",
            Self::Stub => "stub",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub mode: EmbeddingMode,
    /// Directory containing `<model_id>/model.onnx` and `<model_id>/tokenizer.json`
    pub model_dir: PathBuf,
    pub model_id: String,
    pub dimension: usize,
    pub max_length: usize,
    pub max_batch: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::Onnx,
            model_dir: PathBuf::from("models"),
            model_id: "all-mpnet-base-v2".to_string(),
            dimension: 768,
            max_length: 512,
            max_batch: 32,
        }
    }
}

impl EmbedderConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.dimension == 0 {
            return Err("embedder dimension must be > 0".to_string());
        }
        if self.max_batch == 0 {
            return Err("embedder max_batch must be > 0".to_string());
        }
        if self.max_length == 0 {
            return Err("embedder max_length must be > 0".to_string());
        }
        Ok(())
    }
}

/// Embedding model selected from configuration.
pub struct EmbeddingModel {
    backend: EmbeddingBackend,
    model_id: String,
    dimension: usize,
}

enum EmbeddingBackend {
    Onnx(Arc<OnnxBackend>),
    Stub(HashingEmbedder),
}

impl EmbeddingModel {
    pub fn from_config(config: &EmbedderConfig) -> Result<Self> {
        config
            .validate()
            .map_err(VectorStoreError::EmbeddingError)?;

        match config.mode {
            EmbeddingMode::Stub => {
                log::info!(
                    "Using hashing embedder (dim {}, batch {})",
                    config.dimension,
                    config.max_batch
                );
                Ok(Self {
                    backend: EmbeddingBackend::Stub(
                        HashingEmbedder::new(config.dimension).with_max_batch(config.max_batch),
                    ),
                    model_id: format!("stub-{}", config.dimension),
                    dimension: config.dimension,
                })
            }
            EmbeddingMode::Onnx => {
                let backend = OnnxBackend::new(config)?;
                Ok(Self {
                    backend: EmbeddingBackend::Onnx(Arc::new(backend)),
                    model_id: config.model_id.clone(),
                    dimension: config.dimension,
                })
            }
        }
    }

    #[must_use]
    pub const fn mode(&self) -> EmbeddingMode {
        match self.backend {
            EmbeddingBackend::Onnx(_) => EmbeddingMode::Onnx,
            EmbeddingBackend::Stub(_) => EmbeddingMode::Stub,
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        match &self.backend {
            EmbeddingBackend::Stub(stub) => stub.embed_batch(texts).await,
            EmbeddingBackend::Onnx(backend) => {
                let backend = backend.clone();
                let owned = texts.to_vec();
                spawn_blocking(move || backend.embed_batch_blocking(&owned))
                    .await
                    .map_err(|e| VectorStoreError::EmbeddingError(format!("Join error: {e}")))?
            }
        }
    }
}

/// Bag-of-words feature hashing into `dimension` signed buckets.
///
/// Texts sharing vocabulary score higher, which is enough for offline runs and
/// tests. Texts without any word characters get a pseudo-random unit vector.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimension: usize,
    max_batch: usize,
    model_id: String,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_batch: 32,
            model_id: format!("stub-{dimension}"),
        }
    }

    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            out.extend(batch.iter().map(|text| hash_embed(text, self.dimension)));
        }
        Ok(out)
    }
}

fn hash_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    if dimension == 0 {
        return vec;
    }

    let mut tokens = 0usize;
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        let mut state = fnv1a_64(token.as_bytes());
        let bits = splitmix64(&mut state);
        #[allow(clippy::cast_possible_truncation)]
        let bucket = (bits % dimension as u64) as usize;
        let sign = if bits >> 63 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign;
        tokens += 1;
    }

    if tokens == 0 || vec.iter().all(|v| *v == 0.0) {
        return noise_embed(text, dimension);
    }

    normalize(&mut vec);
    vec
}

fn noise_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        let bits = splitmix64(&mut state);
        let high = (bits >> 32) as u32;
        let mantissa = high >> 9;
        let unit = f32::from_bits(0x3f80_0000 | mantissa) - 1.0;
        vec.push(unit.mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}
