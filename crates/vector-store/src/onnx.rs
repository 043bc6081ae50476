use crate::embeddings::{normalize, EmbedderConfig};
use crate::error::{Result, VectorStoreError};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Ix2, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

/// Sentence-transformer running on ONNX Runtime (CPU).
pub(crate) struct OnnxBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
    max_batch: usize,
    dimension: usize,
}

struct ModelAssets {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
}

impl ModelAssets {
    fn for_config(config: &EmbedderConfig) -> Self {
        let dir = config.model_dir.join(&config.model_id);
        Self {
            model_path: dir.join("model.onnx"),
            tokenizer_path: dir.join("tokenizer.json"),
        }
    }
}

fn embedding_error(context: &str, error: impl std::fmt::Display) -> VectorStoreError {
    VectorStoreError::EmbeddingError(format!("{context}: {error}"))
}

impl OnnxBackend {
    pub(crate) fn new(config: &EmbedderConfig) -> Result<Self> {
        let assets = ModelAssets::for_config(config);
        if !assets.model_path.exists() || !assets.tokenizer_path.exists() {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Model files for '{}' are missing. Expected ONNX at {} and tokenizer at {}",
                config.model_id,
                assets.model_path.display(),
                assets.tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&assets.tokenizer_path)
            .map_err(|e| embedding_error("Tokenizer load failed", e))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..PaddingParams::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| embedding_error("Tokenizer truncation failed", e))?;

        let session = Session::builder()
            .map_err(|e| embedding_error("Failed to create ORT session", e))?
            .with_intra_threads(default_intra_threads())
            .map_err(|e| embedding_error("Failed to set ORT intra threads", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| embedding_error("Failed to set optimization level", e))?
            .commit_from_file(&assets.model_path)
            .map_err(|e| embedding_error("Failed to load ONNX model", e))?;

        log::info!(
            "Loaded ONNX model '{}' (dim {}, max_length {}, batch {})",
            config.model_id,
            config.dimension,
            config.max_length,
            config.max_batch
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: config.max_length,
            max_batch: config.max_batch,
            dimension: config.dimension,
        })
    }

    pub(crate) fn embed_batch_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.max_batch) {
            let encodings = self
                .tokenizer
                .encode_batch(batch.to_vec(), true)
                .map_err(|e| embedding_error("Tokenization failed", e))?;
            let Some(seq_len) = encodings.first().map(Encoding::len) else {
                continue;
            };
            if seq_len > self.max_length {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Tokenized length {seq_len} exceeds max_length {}",
                    self.max_length
                )));
            }

            let inputs = BatchInputs::from_encodings(&encodings, seq_len);
            let output = self.forward(&inputs)?;
            results.extend(pooled_embeddings(
                output,
                &inputs.attention_mask,
                self.dimension,
            )?);
        }
        Ok(results)
    }

    /// Run one batch, feeding only the inputs the model declares.
    fn forward(&self, inputs: &BatchInputs) -> Result<ArrayD<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| VectorStoreError::EmbeddingError("ONNX session poisoned".into()))?;

        let feed = session
            .inputs
            .iter()
            .map(|input| Ok((input.name.clone(), inputs.tensor(&input.name)?)))
            .collect::<Result<HashMap<String, DynTensor>>>()?;

        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| embedding_error("ONNX forward failed", e))?;
        if outputs.len() == 0 {
            return Err(VectorStoreError::EmbeddingError(
                "ONNX returned no outputs".to_string(),
            ));
        }
        let hidden = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| embedding_error("Failed to decode ONNX output", e))?
            .to_owned();
        Ok(hidden)
    }
}

fn default_intra_threads() -> usize {
    match std::thread::available_parallelism().map_or(1, |n| n.get()) {
        0..=4 => 1,
        5..=12 => 2,
        _ => 4,
    }
}

/// Token ids, attention mask and segment ids for one batch, zero padded to `seq_len`.
struct BatchInputs {
    input_ids: Array2<i64>,
    attention_mask: Array2<i64>,
    token_type_ids: Array2<i64>,
}

impl BatchInputs {
    fn from_encodings(encodings: &[Encoding], seq_len: usize) -> Self {
        Self {
            input_ids: padded(encodings, seq_len, Encoding::get_ids),
            attention_mask: padded(encodings, seq_len, Encoding::get_attention_mask),
            token_type_ids: padded(encodings, seq_len, Encoding::get_type_ids),
        }
    }

    fn tensor(&self, name: &str) -> Result<DynTensor> {
        let array = match name {
            "input_ids" => &self.input_ids,
            "attention_mask" => &self.attention_mask,
            "token_type_ids" => &self.token_type_ids,
            other => {
                return Err(VectorStoreError::EmbeddingError(format!(
                    "Unsupported ONNX input '{other}'"
                )))
            }
        };
        Ok(Tensor::from_array(array.clone().into_dyn())
            .map_err(|e| embedding_error("Tensor error", e))?
            .upcast())
    }
}

fn padded(encodings: &[Encoding], seq_len: usize, field: fn(&Encoding) -> &[u32]) -> Array2<i64> {
    Array2::from_shape_fn((encodings.len(), seq_len), |(row, col)| {
        field(&encodings[row]).get(col).map_or(0, |v| i64::from(*v))
    })
}

/// Unit-length sentence embeddings from `[batch, dim]` output, or from
/// `[batch, seq, dim]` token states mean-pooled under the attention mask.
fn pooled_embeddings(
    output: ArrayD<f32>,
    attention_mask: &Array2<i64>,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let pooled: Vec<Vec<f32>> = match output.ndim() {
        2 => output
            .into_dimensionality::<Ix2>()
            .map_err(|e| embedding_error("Bad output shape", e))?
            .outer_iter()
            .map(|row| row.to_vec())
            .collect(),
        3 => output
            .into_dimensionality::<Ix3>()
            .map_err(|e| embedding_error("Bad output shape", e))?
            .outer_iter()
            .zip(attention_mask.outer_iter())
            .map(|(tokens, mask)| mean_pool(tokens, mask))
            .collect(),
        _ => {
            return Err(VectorStoreError::EmbeddingError(format!(
                "Unexpected ONNX output dims: {:?}",
                output.shape()
            )))
        }
    };

    pooled
        .into_iter()
        .map(|mut embedding| {
            if embedding.len() != dimension {
                return Err(VectorStoreError::InvalidDimension {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            normalize(&mut embedding);
            Ok(embedding)
        })
        .collect()
}

fn mean_pool(tokens: ArrayView2<'_, f32>, mask: ArrayView1<'_, i64>) -> Vec<f32> {
    let weights: Array1<f32> = (0..tokens.nrows())
        .map(|t| match mask.get(t) {
            Some(&m) if m != 0 => 1.0,
            _ => 0.0,
        })
        .collect();
    let count = weights.sum();
    if count == 0.0 {
        return vec![0.0; tokens.ncols()];
    }
    (tokens.t().dot(&weights) / count).to_vec()
}
