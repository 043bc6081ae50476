use crate::error::{Result, VectorStoreError};
use crate::types::VectorId;
use ndarray::{ArrayView1, ArrayView2};
use std::cmp::Ordering;

const INDEX_MAGIC: &[u8; 4] = b"PVI1";
const HEADER_LEN: usize = 4 + 4 + 8;

/// Exact inner-product index over a contiguous `[count, dimension]` matrix.
///
/// Row `i` holds vector id `i`; the index only grows.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    count: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            count: 0,
            data: Vec::new(),
        }
    }

    /// Append a vector; returns its id (the count before insertion).
    pub fn insert(&mut self, vector: &[f32]) -> Result<VectorId> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        let id = self.count as VectorId;
        self.count += 1;
        Ok(id)
    }

    /// Top-`k` ids by inner product, best first; ties go to the lower id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(VectorId, f32)>> {
        self.check_dimension(query)?;
        if self.count == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let matrix = ArrayView2::from_shape((self.count, self.dimension), &self.data)
            .map_err(|e| VectorStoreError::IndexError(format!("index matrix shape: {e}")))?;
        let scores = matrix.dot(&ArrayView1::from(query));

        let mut ranked: Vec<(VectorId, f32)> = scores
            .iter()
            .enumerate()
            .map(|(row, score)| (row as VectorId, *score))
            .collect();

        if k < ranked.len() {
            ranked.select_nth_unstable_by(k - 1, rank_order);
            ranked.truncate(k);
        }
        ranked.sort_by(rank_order);

        Ok(ranked)
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn vector(&self, id: VectorId) -> Option<&[f32]> {
        let row = usize::try_from(id).ok()?;
        if row >= self.count {
            return None;
        }
        let start = row * self.dimension;
        self.data.get(start..start + self.dimension)
    }

    /// Drop every vector at or after row `len`. Used to roll back a partial ingest.
    pub fn truncate(&mut self, len: usize) {
        if len < self.count {
            self.count = len;
            self.data.truncate(len * self.dimension);
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(INDEX_MAGIC);
        #[allow(clippy::cast_possible_truncation)]
        let dim = self.dimension as u32;
        out.extend_from_slice(&dim.to_le_bytes());
        out.extend_from_slice(&(self.count as u64).to_le_bytes());
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub(crate) fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != INDEX_MAGIC {
            return Err("missing index header".to_string());
        }
        let dimension = u32::from_le_bytes(read_array(&bytes[4..8])?) as usize;
        let count = usize::try_from(u64::from_le_bytes(read_array(&bytes[8..16])?))
            .map_err(|_| "vector count overflows usize".to_string())?;

        let values = count
            .checked_mul(dimension)
            .ok_or_else(|| "vector count overflows usize".to_string())?;
        let expected_len = values
            .checked_mul(4)
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| "vector count overflows usize".to_string())?;
        if bytes.len() != expected_len {
            return Err(format!(
                "expected {expected_len} bytes for {count} vectors of dim {dimension}, found {}",
                bytes.len()
            ));
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|b| read_array(b).map(f32::from_le_bytes))
            .collect::<std::result::Result<Vec<f32>, String>>()?;

        Ok(Self {
            dimension,
            count,
            data,
        })
    }

    const fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn rank_order(a: &(VectorId, f32), b: &(VectorId, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

fn read_array<const N: usize>(bytes: &[u8]) -> std::result::Result<[u8; N], String> {
    bytes
        .try_into()
        .map_err(|_| format!("expected {N} bytes, found {}", bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_returns_sequential_ids() {
        let mut index = FlatIndex::new(3);
        assert_eq!(index.insert(&[1.0, 0.0, 0.0]).unwrap(), 0);
        assert_eq!(index.insert(&[0.0, 1.0, 0.0]).unwrap(), 1);
        assert_eq!(index.count(), 2);
        assert_eq!(index.vector(1), Some(&[0.0, 1.0, 0.0][..]));
        assert_eq!(index.vector(2), None);
    }

    #[test]
    fn test_add_and_search() {
        let mut index = FlatIndex::new(3);
        index.insert(&[1.0, 0.0, 0.0]).unwrap();
        index.insert(&[0.9, 0.1, 0.0]).unwrap();
        index.insert(&[0.0, 1.0, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);

        // First result should be id=0 (exact match)
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-6);

        assert_eq!(results[1].0, 1);
        assert!(results[1].1 > 0.89);
    }

    #[test]
    fn test_search_returns_descending_scores() {
        let mut index = FlatIndex::new(2);
        for v in [[0.1, 0.9], [0.8, 0.2], [-1.0, 0.0], [0.5, 0.5], [0.95, 0.05]] {
            index.insert(&v).unwrap();
        }
        let results = index.search(&[1.0, 0.0], 10).unwrap();
        let ids: Vec<VectorId> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![4, 1, 3, 0, 2]);
        assert!(results.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_ties_prefer_lower_id() {
        let mut index = FlatIndex::new(2);
        index.insert(&[0.0, 1.0]).unwrap();
        index.insert(&[1.0, 0.0]).unwrap();
        index.insert(&[1.0, 0.0]).unwrap();
        let results = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(results, vec![(1, 1.0)]);
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let mut index = FlatIndex::new(2);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
        index.insert(&[1.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        assert!(index.insert(&[1.0, 0.0]).is_err());

        index.insert(&[1.0, 0.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_truncate_rolls_back_rows() {
        let mut index = FlatIndex::new(2);
        index.insert(&[1.0, 0.0]).unwrap();
        index.insert(&[0.0, 1.0]).unwrap();
        index.truncate(1);
        assert_eq!(index.count(), 1);
        assert_eq!(index.insert(&[0.5, 0.5]).unwrap(), 1);
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut index = FlatIndex::new(2);
        index.insert(&[0.6, 0.8]).unwrap();
        index.insert(&[-0.8, 0.6]).unwrap();
        let decoded = FlatIndex::decode(&index.encode()).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(FlatIndex::decode(b"not an index").is_err());

        let mut bytes = FlatIndex::new(2).encode();
        bytes[8] = 3; // claims three vectors, carries none
        assert!(FlatIndex::decode(&bytes).is_err());
    }
}
