//! Approximate nearest-neighbor index over unit embeddings (spec §4.B
//! "Vector index"), grounded in the teacher's `search::vector` HNSW
//! wrapper, generalized from a fixed 256-dim constant to a per-tenant
//! `dimension` chosen at registration time.

use std::path::Path;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VectorIndexError {
    #[error("usearch error: {0}")]
    Usearch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl VectorIndexConfig {
    pub fn new(dimensions: usize) -> Self {
        VectorIndexConfig { dimensions, connectivity: 16, expansion_add: 128, expansion_search: 64 }
    }
}

/// One tenant's HNSW index. `usearch` only supports `u64` keys internally,
/// so unit ids (already `i64`) map directly — no string-key indirection
/// is needed since unit ids are already stable integers (teacher used
/// string keys for a different id scheme).
pub struct VectorIndex {
    index: Index,
    config: VectorIndexConfig,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            ..Default::default()
        };
        let index = Index::new(&options).map_err(|e| VectorIndexError::Usearch(e.to_string()))?;
        index.reserve(1024).map_err(|e| VectorIndexError::Usearch(e.to_string()))?;
        Ok(Self { index, config })
    }

    pub fn add(&mut self, id: i64, embedding: &[f32]) -> Result<(), VectorIndexError> {
        if embedding.len() != self.config.dimensions {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: embedding.len(),
            });
        }
        if self.index.size() + 1 > self.index.capacity() {
            self.index
                .reserve(self.index.capacity() * 2 + 64)
                .map_err(|e| VectorIndexError::Usearch(e.to_string()))?;
        }
        let key = id as u64;
        if self.index.contains(key) {
            self.index.remove(key).map_err(|e| VectorIndexError::Usearch(e.to_string()))?;
        }
        self.index.add(key, embedding).map_err(|e| VectorIndexError::Usearch(e.to_string()))
    }

    pub fn remove(&mut self, id: i64) -> Result<(), VectorIndexError> {
        let key = id as u64;
        if self.index.contains(key) {
            self.index.remove(key).map_err(|e| VectorIndexError::Usearch(e.to_string()))?;
        }
        Ok(())
    }

    /// `vector_search(query_vec, k)` contract (spec §4.B): monotonic in
    /// cosine similarity, highest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>, VectorIndexError> {
        if query.len() != self.config.dimensions {
            return Err(VectorIndexError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: query.len(),
            });
        }
        let matches = self.index.search(query, k).map_err(|e| VectorIndexError::Usearch(e.to_string()))?;
        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(key, dist)| (*key as i64, 1.0 - dist))
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<(), VectorIndexError> {
        self.index
            .save(path.to_str().ok_or_else(|| VectorIndexError::Usearch("non-utf8 path".into()))?)
            .map_err(|e| VectorIndexError::Usearch(e.to_string()))
    }

    pub fn load(config: VectorIndexConfig, path: &Path) -> Result<Self, VectorIndexError> {
        let mut index = Self::new(config)?;
        if path.exists() {
            index
                .index
                .load(path.to_str().ok_or_else(|| VectorIndexError::Usearch("non-utf8 path".into()))?)
                .map_err(|e| VectorIndexError::Usearch(e.to_string()))?;
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_vec(dims: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn add_and_search_round_trips() {
        let mut idx = VectorIndex::new(VectorIndexConfig::new(8)).unwrap();
        idx.add(1, &unit_vec(8, 0)).unwrap();
        idx.add(2, &unit_vec(8, 1)).unwrap();
        let results = idx.search(&unit_vec(8, 0), 2).unwrap();
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut idx = VectorIndex::new(VectorIndexConfig::new(8)).unwrap();
        let err = idx.add(1, &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, VectorIndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn remove_then_readd_updates_in_place() {
        let mut idx = VectorIndex::new(VectorIndexConfig::new(8)).unwrap();
        idx.add(1, &unit_vec(8, 0)).unwrap();
        idx.add(1, &unit_vec(8, 2)).unwrap();
        assert_eq!(idx.len(), 1);
    }
}
