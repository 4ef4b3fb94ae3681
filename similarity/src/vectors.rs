use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::SimilarityError;
use crate::index::Neighbor;

/// Cosine distance between two vectors, in `[0, 2]`; 0 is identical
/// direction. Zero vectors and dimension mismatches return 2.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 2.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    let sim = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    (1.0 - sim) as f32
}

/// Order by ascending distance, then by ID so ties are stable.
pub(crate) fn by_distance(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.similarity
        .partial_cmp(&b.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

/// VectorStore holds the embedded content of one shard and answers
/// brute-force cosine searches over it.
pub trait VectorStore: Send + Sync {
    /// Add or replace the vector for `id`.
    fn insert(&self, id: &str, content: &str, vector: &[f32]) -> Result<(), SimilarityError>;

    /// Return the `top_k` closest entries by ascending cosine distance.
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, SimilarityError>;

    fn len(&self) -> usize;

    /// Release backing storage.
    fn close(&self) -> Result<(), SimilarityError> {
        Ok(())
    }
}

/// FlatVectors keeps a shard's vectors in memory.
pub struct FlatVectors {
    dim: usize,
    entries: RwLock<HashMap<String, (String, Vec<f32>)>>,
}

impl FlatVectors {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl VectorStore for FlatVectors {
    fn insert(&self, id: &str, content: &str, vector: &[f32]) -> Result<(), SimilarityError> {
        if vector.len() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                got: vector.len(),
                want: self.dim,
            });
        }
        self.entries
            .write()
            .insert(id.to_string(), (content.to_string(), vector.to_vec()));
        Ok(())
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>, SimilarityError> {
        let entries = self.entries.read();
        if entries.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }

        let mut results: Vec<Neighbor> = entries
            .iter()
            .map(|(id, (content, vec))| Neighbor {
                id: id.clone(),
                content: content.clone(),
                similarity: cosine_distance(query, vec),
            })
            .collect();
        results.sort_by(by_distance);
        results.truncate(top_k);
        Ok(results)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
