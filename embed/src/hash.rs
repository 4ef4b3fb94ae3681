use crate::embed::Embedder;
use crate::error::EmbedError;
use crate::text::trigrams;

/// Default output dimension for [`HashEmbedder`].
pub const HASH_DEFAULT_DIM: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(data: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// HashEmbedder is a local, deterministic embedder: character trigrams are
/// feature-hashed into a fixed number of signed buckets and the result is
/// L2-normalized.
///
/// It needs no network and gives stable vectors across runs, which makes it
/// suitable for offline matching of near-duplicate names and for tests.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: if dim == 0 { HASH_DEFAULT_DIM } else { dim },
        }
    }

    /// Text without any trigram (punctuation only, say) maps to the zero
    /// vector, which is at maximum distance from everything.
    fn vectorize(&self, text: &str) -> Vec<f32> {
        let grams = trigrams(text);
        let mut v = vec![0.0f64; self.dim];
        for g in &grams {
            let h = fnv1a(g.as_bytes());
            let slot = (h % self.dim as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return vec![0.0; self.dim];
        }
        v.into_iter().map(|x| (x / norm) as f32).collect()
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HASH_DEFAULT_DIM)
    }
}

#[async_trait::async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
