use crate::error::EmbedError;

/// Embedder converts location content into dense float32 vectors.
///
/// Implementations must be safe for concurrent use (Send + Sync); one
/// embedder is shared by every shard index of a run.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Return the embedding vector for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vecs = self.embed_batch(&[text]).await?;
        vecs.pop().ok_or(EmbedError::MissingIndex(0))
    }

    /// Return embedding vectors for multiple texts, in input order.
    /// Implementations may split large batches into smaller API calls.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Return the dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
