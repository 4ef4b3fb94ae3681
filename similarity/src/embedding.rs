use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use placematch_embed::Embedder;
use placematch_location::Location;
use tokio::sync::Mutex;

use crate::disk::RedbVectors;
use crate::error::SimilarityError;
use crate::index::{IndexFactory, Neighbor, SimilarityIndex, Threshold};
use crate::vectors::{FlatVectors, VectorStore};

/// Default number of neighbors returned per query.
pub const DEFAULT_K: usize = 5;
/// Default number of adds embedded per embedder call.
pub const DEFAULT_BATCH: usize = 32;

/// Where an [`EmbeddingIndex`] keeps its vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorStorage {
    Memory,
    /// A redb file in a temporary directory. The optional template may
    /// contain `{geohash}`.
    Redb { template: Option<String> },
}

/// EmbeddingIndex embeds location content with an [`Embedder`] and ranks
/// neighbors by cosine distance (lower is more similar).
///
/// Adds are buffered and embedded in batches; a query flushes the buffer
/// first so every earlier add is visible to it.
pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    vectors: Box<dyn VectorStore>,
    k: usize,
    batch_size: usize,
    pending: Mutex<Vec<(String, String)>>,
    /// Length of `pending`, readable without the async lock.
    pending_len: AtomicUsize,
    closed: AtomicBool,
}

impl EmbeddingIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Box<dyn VectorStore>,
        k: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            vectors,
            k: if k == 0 { DEFAULT_K } else { k },
            batch_size: batch_size.max(1),
            pending: Mutex::new(Vec::new()),
            pending_len: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), SimilarityError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SimilarityError::Closed);
        }
        Ok(())
    }

    async fn flush_pending(&self, pending: &mut Vec<(String, String)>) -> Result<(), SimilarityError> {
        if pending.is_empty() {
            return Ok(());
        }
        let texts: Vec<&str> = pending.iter().map(|(_, c)| c.as_str()).collect();
        let vecs = self.embedder.embed_batch(&texts).await?;
        for ((id, content), v) in pending.iter().zip(vecs.iter()) {
            self.vectors.insert(id, content, v)?;
        }
        pending.clear();
        self.pending_len.store(0, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait::async_trait]
impl SimilarityIndex for EmbeddingIndex {
    async fn add(&self, location: &Location) -> Result<(), SimilarityError> {
        self.ensure_open()?;
        let mut pending = self.pending.lock().await;
        pending.push((location.id().to_string(), location.content()));
        self.pending_len.store(pending.len(), Ordering::Relaxed);
        if pending.len() >= self.batch_size {
            self.flush_pending(&mut pending).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), SimilarityError> {
        self.ensure_open()?;
        let mut pending = self.pending.lock().await;
        self.flush_pending(&mut pending).await
    }

    async fn query(&self, location: &Location) -> Result<Vec<Neighbor>, SimilarityError> {
        self.flush().await?;
        if self.vectors.len() == 0 {
            return Ok(vec![]);
        }
        let q = self.embedder.embed(&location.content()).await?;
        self.vectors.search(&q, self.k)
    }

    fn len(&self) -> usize {
        self.vectors.len() + self.pending_len.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<(), SimilarityError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.pending.lock().await.clear();
        self.pending_len.store(0, Ordering::Relaxed);
        self.vectors.close()
    }
}

/// EmbeddingFactory builds one [`EmbeddingIndex`] per shard, sharing the
/// embedder across shards.
pub struct EmbeddingFactory {
    embedder: Arc<dyn Embedder>,
    storage: VectorStorage,
    k: usize,
    batch_size: usize,
    max_distance: f32,
}

impl EmbeddingFactory {
    pub fn new(embedder: Arc<dyn Embedder>, storage: VectorStorage, max_distance: f32) -> Self {
        Self {
            embedder,
            storage,
            k: DEFAULT_K,
            batch_size: DEFAULT_BATCH,
            max_distance,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }
}

impl IndexFactory for EmbeddingFactory {
    fn create(&self, geohash: &str) -> Result<Box<dyn SimilarityIndex>, SimilarityError> {
        let dim = self.embedder.dimension();
        let vectors: Box<dyn VectorStore> = match &self.storage {
            VectorStorage::Memory => Box::new(FlatVectors::new(dim)),
            VectorStorage::Redb { template } => {
                Box::new(RedbVectors::create(dim, geohash, template.as_deref())?)
            }
        };
        Ok(Box::new(EmbeddingIndex::new(
            self.embedder.clone(),
            vectors,
            self.k,
            self.batch_size,
        )))
    }

    fn threshold(&self) -> Threshold {
        Threshold::max_distance(self.max_distance)
    }
}
