use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use parking_lot::RwLock;
use placematch_embed::text::trigrams;
use placematch_location::Location;

use crate::embedding::DEFAULT_K;
use crate::error::SimilarityError;
use crate::index::{IndexFactory, Neighbor, SimilarityIndex, Threshold};

struct Entry {
    id: String,
    content: String,
    grams: HashSet<String>,
}

fn gram_set(text: &str) -> HashSet<String> {
    trigrams(text).into_iter().collect()
}

/// Jaccard similarity of two trigram sets, in `[0, 1]`.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    inter as f32 / union as f32
}

/// TrigramIndex ranks neighbors by Jaccard similarity of character
/// trigrams. Scores are in `[0, 1]`, higher is more similar.
///
/// It needs no embedding service, so it doubles as an offline backend.
pub struct TrigramIndex {
    k: usize,
    entries: RwLock<Vec<Entry>>,
    closed: AtomicBool,
}

impl TrigramIndex {
    pub fn new(k: usize) -> Self {
        Self {
            k: if k == 0 { DEFAULT_K } else { k },
            entries: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), SimilarityError> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(SimilarityError::Closed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SimilarityIndex for TrigramIndex {
    async fn add(&self, location: &Location) -> Result<(), SimilarityError> {
        self.ensure_open()?;
        let content = location.content();
        let entry = Entry {
            id: location.id().to_string(),
            grams: gram_set(&content),
            content,
        };
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn query(&self, location: &Location) -> Result<Vec<Neighbor>, SimilarityError> {
        self.ensure_open()?;
        let q = gram_set(&location.content());
        let entries = self.entries.read();

        let mut results: Vec<Neighbor> = entries
            .iter()
            .map(|e| Neighbor {
                id: e.id.clone(),
                content: e.content.clone(),
                similarity: jaccard(&q, &e.grams),
            })
            .collect();
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(self.k);
        Ok(results)
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    async fn close(&self) -> Result<(), SimilarityError> {
        self.closed.store(true, AtomicOrdering::Release);
        self.entries.write().clear();
        Ok(())
    }
}

pub struct TrigramFactory {
    k: usize,
    min_score: f32,
}

impl TrigramFactory {
    pub fn new(k: usize, min_score: f32) -> Self {
        Self { k, min_score }
    }
}

impl IndexFactory for TrigramFactory {
    fn create(&self, _geohash: &str) -> Result<Box<dyn SimilarityIndex>, SimilarityError> {
        Ok(Box::new(TrigramIndex::new(self.k)))
    }

    fn threshold(&self) -> Threshold {
        Threshold::min_score(self.min_score)
    }
}
