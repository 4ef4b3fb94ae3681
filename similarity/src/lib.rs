//! Similarity indices: ephemeral, per-shard nearest-neighbor stores over
//! [`Location::content`](placematch_location::Location::content).
//!
//! The matcher only ever calls [`SimilarityIndex::add`] and
//! [`SimilarityIndex::query`]; how similarity is computed is up to the
//! backend. Every backend states its [`Direction`] so thresholds are applied
//! the right way round.

pub mod disk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod registry;
pub mod trigram;
pub mod vectors;

pub use disk::RedbVectors;
pub use embedding::{EmbeddingFactory, EmbeddingIndex, VectorStorage};
pub use error::SimilarityError;
pub use index::{Direction, IndexFactory, Neighbor, SimilarityIndex, Threshold};
pub use registry::{IndexConstructor, IndexOptions, IndexRegistry};
pub use trigram::{TrigramFactory, TrigramIndex};
pub use vectors::{FlatVectors, VectorStore, cosine_distance};
