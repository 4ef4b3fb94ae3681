//! Scheme-keyed similarity backends.
//!
//! A backend is selected by a URI-like configuration string whose query
//! carries the tunables:
//!
//! ```text
//! embedding://?embedder=hash&dim=256&k=5&max-distance=0.25
//! embedding://?embedder=openai&model=text-embedding-3-small&storage=redb&path=/tmp/pm-{geohash}
//! trigram://?k=5&min-score=0.5
//! ```
//!
//! Unknown parameters are rejected so that a misspelled tunable, or a
//! threshold given in the wrong direction, fails before any shard runs.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use placematch_embed::{EmbedConfig, Embedder, HashEmbedder, HttpEmbedder, Provider};

use crate::embedding::{DEFAULT_BATCH, DEFAULT_K, EmbeddingFactory, VectorStorage};
use crate::error::SimilarityError;
use crate::index::IndexFactory;
use crate::trigram::TrigramFactory;

/// Default `max-distance` for embedding backends.
pub const DEFAULT_MAX_DISTANCE: f32 = 0.25;
/// Default `min-score` for the trigram backend.
pub const DEFAULT_MIN_SCORE: f32 = 0.5;

/// Parsed query parameters of a backend URI.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    params: BTreeMap<String, String>,
}

impl IndexOptions {
    pub fn parse(query: &str) -> Self {
        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parse `key` as `T`, or return `default` when absent.
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, SimilarityError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| SimilarityError::Config(format!("invalid value for {key}: {v:?}"))),
        }
    }

    /// Fail on any parameter not in `allowed`.
    pub fn expect_only(&self, scheme: &str, allowed: &[&str]) -> Result<(), SimilarityError> {
        for key in self.params.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(SimilarityError::Config(format!(
                    "{scheme}: unknown parameter {key:?} (allowed: {})",
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Builds a backend factory from its options.
pub type IndexConstructor = fn(&IndexOptions) -> Result<Arc<dyn IndexFactory>, SimilarityError>;

pub struct IndexRegistry {
    constructors: HashMap<&'static str, IndexConstructor>,
}

impl IndexRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn with(mut self, scheme: &'static str, ctor: IndexConstructor) -> Self {
        self.constructors.insert(scheme, ctor);
        self
    }

    pub fn schemes(&self) -> Vec<&'static str> {
        let mut s: Vec<_> = self.constructors.keys().copied().collect();
        s.sort_unstable();
        s
    }

    /// Build the factory described by `uri`.
    pub fn open(&self, uri: &str) -> Result<Arc<dyn IndexFactory>, SimilarityError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| SimilarityError::Config(format!("missing scheme in {uri:?}")))?;
        let ctor = self.constructors.get(scheme).ok_or_else(|| {
            SimilarityError::Config(format!(
                "unknown index scheme {scheme:?} (known: {})",
                self.schemes().join(", ")
            ))
        })?;
        let query = rest.split_once('?').map(|(_, q)| q).unwrap_or("");
        ctor(&IndexOptions::parse(query))
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::empty()
            .with("embedding", open_embedding)
            .with("trigram", open_trigram)
    }
}

fn open_trigram(opts: &IndexOptions) -> Result<Arc<dyn IndexFactory>, SimilarityError> {
    opts.expect_only("trigram", &["k", "min-score"])?;
    let k = opts.parse_or("k", DEFAULT_K)?;
    let min_score = opts.parse_or("min-score", DEFAULT_MIN_SCORE)?;
    Ok(Arc::new(TrigramFactory::new(k, min_score)))
}

fn open_embedding(opts: &IndexOptions) -> Result<Arc<dyn IndexFactory>, SimilarityError> {
    opts.expect_only(
        "embedding",
        &[
            "embedder",
            "model",
            "dim",
            "base-url",
            "api-key-env",
            "k",
            "batch",
            "max-distance",
            "storage",
            "path",
        ],
    )?;

    let embedder = open_embedder(opts)?;
    let storage = match opts.get("storage").unwrap_or("memory") {
        "memory" => VectorStorage::Memory,
        "redb" => VectorStorage::Redb {
            template: opts.get("path").map(str::to_string),
        },
        other => {
            return Err(SimilarityError::Config(format!(
                "unknown storage {other:?} (want memory or redb)"
            )));
        }
    };
    let max_distance = opts.parse_or("max-distance", DEFAULT_MAX_DISTANCE)?;

    Ok(Arc::new(
        EmbeddingFactory::new(embedder, storage, max_distance)
            .with_k(opts.parse_or("k", DEFAULT_K)?)
            .with_batch_size(opts.parse_or("batch", DEFAULT_BATCH)?),
    ))
}

fn open_embedder(opts: &IndexOptions) -> Result<Arc<dyn Embedder>, SimilarityError> {
    let name = opts.get("embedder").unwrap_or("hash");
    let dim = opts.parse_or("dim", 0usize)?;
    if name == "hash" {
        return Ok(Arc::new(HashEmbedder::new(dim)));
    }

    let provider = Provider::from_name(name)
        .ok_or_else(|| SimilarityError::Config(format!("unknown embedder {name:?}")))?;
    let key_env = match opts.get("api-key-env") {
        Some(env) => env.to_string(),
        None => format!("{}_API_KEY", name.to_uppercase()),
    };
    let api_key = std::env::var(&key_env)
        .map_err(|_| SimilarityError::Config(format!("{name}: ${key_env} is not set")))?;

    let cfg = EmbedConfig::default()
        .with_model(opts.get("model").unwrap_or(""))
        .with_dimension(dim)
        .with_base_url(opts.get("base-url").unwrap_or(""));
    Ok(Arc::new(HttpEmbedder::with_config(provider, &api_key, cfg)))
}
