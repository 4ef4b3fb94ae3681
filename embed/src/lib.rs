pub mod config;
pub mod embed;
pub mod error;
pub mod hash;
pub mod http;
pub mod text;

pub use config::EmbedConfig;
pub use embed::Embedder;
pub use error::EmbedError;
pub use hash::HashEmbedder;
pub use http::{HttpEmbedder, Provider};
