//! YAML configuration for the CLI.
//!
//! Loaded from `--config`, or from `~/.placematch/config.yaml` when that
//! file exists. Every value can be overridden by the matching flag.
//!
//! ```yaml
//! source: redb:///data/wof.redb
//! target: redb:///data/ovtr.redb
//! index: trigram://?k=5&min-score=0.5
//! workers: 16
//! progress: 10
//! cache:
//!   max_cost: 200000
//!   ttl: 600
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BASE_DIR: &str = ".placematch";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Source store URI.
    pub source: Option<String>,
    /// Target store URI.
    pub target: Option<String>,
    /// Similarity index URI.
    pub index: Option<String>,
    /// Threshold value, overriding the one in `index`.
    pub threshold: Option<f32>,
    pub workers: Option<usize>,
    /// Progress interval in seconds.
    pub progress: Option<u64>,
    /// Match output file; stdout when unset.
    pub output: Option<String>,
    pub cache: CacheSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub max_cost: Option<usize>,
    /// Seconds before a cached shard is rebuilt.
    pub ttl: Option<u64>,
}

/// `~/.placematch/config.yaml`, if a home directory is known.
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(DEFAULT_BASE_DIR).join(DEFAULT_CONFIG_FILE))
}

impl Config {
    /// Load `path`, or the default file if present. An explicit path must
    /// exist; a missing default file yields an empty config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => match default_path() {
                Some(p) if p.exists() => Self::from_file(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&data).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }
}

/// Pick the flag value, then the config value, or fail naming the flag.
pub fn require(flag: Option<&str>, file: Option<&str>, name: &str) -> Result<String> {
    flag.or(file)
        .map(str::to_string)
        .with_context(|| format!("missing --{name} (flag or config)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let cfg = Config::parse(
            "source: memory://\nindex: trigram://?min-score=0.6\nworkers: 4\ncache:\n  ttl: 60\n",
        )
        .unwrap();
        assert_eq!(cfg.source.as_deref(), Some("memory://"));
        assert_eq!(cfg.workers, Some(4));
        assert_eq!(cfg.cache.ttl, Some(60));
        assert_eq!(cfg.cache.max_cost, None);
        assert!(cfg.target.is_none());
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
        assert!(Config::parse("sauce: memory://\n").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "target: null://\n").unwrap();
        assert_eq!(
            Config::load(Some(&path)).unwrap().target.as_deref(),
            Some("null://")
        );
        assert!(Config::load(Some(&dir.path().join("missing.yaml"))).is_err());
    }

    #[test]
    fn test_require() {
        let file = Some("memory://");
        assert_eq!(require(None, file, "source").unwrap(), "memory://");
        assert_eq!(require(Some("null://"), file, "source").unwrap(), "null://");
        assert!(require(None, None, "source").is_err());
    }
}
