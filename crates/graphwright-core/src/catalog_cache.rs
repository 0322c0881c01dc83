use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{BlockCatalog, BlockDefinition};

pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no cached or fallback block catalog available")]
    Unavailable,
}

/// Sidecar written next to the cached catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub fetched_at: DateTime<Utc>,
    pub block_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Cache,
    Fallback,
}

/// A catalog snapshot plus how old it is. Fallback catalogs have no age.
#[derive(Debug, Clone)]
pub struct CachedCatalog {
    pub catalog: BlockCatalog,
    pub age: Option<Duration>,
    pub source: CatalogSource,
}

/// File-backed block catalog cache.
///
/// Fetching a fresh catalog is the caller's job: check [`CatalogCache::is_stale`],
/// obtain the blocks elsewhere and hand them to [`CatalogCache::store`].
/// Stored as `<name>.json` with a `<name>_metadata.json` sidecar.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    cache_path: PathBuf,
    fallback_path: Option<PathBuf>,
    max_age: Duration,
}

impl CatalogCache {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            fallback_path: None,
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
        }
    }

    pub fn with_fallback(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn metadata_path(&self) -> PathBuf {
        let stem = self
            .cache_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "blocks_cache".to_string());
        self.cache_path.with_file_name(format!("{}_metadata.json", stem))
    }

    /// Persist a freshly obtained catalog and its metadata.
    pub fn store(&self, blocks: &[BlockDefinition]) -> Result<CacheMetadata, CatalogError> {
        self.store_at(blocks, Utc::now())
    }

    pub fn store_at(
        &self,
        blocks: &[BlockDefinition],
        fetched_at: DateTime<Utc>,
    ) -> Result<CacheMetadata, CatalogError> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let metadata = CacheMetadata {
            fetched_at,
            block_count: blocks.len(),
        };
        write_json(&self.cache_path, &blocks)?;
        write_json(&self.metadata_path(), &metadata)?;
        info!(
            "Cached {} blocks at {}",
            metadata.block_count,
            self.cache_path.display()
        );
        Ok(metadata)
    }

    pub fn metadata(&self) -> Result<CacheMetadata, CatalogError> {
        read_json(&self.metadata_path())
    }

    /// Whether the cache is missing, unreadable or older than the max age.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        match self.metadata() {
            Ok(metadata) => now - metadata.fetched_at > self.max_age,
            Err(_) => true,
        }
    }

    /// The cached catalog, stale or not, or the fallback file when the cache
    /// cannot be read.
    pub fn get(&self) -> Result<CachedCatalog, CatalogError> {
        self.get_at(Utc::now())
    }

    pub fn get_at(&self, now: DateTime<Utc>) -> Result<CachedCatalog, CatalogError> {
        match self.load_cached(now) {
            Ok(cached) => {
                if let Some(age) = cached.age
                    && age > self.max_age
                {
                    warn!(
                        "Block cache is {:.1} hours old (max {}h)",
                        age.num_minutes() as f64 / 60.0,
                        self.max_age.num_hours()
                    );
                }
                Ok(cached)
            }
            Err(e) => {
                warn!("Failed to load block cache: {}", e);
                self.load_fallback()
            }
        }
    }

    fn load_cached(&self, now: DateTime<Utc>) -> Result<CachedCatalog, CatalogError> {
        let blocks: Vec<BlockDefinition> = read_json(&self.cache_path)?;
        let age = self.metadata().ok().map(|m| now - m.fetched_at);
        info!("Loaded {} blocks from cache", blocks.len());
        Ok(CachedCatalog {
            catalog: BlockCatalog::new(blocks),
            age,
            source: CatalogSource::Cache,
        })
    }

    fn load_fallback(&self) -> Result<CachedCatalog, CatalogError> {
        let Some(path) = &self.fallback_path else {
            return Err(CatalogError::Unavailable);
        };
        let blocks: Vec<BlockDefinition> = read_json(path)?;
        warn!(
            "Loaded {} blocks from fallback file {}",
            blocks.len(),
            path.display()
        );
        Ok(CachedCatalog {
            catalog: BlockCatalog::new(blocks),
            age: None,
            source: CatalogSource::Fallback,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let data = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CatalogError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks() -> Vec<BlockDefinition> {
        vec![
            BlockDefinition::new("a", "First"),
            BlockDefinition::new("b", "Second"),
        ]
    }

    #[test]
    fn store_then_get_reports_age() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CatalogCache::new(dir.path().join("cache").join("blocks_cache.json"));
        let fetched = Utc::now() - Duration::hours(2);

        let metadata = cache.store_at(&blocks(), fetched).unwrap();
        assert_eq!(metadata.block_count, 2);
        assert!(cache.metadata_path().ends_with("blocks_cache_metadata.json"));

        let cached = cache.get_at(fetched + Duration::hours(2)).unwrap();
        assert_eq!(cached.source, CatalogSource::Cache);
        assert_eq!(cached.catalog.len(), 2);
        assert_eq!(cached.age, Some(Duration::hours(2)));
        assert!(!cache.is_stale_at(fetched + Duration::hours(2)));
    }

    #[test]
    fn stale_cache_is_still_served() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CatalogCache::new(dir.path().join("blocks.json"));
        let fetched = Utc::now() - Duration::hours(30);
        cache.store_at(&blocks(), fetched).unwrap();

        let now = fetched + Duration::hours(30);
        assert!(cache.is_stale_at(now));
        let cached = cache.get_at(now).unwrap();
        assert_eq!(cached.source, CatalogSource::Cache);
        assert!(cached.age.unwrap() > Duration::hours(DEFAULT_MAX_AGE_HOURS));
    }

    #[test]
    fn falls_back_when_cache_is_missing_or_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.json");
        std::fs::write(&fallback, r#"[{"id": "f", "name": "Fallback"}]"#).unwrap();

        let cache = CatalogCache::new(dir.path().join("blocks.json")).with_fallback(&fallback);
        assert!(cache.is_stale());
        let cached = cache.get().unwrap();
        assert_eq!(cached.source, CatalogSource::Fallback);
        assert!(cached.age.is_none());
        assert!(cached.catalog.contains("f"));

        std::fs::write(cache.cache_path(), "not json").unwrap();
        assert_eq!(cache.get().unwrap().source, CatalogSource::Fallback);
    }

    #[test]
    fn nothing_available_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CatalogCache::new(dir.path().join("blocks.json"));
        assert!(matches!(cache.get(), Err(CatalogError::Unavailable)));

        let broken = CatalogCache::new(dir.path().join("blocks.json"))
            .with_fallback(dir.path().join("missing.json"));
        assert!(matches!(broken.get(), Err(CatalogError::Io { .. })));
    }
}
