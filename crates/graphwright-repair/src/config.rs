use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use graphwright_core::FixerSettings;
use graphwright_core::catalog_cache::{CatalogCache, DEFAULT_MAX_AGE_HOURS};
use serde::{Deserialize, Serialize};

/// Repair settings, read from a TOML file. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Patch round-trips allowed after the first failed validation.
    pub max_patch_attempts: usize,
    pub default_model: String,
    pub catalog: CatalogSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub cache_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_age_hours: i64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_patch_attempts: 1,
            default_model: FixerSettings::default().default_model,
            catalog: CatalogSection::default(),
        }
    }
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("cache/blocks_cache.json"),
            fallback_path: None,
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
        }
    }
}

impl RepairConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml_edit::de::from_str(content)?)
    }

    pub fn fixer_settings(&self) -> FixerSettings {
        FixerSettings {
            default_model: self.default_model.clone(),
        }
    }

    pub fn catalog_cache(&self) -> CatalogCache {
        let cache = CatalogCache::new(&self.catalog.cache_path)
            .with_max_age(chrono::Duration::hours(self.catalog.max_age_hours));
        match &self.catalog.fallback_path {
            Some(path) => cache.with_fallback(path),
            None => cache,
        }
    }
}
