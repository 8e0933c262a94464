//! Configuration service implementation.
//!
//! Loads [`Settings`] from `hourboost.toml` (or the file named by
//! `HOURBOOST_CONFIG`) and caches the parsed value.

use crate::paths::HourboostPaths;
use hourboost_core::config::Settings;
use hourboost_core::error::{HourboostError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Configuration service that loads and caches the settings.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    config: Arc<RwLock<Option<Settings>>>,
}

impl ConfigService {
    /// Uses the platform settings file, or `HOURBOOST_CONFIG` when set.
    pub fn new() -> Result<Self> {
        let path =
            HourboostPaths::config_file().map_err(|e| HourboostError::config(e.to_string()))?;
        Ok(Self::with_path(path))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the settings, loading from file if not cached.
    ///
    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn get_config(&self) -> Result<Settings> {
        if let Ok(read_lock) = self.config.read() {
            if let Some(cached) = read_lock.as_ref() {
                return Ok(cached.clone());
            }
        }

        let loaded = self.load()?;

        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = Some(loaded.clone());
        }
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = None;
        }
    }

    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            tracing::debug!(
                path = %self.path.display(),
                "[ConfigService] No settings file, using defaults"
            );
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| {
            HourboostError::config(format!("{}: {}", self.path.display(), e))
        })
    }
}
