//! Unified path management for hourboost files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/hourboost/          # Config directory
//! └── hourboost.toml            # Settings
//!
//! ~/.local/share/hourboost/     # Data directory (overridable via storage.data_dir)
//! ├── cache.json                # Session cache states, refresh tokens, owned games
//! ├── plans.json                # Plans and their usage ledgers
//! └── users.json                # Users and attached steam accounts
//! ```

use hourboost_core::config::StorageSettings;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "hourboost";

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "HOURBOOST_CONFIG";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// The platform directory could not be determined.
    PlatformDirNotFound(&'static str),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::PlatformDirNotFound(kind) => {
                write!(f, "Cannot find platform {} directory", kind)
            }
        }
    }
}

impl std::error::Error for PathError {}

pub struct HourboostPaths;

impl HourboostPaths {
    /// Returns the hourboost configuration directory (e.g. `~/.config/hourboost/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::PlatformDirNotFound("config"))
    }

    /// Returns the hourboost data directory (e.g. `~/.local/share/hourboost/`).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::PlatformDirNotFound("data"))
    }

    /// Returns the settings file, honouring `HOURBOOST_CONFIG`.
    pub fn config_file() -> Result<PathBuf, PathError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("hourboost.toml"))
    }
}

/// Locations of the persisted stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Uses `storage.data_dir` when set, the platform data directory otherwise.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, PathError> {
        match &settings.data_dir {
            Some(dir) => Ok(Self::new(dir)),
            None => Ok(Self::new(HourboostPaths::data_dir()?)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_file(&self) -> PathBuf {
        self.root.join("cache.json")
    }

    pub fn plans_file(&self) -> PathBuf {
        self.root.join("plans.json")
    }

    pub fn users_file(&self) -> PathBuf {
        self.root.join("users.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_paths_prefer_configured_dir() {
        let settings = StorageSettings {
            data_dir: Some(PathBuf::from("/srv/hourboost")),
        };
        let paths = StoragePaths::from_settings(&settings).unwrap();

        assert_eq!(paths.root(), Path::new("/srv/hourboost"));
        assert_eq!(paths.cache_file(), PathBuf::from("/srv/hourboost/cache.json"));
        assert_eq!(paths.users_file(), PathBuf::from("/srv/hourboost/users.json"));
    }
}
