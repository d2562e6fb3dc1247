use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

const APP_DIR_NAME: &str = "correcteur";

/// Per-user base directory that the application nests its own folder under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseDir {
    Config,
    Cache,
    Data,
}

impl fmt::Display for BaseDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Config => "config",
            Self::Cache => "cache",
            Self::Data => "data",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("could not determine the user {0} directory")]
pub struct AppPathsError(pub BaseDir);

/// Where Correcteur keeps its settings, user records, downloads and log.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve the per-user directories of the current platform.
    ///
    /// # Errors
    /// Returns the first base directory the platform cannot provide.
    pub fn new() -> Result<Self, AppPathsError> {
        Self::from_base_dirs(|dir| match dir {
            BaseDir::Config => dirs::config_dir(),
            BaseDir::Cache => dirs::cache_dir(),
            BaseDir::Data => dirs::data_dir(),
        })
    }

    fn from_base_dirs(
        lookup: impl Fn(BaseDir) -> Option<PathBuf>,
    ) -> Result<Self, AppPathsError> {
        let app_dir = |dir| {
            lookup(dir)
                .map(|base| base.join(APP_DIR_NAME))
                .ok_or(AppPathsError(dir))
        };
        Ok(Self {
            config_dir: app_dir(BaseDir::Config)?,
            cache_dir: app_dir(BaseDir::Cache)?,
            data_dir: app_dir(BaseDir::Data)?,
        })
    }

    /// Everything under one directory. Used by tests.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    /// User records: API key, categories, correction history and statistics.
    #[must_use]
    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join("store.json")
    }

    /// Downloaded installers, plus temp dirs of interrupted downloads.
    #[must_use]
    pub fn updates_dir(&self) -> PathBuf {
        self.cache_dir.join("updates")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// Create the config, data and updates directories.
    ///
    /// # Errors
    /// Returns the first directory creation failure.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.updates_dir()] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
