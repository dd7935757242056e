//! Run configuration: file names, API endpoint, limits and timeouts.
//!
//! Values come from built-in defaults, then an optional TOML file, then CLI
//! overrides applied by the binary. Relative file paths are resolved against
//! [`Config::work_dir`].

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "wishlist.toml";

/// Default remote metadata API base.
pub const DEFAULT_API_BASE: &str = "https://wallhaven.cc/api/v1/w";

/// Default resolution requests per window.
pub const DEFAULT_RATE_LIMIT_PERMITS: usize = 45;

/// Default rate limit window in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default number of simultaneous downloads.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

/// Minimum allowed download concurrency.
pub const MIN_DOWNLOAD_CONCURRENCY: usize = 1;

/// Maximum allowed download concurrency.
pub const MAX_DOWNLOAD_CONCURRENCY: usize = 100;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its allowed range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Allowed range or constraint.
        reason: String,
    },
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the metadata API; requests go to `<api_base>/<id>`.
    pub api_base: String,
    /// Directory holding capture files, the pending store and all logs.
    pub work_dir: PathBuf,
    /// Destination directory for downloaded resources.
    pub download_dir: PathBuf,
    /// Pending store (wishlist) file name.
    pub pending_file: PathBuf,
    /// Failure log file name.
    pub failure_file: PathBuf,
    /// Resolution log file name.
    pub resolution_log: PathBuf,
    /// Download log file name.
    pub download_log: PathBuf,
    /// Resolution requests allowed per window.
    pub rate_limit_permits: usize,
    /// Rate limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Simultaneous downloads.
    pub download_concurrency: usize,
    /// Connect timeout for both HTTP clients.
    pub connect_timeout_secs: u64,
    /// Total timeout for one resolution request.
    pub resolve_timeout_secs: u64,
    /// Total timeout for one download request, body included.
    pub download_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            work_dir: PathBuf::from("."),
            download_dir: PathBuf::from("wallhaven_download"),
            pending_file: PathBuf::from("wishlist.txt"),
            failure_file: PathBuf::from("fails.txt"),
            resolution_log: PathBuf::from("src_wishlist.csv"),
            download_log: PathBuf::from("status_wishlist.csv"),
            rate_limit_permits: DEFAULT_RATE_LIMIT_PERMITS,
            rate_limit_window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            connect_timeout_secs: 30,
            resolve_timeout_secs: 60,
            download_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Loads a config file; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Loads `path` when given, else `wishlist.toml` in `dir` when present,
    /// else the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an existing file is unreadable or invalid.
    pub fn load(path: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let candidate = dir.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    Self::from_file(&candidate)
                } else {
                    debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.api_base).is_err() {
            return Err(ConfigError::Invalid {
                field: "api_base",
                reason: format!("'{}' is not an absolute URL", self.api_base),
            });
        }
        if self.rate_limit_permits == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit_permits",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit_window_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(MIN_DOWNLOAD_CONCURRENCY..=MAX_DOWNLOAD_CONCURRENCY)
            .contains(&self.download_concurrency)
        {
            return Err(ConfigError::Invalid {
                field: "download_concurrency",
                reason: format!(
                    "{} is outside {MIN_DOWNLOAD_CONCURRENCY}..={MAX_DOWNLOAD_CONCURRENCY}",
                    self.download_concurrency
                ),
            });
        }
        for (field, value) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("resolve_timeout_secs", self.resolve_timeout_secs),
            ("download_timeout_secs", self.download_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Rate limiter permits as a non-zero count (clamped to 1).
    #[must_use]
    pub fn rate_limit_permits(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.rate_limit_permits).unwrap_or(NonZeroUsize::MIN)
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Resolves a configured file name against the work directory.
    fn in_work_dir(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.work_dir.join(name)
        }
    }

    #[must_use]
    pub fn pending_path(&self) -> PathBuf {
        self.in_work_dir(&self.pending_file)
    }

    #[must_use]
    pub fn failure_path(&self) -> PathBuf {
        self.in_work_dir(&self.failure_file)
    }

    #[must_use]
    pub fn resolution_log_path(&self) -> PathBuf {
        self.in_work_dir(&self.resolution_log)
    }

    #[must_use]
    pub fn download_log_path(&self) -> PathBuf {
        self.in_work_dir(&self.download_log)
    }

    #[must_use]
    pub fn download_dir_path(&self) -> PathBuf {
        self.in_work_dir(&self.download_dir)
    }
}
