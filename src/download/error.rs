//! Error types for the download module.
//!
//! [`DownloadError`] describes why a single transfer failed. It never aborts a
//! run: the engine converts it into a [`DownloadOutcome`] for the download log.
//! [`EngineError`] covers the failures that do stop the phase.

use std::path::PathBuf;

use thiserror::Error;

use crate::journal::{DownloadOutcome, JournalError};

use super::engine::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Errors that can occur while transferring one resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Any response other than 200.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the resource.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The resolved URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network or timeout error from a reqwest error.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// The outcome recorded in the download log for this failure.
    #[must_use]
    pub fn outcome(&self) -> DownloadOutcome {
        match self {
            Self::Timeout { .. } => DownloadOutcome::Timeout,
            Self::HttpStatus { status, .. } => DownloadOutcome::HttpError(*status),
            Self::Network { source, .. } => DownloadOutcome::NetworkError(source.to_string()),
            Self::InvalidUrl { url } => DownloadOutcome::NetworkError(format!("invalid URL: {url}")),
            Self::Io { path, source } => {
                DownloadOutcome::FileError(format!("{}: {source}", path.display()))
            }
        }
    }
}

/// Errors that abort a download run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The HTTP client could not be built.
    #[error("cannot build download HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Reading the resolution log or writing the download log failed.
    #[error("download log error: {0}")]
    Journal(#[from] JournalError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}
