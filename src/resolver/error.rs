//! Error types for the resolution phase.
//!
//! Per-identifier failures are not errors here: they become
//! [`ResolutionStatus`](crate::journal::ResolutionStatus) values in the log.
//! Only failures that stop the whole phase are represented.

use thiserror::Error;

use crate::journal::JournalError;

/// Errors that abort a resolution run.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The HTTP client could not be built.
    #[error("cannot build resolver HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The API base is not a usable URL.
    #[error("invalid API base '{base}'\n  Suggestion: use an absolute http(s) URL such as https://wallhaven.cc/api/v1/w")]
    InvalidApiBase {
        /// The configured base.
        base: String,
    },

    /// Writing the resolution log failed.
    #[error("resolution log write failed: {0}")]
    Journal(#[from] JournalError),
}
