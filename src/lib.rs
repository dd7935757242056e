//! Wishlist Core Library
//!
//! This library turns a list of captured links into downloaded resources:
//! identifiers are resolved through a rate-limited metadata API, the resolved
//! URLs are downloaded with bounded concurrency, and a reconciliation pass
//! checkpoints the outcome so the next run only retries what failed.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`store`] - Pending store and capture-file ingestion
//! - [`rate_limiter`] - Rolling-window limiter shared by resolution requests
//! - [`resolver`] - Batched identifier → URL resolution
//! - [`download`] - Concurrency-bounded streaming downloads
//! - [`journal`] - Per-run CSV logs of resolution and download attempts
//! - [`reconcile`] - Folds run logs back into the pending store and failure log
//! - [`pipeline`] - Phase orchestration driven by [`Config`]

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod identifier;
pub mod journal;
pub mod pipeline;
pub mod rate_limiter;
pub mod reconcile;
pub mod resolver;
pub mod store;
mod user_agent;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use download::{DownloadError, DownloadStats, Downloader, EngineError, HttpClient};
pub use identifier::Identifier;
pub use journal::{
    DownloadOutcome, DownloadRecord, JournalError, RecordLog, ResolutionRecord, ResolutionStatus,
};
pub use pipeline::{Pipeline, PipelineError, PipelineSummary};
pub use rate_limiter::RateLimiter;
pub use reconcile::{ReconcileError, ReconcileReport, Reconciler};
pub use resolver::{ResolveError, ResolveStats, Resolver};
pub use store::{IdentifierStore, IngestReport, StoreError};
