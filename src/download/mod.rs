//! HTTP download engine for streaming resolved resources to disk.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Bounded concurrency through a counting semaphore
//! - Scratch file renamed into place only after the full body is written
//! - Failures recorded as [`DownloadOutcome`](crate::journal::DownloadOutcome)
//!   values, never raised
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use wishlist_core::download::HttpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(Duration::from_secs(30), Duration::from_secs(60))?;
//! let saved = client
//!     .download_to_dir("https://w.wallhaven.cc/full/85/wallhaven-8586my.jpg", Path::new("./wallhaven_download"))
//!     .await?;
//! println!("Downloaded: {}", saved.path.display());
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
mod filename;

pub use client::{HttpClient, SavedFile};
pub use engine::{
    DEFAULT_CONCURRENCY, DownloadStats, DownloadTarget, Downloader, targets_from_resolutions,
};
pub use error::{DownloadError, EngineError};
