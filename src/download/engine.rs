//! Download engine for concurrency-bounded resource transfers.
//!
//! The engine reads the resolution log, keeps the identifiers whose latest
//! record is a success, and transfers each resolved URL with at most
//! `concurrency` transfers in flight. Every attempt becomes one
//! [`DownloadRecord`], appended to the download log in completion order.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use wishlist_core::RecordLog;
//! use wishlist_core::download::{Downloader, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(Duration::from_secs(30), Duration::from_secs(60))?;
//! let downloader = Downloader::new(4, client)?;
//! let mut log = RecordLog::create(Path::new("status_wishlist.csv")).await?;
//! let stats = downloader
//!     .download_from_log(Path::new("src_wishlist.csv"), Path::new("wallhaven_download"), &mut log)
//!     .await?;
//! println!("Saved: {}, Failed: {}", stats.succeeded(), stats.failed());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::HttpClient;
use super::error::EngineError;
use super::filename::{claim_filename, filename_for_url};
use crate::config::{
    DEFAULT_DOWNLOAD_CONCURRENCY, MAX_DOWNLOAD_CONCURRENCY, MIN_DOWNLOAD_CONCURRENCY,
};
use crate::identifier::Identifier;
use crate::journal::{
    DownloadOutcome, DownloadRecord, RecordLog, ResolutionRecord, latest_by_id,
    read_records_async,
};

/// Minimum allowed concurrency value.
pub(crate) const MIN_CONCURRENCY: usize = MIN_DOWNLOAD_CONCURRENCY;

/// Maximum allowed concurrency value.
pub(crate) const MAX_CONCURRENCY: usize = MAX_DOWNLOAD_CONCURRENCY;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = DEFAULT_DOWNLOAD_CONCURRENCY;

/// One transfer to perform: an identifier and its resolved URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Identifier the URL was resolved from.
    pub id: Identifier,
    /// Resolved resource URL.
    pub url: String,
}

/// Selects download targets from resolution records.
///
/// Only identifiers whose latest record is a success are kept, once each,
/// in order of first appearance in the log.
#[must_use]
pub fn targets_from_resolutions(records: Vec<ResolutionRecord>) -> Vec<DownloadTarget> {
    let order: Vec<Identifier> = records.iter().map(|r| r.id().clone()).collect();
    let latest = latest_by_id(records);
    let mut seen = HashSet::new();

    order
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .filter_map(|id| {
            let record = latest.get(&id)?;
            let url = record.resolved_url()?;
            Some(DownloadTarget {
                url: url.to_string(),
                id,
            })
        })
        .collect()
}

/// Statistics from a download run.
///
/// Uses atomic counters for thread-safe updates from concurrent transfer
/// tasks. `peak_in_flight` is the largest number of transfers that held an
/// admission permit at the same time.
#[derive(Debug, Default)]
pub struct DownloadStats {
    queued: AtomicUsize,
    attempted: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of targets in the current or last run.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Returns the number of transfers that have finished, saved or not.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.succeeded() + self.failed()
    }

    /// Returns the number of transfers attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Returns the number of resources saved.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Returns the number of failed transfers.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the highest number of simultaneous transfers observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn begin(&self, queued: usize) {
        for counter in [
            &self.attempted,
            &self.succeeded,
            &self.failed,
            &self.in_flight,
            &self.peak_in_flight,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.queued.store(queued, Ordering::SeqCst);
    }

    fn start_transfer(&self) {
        self.attempted.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn finish_transfer(&self, outcome: &DownloadOutcome) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if outcome.is_saved() {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot(&self) -> Self {
        Self {
            queued: AtomicUsize::new(self.queued()),
            attempted: AtomicUsize::new(self.attempted()),
            succeeded: AtomicUsize::new(self.succeeded()),
            failed: AtomicUsize::new(self.failed()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(self.peak_in_flight()),
        }
    }
}

/// Download engine with a fixed admission limit.
///
/// # Concurrency Model
///
/// - Each transfer runs in its own Tokio task
/// - A semaphore permit is acquired before the request is sent
/// - Permits are released automatically when transfers complete (RAII)
/// - Results are collected in completion order and logged by the caller's task
#[derive(Debug)]
pub struct Downloader {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    client: HttpClient,
    progress: Option<Arc<DownloadStats>>,
}

impl Downloader {
    /// Creates a downloader allowing at most `concurrency` transfers at once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use wishlist_core::download::{Downloader, HttpClient};
    ///
    /// let client = HttpClient::new(Duration::from_secs(30), Duration::from_secs(60)).unwrap();
    /// let downloader = Downloader::new(4, client).unwrap();
    /// assert_eq!(downloader.concurrency(), 4);
    /// ```
    #[instrument(level = "debug", skip(client))]
    pub fn new(concurrency: usize, client: HttpClient) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, "creating downloader");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            client,
            progress: None,
        })
    }

    /// Reports into `progress` while transfers run, so another task can
    /// poll it. The counters are reset at the start of every run.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<DownloadStats>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Downloads every successful resolution in `resolution_log`.
    ///
    /// An absent resolution log means there is nothing to transfer: the run
    /// returns empty stats and `log` receives no rows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Journal`] if the resolution log is malformed or
    /// the download log cannot be written.
    #[instrument(skip_all, fields(resolution_log = %resolution_log.display()))]
    pub async fn download_from_log(
        &self,
        resolution_log: &Path,
        output_dir: &Path,
        log: &mut RecordLog<DownloadRecord>,
    ) -> Result<DownloadStats, EngineError> {
        let Some(records) = read_records_async::<ResolutionRecord>(resolution_log).await? else {
            info!("no resolution log, nothing to download");
            return Ok(DownloadStats::new());
        };
        let targets = targets_from_resolutions(records);
        self.download_all(targets, output_dir, log).await
    }

    /// Transfers all targets, appending one record per attempt to `log`.
    ///
    /// Output names are assigned before any transfer starts. When two
    /// targets share a final URL segment, the first keeps the plain name and
    /// later ones are tagged with their identifier (`img-y.jpg`).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Journal`] if the download log cannot be written.
    ///
    /// Note: Individual transfer failures do NOT cause this method to error.
    /// They are recorded in the log and counted in stats.
    #[instrument(skip_all, fields(count = targets.len(), output_dir = %output_dir.display()))]
    pub async fn download_all(
        &self,
        targets: Vec<DownloadTarget>,
        output_dir: &Path,
        log: &mut RecordLog<DownloadRecord>,
    ) -> Result<DownloadStats, EngineError> {
        let total = targets.len();
        let stats = self
            .progress
            .as_ref()
            .map_or_else(|| Arc::new(DownloadStats::new()), Arc::clone);
        stats.begin(total);
        let mut tasks = JoinSet::new();

        info!(targets = total, concurrency = self.concurrency, "starting downloads");

        let mut taken = HashSet::new();
        for target in targets {
            let file_name = claim_filename(
                &mut taken,
                filename_for_url(&target.url),
                target.id.as_str(),
            );
            let semaphore = Arc::clone(&self.semaphore);
            let client = self.client.clone();
            let stats = Arc::clone(&stats);
            let output_dir: PathBuf = output_dir.to_path_buf();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::SemaphoreClosed)?;

                stats.start_transfer();
                let outcome = match client
                    .download_as(&target.url, &output_dir, &file_name)
                    .await
                {
                    Ok(saved) => {
                        debug!(id = %target.id, path = %saved.path.display(), bytes = saved.bytes, "saved");
                        DownloadOutcome::Saved
                    }
                    Err(e) => {
                        debug!(id = %target.id, error = %e, "transfer failed");
                        e.outcome()
                    }
                };
                stats.finish_transfer(&outcome);

                Ok::<_, EngineError>(DownloadRecord::new(target.id, target.url, outcome))
            });
        }

        let mut done = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let record = match joined {
                Ok(result) => result?,
                Err(e) => {
                    warn!(error = %e, "download task panicked");
                    continue;
                }
            };
            done += 1;
            report_download(&record, done, total);
            log.append(&record).await?;
        }

        let stats = Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot());
        info!(
            attempted = stats.attempted(),
            succeeded = stats.succeeded(),
            failed = stats.failed(),
            peak_in_flight = stats.peak_in_flight(),
            "downloads complete"
        );
        Ok(stats)
    }
}

fn report_download(record: &DownloadRecord, done: usize, total: usize) {
    if record.outcome.is_saved() {
        info!(id = %record.id, done, total, "downloaded");
    } else {
        warn!(
            id = %record.id,
            url = %record.url,
            outcome = %record.outcome,
            done,
            total,
            "download failed"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::journal::ResolutionStatus;

    fn id(raw: &str) -> Identifier {
        Identifier::new(raw).unwrap()
    }

    fn client() -> HttpClient {
        HttpClient::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_downloader_rejects_zero_concurrency() {
        let result = Downloader::new(0, client());
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_downloader_rejects_excessive_concurrency() {
        let result = Downloader::new(101, client());
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_downloader_accepts_bounds() {
        assert_eq!(Downloader::new(1, client()).unwrap().concurrency(), 1);
        assert_eq!(Downloader::new(100, client()).unwrap().concurrency(), 100);
    }

    #[test]
    fn test_targets_keep_only_successes() {
        let records = vec![
            ResolutionRecord::success(id("a1"), "https://cdn/a1.jpg"),
            ResolutionRecord::failure(id("b2"), ResolutionStatus::RateLimited),
            ResolutionRecord::success(id("c3"), "https://cdn/c3.jpg"),
        ];
        let targets = targets_from_resolutions(records);
        let ids: Vec<&str> = targets.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "c3"]);
        assert_eq!(targets[0].url, "https://cdn/a1.jpg");
    }

    #[test]
    fn test_targets_use_latest_record_once() {
        let records = vec![
            ResolutionRecord::success(id("a1"), "https://cdn/old.jpg"),
            ResolutionRecord::success(id("a1"), "https://cdn/new.jpg"),
            ResolutionRecord::success(id("b2"), "https://cdn/b2.jpg"),
            ResolutionRecord::failure(id("b2"), ResolutionStatus::HttpError(404)),
        ];
        let targets = targets_from_resolutions(records);
        assert_eq!(
            targets,
            vec![DownloadTarget {
                id: id("a1"),
                url: "https://cdn/new.jpg".to_string()
            }]
        );
    }

    #[test]
    fn test_stats_track_peak_in_flight() {
        let stats = DownloadStats::new();
        stats.start_transfer();
        stats.start_transfer();
        stats.finish_transfer(&DownloadOutcome::Saved);
        stats.start_transfer();
        stats.finish_transfer(&DownloadOutcome::Timeout);
        stats.finish_transfer(&DownloadOutcome::HttpError(500));

        assert_eq!(stats.attempted(), 3);
        assert_eq!(stats.succeeded(), 1);
        assert_eq!(stats.failed(), 2);
        assert_eq!(stats.peak_in_flight(), 2);
    }

    #[test]
    fn test_stats_begin_resets_counters_for_next_run() {
        let stats = DownloadStats::new();
        stats.begin(2);
        stats.start_transfer();
        stats.finish_transfer(&DownloadOutcome::Saved);
        assert_eq!(stats.finished(), 1);

        stats.begin(5);
        assert_eq!(stats.queued(), 5);
        assert_eq!(stats.attempted(), 0);
        assert_eq!(stats.finished(), 0);
        assert_eq!(stats.peak_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_shared_progress_reflects_finished_run() {
        let temp = tempfile::TempDir::new().unwrap();
        let log_path = temp.path().join("status_wishlist.csv");
        let progress = Arc::new(DownloadStats::new());
        let downloader = Downloader::new(2, client())
            .unwrap()
            .with_progress(Arc::clone(&progress));

        let mut log = RecordLog::create(&log_path).await.unwrap();
        let targets = vec![DownloadTarget {
            id: id("bad"),
            url: "not a url".to_string(),
        }];
        let stats = downloader
            .download_all(targets, temp.path(), &mut log)
            .await
            .unwrap();

        assert_eq!(stats.queued(), 1);
        assert_eq!(stats.failed(), 1);
        assert_eq!(progress.queued(), 1);
        assert_eq!(progress.finished(), 1);
    }
}
