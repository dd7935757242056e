//! Phase orchestration: ingest → resolve → download → reconcile.
//!
//! Each phase can run on its own (the CLI exposes one subcommand per phase)
//! or in sequence through [`Pipeline::run`]. Phases communicate only through
//! files in the work directory, so a run interrupted between phases can be
//! resumed by invoking the remaining phases.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use crate::config::{Config, ConfigError};
use crate::download::{DownloadStats, Downloader, EngineError, HttpClient};
use crate::journal::{JournalError, RecordLog};
use crate::rate_limiter::RateLimiter;
use crate::reconcile::{ReconcileError, ReconcileReport, Reconciler};
use crate::resolver::{ResolveError, ResolveStats, Resolver};
use crate::store::{IdentifierStore, IngestReport, StoreError};

/// Errors that stop a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Download(#[from] EngineError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Per-phase results of a full run.
#[derive(Debug)]
pub struct PipelineSummary {
    /// Reconcile pass over logs left behind by an interrupted run.
    pub recovered: ReconcileReport,
    pub ingest: IngestReport,
    pub resolve: ResolveStats,
    pub download: DownloadStats,
    pub reconcile: ReconcileReport,
}

impl fmt::Display for PipelineSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recovered.logs_found {
            writeln!(
                f,
                "recovered: {} failed, {} completed from an interrupted run",
                self.recovered.failed.len(),
                self.recovered.completed
            )?;
        }
        writeln!(
            f,
            "ingest:    {} capture file(s), {} added, {} duplicate(s)",
            self.ingest.capture_files, self.ingest.added, self.ingest.duplicates
        )?;
        writeln!(
            f,
            "resolve:   {} attempted, {} succeeded, {} failed ({} rate limited) in {} batch(es)",
            self.resolve.attempted,
            self.resolve.succeeded,
            self.resolve.failed,
            self.resolve.rate_limited,
            self.resolve.batches
        )?;
        writeln!(
            f,
            "download:  {} attempted, {} succeeded, {} failed",
            self.download.attempted(),
            self.download.succeeded(),
            self.download.failed()
        )?;
        write!(
            f,
            "reconcile: {} failed, {} completed, {} still pending",
            self.reconcile.failed.len(),
            self.reconcile.completed,
            self.reconcile.kept
        )
    }
}

/// Runs pipeline phases against one validated [`Config`].
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    limiter: Arc<RateLimiter>,
    progress: Option<Arc<DownloadStats>>,
}

impl Pipeline {
    /// Validates `config` and builds the shared rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if a value is out of range.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_permits(),
            config.rate_limit_window(),
        ));
        Ok(Self {
            config,
            limiter,
            progress: None,
        })
    }

    /// Download phases report into `progress` while they run.
    #[must_use]
    pub fn with_download_progress(mut self, progress: Arc<DownloadStats>) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The pending store and failure log described by the config.
    #[must_use]
    pub fn store(&self) -> IdentifierStore {
        IdentifierStore::new(
            &self.config.work_dir,
            self.config.pending_path(),
            self.config.failure_path(),
        )
    }

    /// Folds capture files (and optionally the failure log) into the
    /// pending store.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] on IO failure.
    pub fn ingest(&self, reseed_failures: bool) -> Result<IngestReport, PipelineError> {
        Ok(self.store().ingest(reseed_failures)?)
    }

    /// Resolves every pending identifier into a fresh resolution log.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the pending store is missing, or
    /// a resolve/journal error if the log cannot be written.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> Result<ResolveStats, PipelineError> {
        let ids = self.store().load_identifiers()?;
        let resolver = Resolver::new(
            &self.config.api_base,
            Arc::clone(&self.limiter),
            self.config.connect_timeout(),
            self.config.resolve_timeout(),
        )?;
        let mut log = RecordLog::create(&self.config.resolution_log_path()).await?;
        Ok(resolver.resolve_all(&ids, &mut log).await?)
    }

    /// Downloads every resolved resource into a fresh download log.
    ///
    /// Without a resolution log there is nothing to download and no download
    /// log is created.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Download`] or [`PipelineError::Journal`] if
    /// a log cannot be read or written.
    #[instrument(skip(self))]
    pub async fn download(&self) -> Result<DownloadStats, PipelineError> {
        let resolution_log = self.config.resolution_log_path();
        if !resolution_log.is_file() {
            info!(path = %resolution_log.display(), "no resolution log, skipping downloads");
            return Ok(DownloadStats::new());
        }

        let client = HttpClient::new(
            self.config.connect_timeout(),
            self.config.download_timeout(),
        )
        .map_err(EngineError::Client)?;
        let mut downloader = Downloader::new(self.config.download_concurrency, client)?;
        if let Some(progress) = &self.progress {
            downloader = downloader.with_progress(Arc::clone(progress));
        }
        let mut log = RecordLog::create(&self.config.download_log_path()).await?;
        Ok(downloader
            .download_from_log(&resolution_log, &self.config.download_dir_path(), &mut log)
            .await?)
    }

    /// Folds the run logs into the pending store and failure log.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Reconcile`] on malformed logs or IO failure.
    pub fn reconcile(&self) -> Result<ReconcileReport, PipelineError> {
        let reconciler = Reconciler::new(
            &self.store(),
            self.config.resolution_log_path(),
            self.config.download_log_path(),
        );
        Ok(reconciler.reconcile()?)
    }

    /// Runs all four phases in order.
    ///
    /// Run logs left behind by an interrupted run are reconciled first, so
    /// items they record as saved are neither resolved nor downloaded again.
    /// If that leaves nothing pending, resolve and download are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal phase error; per-item failures are only
    /// reflected in the summary.
    #[instrument(skip(self), fields(work_dir = %self.config.work_dir.display()))]
    pub async fn run(&self) -> Result<PipelineSummary, PipelineError> {
        let recovered = self.reconcile()?;
        if recovered.logs_found {
            info!(
                failed = recovered.failed.len(),
                completed = recovered.completed,
                "reconciled logs from an interrupted run"
            );
        }

        let ingest = self.ingest(false)?;
        let (resolve, download) = if recovered.logs_found && !self.config.pending_path().is_file()
        {
            info!("nothing left pending after recovery");
            (ResolveStats::default(), DownloadStats::new())
        } else {
            (self.resolve().await?, self.download().await?)
        };
        let reconcile = self.reconcile()?;

        let summary = PipelineSummary {
            recovered,
            ingest,
            resolve,
            download,
            reconcile,
        };
        info!(
            resolved = summary.resolve.succeeded,
            downloaded = summary.download.succeeded(),
            failed = summary.reconcile.failed.len(),
            "run complete"
        );
        Ok(summary)
    }
}
