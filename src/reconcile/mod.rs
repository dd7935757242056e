//! Post-run reconciliation of the pending store against the run logs.
//!
//! The pass is synchronous and runs after all transfers have finished:
//!
//! 1. An identifier is *failed* when its latest resolution record is not a
//!    success, or when it has a download record whose latest outcome is not
//!    `saved`. It is *completed* when its latest download outcome is `saved`.
//! 2. Pending entries of failed identifiers are appended to the failure log
//!    (once per identifier), completed entries are dropped, and every other
//!    entry stays pending. The pending store is removed once it is empty.
//! 3. Both run logs are deleted.
//!
//! When neither log exists the pass does nothing, so running it twice in a
//! row leaves the files exactly as the first run left them.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::identifier::Identifier;
use crate::journal::{
    DownloadRecord, JournalError, ResolutionRecord, latest_by_id, read_records,
};
use crate::store::{IdentifierStore, StoreError, append_lines, read_lines, rewrite_lines};

/// Errors raised during reconciliation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A run log could not be read or is malformed.
    #[error("cannot read run log: {0}")]
    Journal(#[from] JournalError),

    /// The pending store or failure log could not be updated.
    #[error("cannot update identifier files: {0}")]
    Store(#[from] StoreError),

    /// A run log could not be removed.
    #[error("cannot remove run log {path}: {source}")]
    RemoveLog {
        /// Log path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// False when neither run log existed and nothing was touched.
    pub logs_found: bool,
    /// Identifiers whose pending entries moved to the failure log.
    pub failed: Vec<Identifier>,
    /// Pending entries dropped because their resource was saved.
    pub completed: usize,
    /// Pending entries left in place (no attempt recorded this run).
    pub kept: usize,
}

/// Classification of one identifier from the run logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Completed,
    Failed,
}

/// Folds run logs into the pending store and the failure log.
#[derive(Debug, Clone)]
pub struct Reconciler {
    pending: PathBuf,
    failures: PathBuf,
    resolution_log: PathBuf,
    download_log: PathBuf,
}

impl Reconciler {
    /// Creates a reconciler over the store's files and the two run logs.
    #[must_use]
    pub fn new(
        store: &IdentifierStore,
        resolution_log: impl Into<PathBuf>,
        download_log: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pending: store.pending_path().to_path_buf(),
            failures: store.failure_path().to_path_buf(),
            resolution_log: resolution_log.into(),
            download_log: download_log.into(),
        }
    }

    /// Runs one reconciliation pass.
    ///
    /// The failure log and pending store are written before the run logs are
    /// deleted, so an interrupted pass can simply be repeated.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] if a log is malformed or a file cannot be
    /// written or removed.
    #[instrument(skip(self), fields(pending = %self.pending.display()))]
    pub fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        let resolutions = read_records::<ResolutionRecord>(&self.resolution_log)?;
        let downloads = read_records::<DownloadRecord>(&self.download_log)?;

        if resolutions.is_none() && downloads.is_none() {
            info!("no run logs found, nothing to reconcile");
            return Ok(ReconcileReport::default());
        }

        let verdicts = classify(
            resolutions.unwrap_or_default(),
            downloads.unwrap_or_default(),
        );

        let mut report = ReconcileReport {
            logs_found: true,
            ..ReconcileReport::default()
        };
        let mut already_failed: HashSet<Identifier> = read_lines(&self.failures)?
            .iter()
            .filter_map(|line| Identifier::from_line(line))
            .collect();
        let mut to_fail = Vec::new();
        let mut keep = Vec::new();

        for line in read_lines(&self.pending)? {
            let verdict = Identifier::from_line(&line)
                .and_then(|id| verdicts.get(&id).map(|verdict| (id, *verdict)));
            match verdict {
                Some((_, Verdict::Completed)) => report.completed += 1,
                Some((id, Verdict::Failed)) => {
                    if already_failed.insert(id.clone()) {
                        to_fail.push(line);
                        report.failed.push(id);
                    } else {
                        debug!(id = %id, "already in failure log");
                    }
                }
                None => keep.push(line),
            }
        }
        report.kept = keep.len();

        if !to_fail.is_empty() {
            append_lines(&self.failures, &to_fail)?;
        }
        rewrite_lines(&self.pending, &keep)?;

        remove_log(&self.resolution_log)?;
        remove_log(&self.download_log)?;

        info!(
            failed = report.failed.len(),
            completed = report.completed,
            kept = report.kept,
            "reconciliation complete"
        );
        Ok(report)
    }
}

fn classify(
    resolutions: Vec<ResolutionRecord>,
    downloads: Vec<DownloadRecord>,
) -> HashMap<Identifier, Verdict> {
    let mut verdicts = HashMap::new();

    for (id, record) in latest_by_id(resolutions) {
        if !record.status().is_success() {
            verdicts.insert(id, Verdict::Failed);
        }
    }

    for (id, record) in latest_by_id(downloads) {
        let verdict = if record.outcome.is_saved() {
            Verdict::Completed
        } else {
            Verdict::Failed
        };
        verdicts
            .entry(id)
            .and_modify(|existing| {
                if verdict == Verdict::Failed {
                    *existing = Verdict::Failed;
                }
            })
            .or_insert(verdict);
    }

    verdicts
}

fn remove_log(path: &Path) -> Result<(), ReconcileError> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed run log");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ReconcileError::RemoveLog {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
