//! Pending store ("wishlist") and capture-file ingestion.
//!
//! The pending store is a plain text file with one URL-or-identifier per line.
//! Upstream capture tools drop `captured_urls_*` files next to it;
//! [`IdentifierStore::ingest`] folds those into the store with set semantics
//! on the exact (trimmed) line content.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::identifier::Identifier;

/// Glob matched against file names in the work directory.
pub const CAPTURE_FILE_PATTERN: &str = "captured_urls_*";

/// Errors raised by the pending store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Resolution was requested but nothing has been captured yet.
    #[error("pending store {path} does not exist; capture some links first")]
    MissingPendingStore {
        /// Expected pending store path.
        path: PathBuf,
    },

    /// Reading or writing a store file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File or directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The capture file glob failed to compile.
    #[error("invalid capture pattern: {0}")]
    Pattern(#[from] globset::Error),
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Capture files consumed (and deleted).
    pub capture_files: usize,
    /// Whether the failure log was merged back in.
    pub reseeded_failures: bool,
    /// Lines added to the pending store.
    pub added: usize,
    /// Lines skipped because the store already held them.
    pub duplicates: usize,
}

/// File-backed pending identifier store.
#[derive(Debug, Clone)]
pub struct IdentifierStore {
    work_dir: PathBuf,
    pending: PathBuf,
    failures: PathBuf,
}

impl IdentifierStore {
    /// Creates a store rooted at `work_dir` with the given pending and
    /// failure log paths.
    #[must_use]
    pub fn new(
        work_dir: impl Into<PathBuf>,
        pending: impl Into<PathBuf>,
        failures: impl Into<PathBuf>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            pending: pending.into(),
            failures: failures.into(),
        }
    }

    #[must_use]
    pub fn pending_path(&self) -> &Path {
        &self.pending
    }

    #[must_use]
    pub fn failure_path(&self) -> &Path {
        &self.failures
    }

    /// Lists capture files in the work directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the directory cannot be listed.
    pub fn capture_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let matcher: GlobMatcher = Glob::new(CAPTURE_FILE_PATTERN)?.compile_matcher();
        let entries =
            fs::read_dir(&self.work_dir).map_err(|e| StoreError::io(&self.work_dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.work_dir, e))?;
            let path = entry.path();
            let matches_name = path
                .file_name()
                .is_some_and(|name| matcher.is_match(Path::new(name)));
            if matches_name && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Merges every capture file (and, when `reseed_failures` is set, the
    /// failure log) into the pending store, then deletes the merged sources.
    ///
    /// Lines are deduplicated on their trimmed content, against each other
    /// and against lines already in the pending store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any IO failure. Sources are only deleted
    /// after the pending store has been written.
    #[instrument(skip(self), fields(work_dir = %self.work_dir.display()))]
    pub fn ingest(&self, reseed_failures: bool) -> Result<IngestReport, StoreError> {
        let captures = self.capture_files()?;
        let mut sources = captures.clone();
        let reseed = reseed_failures && self.failures.is_file();
        if reseed {
            sources.push(self.failures.clone());
        }

        let mut seen: HashSet<String> = read_lines(&self.pending)?.into_iter().collect();
        let mut fresh = Vec::new();
        let mut duplicates = 0;

        for source in &sources {
            for line in read_lines(source)? {
                if seen.insert(line.clone()) {
                    fresh.push(line);
                } else {
                    duplicates += 1;
                }
            }
            debug!(source = %source.display(), "read capture source");
        }

        if !fresh.is_empty() {
            append_lines(&self.pending, &fresh)?;
        }

        for source in &sources {
            fs::remove_file(source).map_err(|e| StoreError::io(source, e))?;
        }

        let report = IngestReport {
            capture_files: captures.len(),
            reseeded_failures: reseed,
            added: fresh.len(),
            duplicates,
        };
        info!(
            capture_files = report.capture_files,
            reseeded_failures = report.reseeded_failures,
            added = report.added,
            duplicates = report.duplicates,
            "ingested captured links"
        );
        Ok(report)
    }

    /// Reads the pending store and returns its unique identifiers in
    /// first-seen order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingPendingStore`] if the store does not
    /// exist; this aborts a pipeline run.
    pub fn load_identifiers(&self) -> Result<Vec<Identifier>, StoreError> {
        if !self.pending.is_file() {
            return Err(StoreError::MissingPendingStore {
                path: self.pending.clone(),
            });
        }

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for line in read_lines(&self.pending)? {
            match Identifier::from_line(&line) {
                Some(id) => {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
                None => warn!(line = %line, "skipping pending entry without identifier"),
            }
        }
        debug!(count = ids.len(), "loaded pending identifiers");
        Ok(ids)
    }
}

/// Reads non-empty trimmed lines; a missing file reads as empty.
pub(crate) fn read_lines(path: &Path) -> Result<Vec<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Appends lines to `path`, creating it when absent.
///
/// A hand-edited file whose last line has no terminator gets one first, so
/// the existing entry and the first appended one stay on separate lines.
pub(crate) fn append_lines(path: &Path, lines: &[String]) -> Result<(), StoreError> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    if missing_final_newline(&mut file).map_err(|e| StoreError::io(path, e))? {
        file.write_all(b"\n").map_err(|e| StoreError::io(path, e))?;
    }
    for line in lines {
        writeln!(file, "{line}").map_err(|e| StoreError::io(path, e))?;
    }
    file.sync_all().map_err(|e| StoreError::io(path, e))
}

fn missing_final_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Replaces the contents of `path` with `lines`, removing the file when
/// there are none.
pub(crate) fn rewrite_lines(path: &Path, lines: &[String]) -> Result<(), StoreError> {
    if lines.is_empty() {
        return match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        };
    }

    let tmp = path.with_extension("tmp");
    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(&tmp, contents).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}
