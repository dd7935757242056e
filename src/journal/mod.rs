//! Durable per-run CSV logs of resolution and download attempts.
//!
//! Both logs are transient per run: [`RecordLog::create`] truncates the file
//! and writes the header, every [`RecordLog::append`] writes and flushes one
//! row, and the reconciler deletes the file once its contents have been
//! folded into the pending store and the failure log.
//!
//! Rows are appended in completion order. Readers must match records by
//! identifier; [`latest_by_id`] applies last-write-wins by file order.

mod record;

pub use record::{
    DownloadOutcome, DownloadRecord, DownloadRow, LogRecord, ResolutionRecord, ResolutionRow,
    ResolutionStatus,
};

use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::identifier::Identifier;

/// Errors raised while writing or reading a record log.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The log file could not be created, written or read.
    #[error("IO error on log {path}: {source}")]
    Io {
        /// Log file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding failed.
    #[error("CSV error on log {path}: {source}")]
    Csv {
        /// Log file path.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// A row decoded but violates the record invariants.
    #[error("invalid record in {path} at line {line}: {reason}")]
    InvalidRecord {
        /// Log file path.
        path: PathBuf,
        /// 1-based line number of the offending row.
        line: u64,
        /// What was wrong with the row.
        reason: String,
    },
}

impl JournalError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Append-only writer for one record log.
#[derive(Debug)]
pub struct RecordLog<T> {
    path: PathBuf,
    file: File,
    written: usize,
    _record: PhantomData<fn(&T)>,
}

impl<T: LogRecord> RecordLog<T> {
    /// Creates (or truncates) the log at `path` and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the file cannot be created or written.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn create(path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JournalError::io(parent, e))?;
        }

        let mut file = File::create(path)
            .await
            .map_err(|e| JournalError::io(path, e))?;

        let mut header = csv::Writer::from_writer(Vec::new());
        header
            .write_record(T::HEADER)
            .map_err(|e| JournalError::csv(path, e))?;
        let bytes = header
            .into_inner()
            .map_err(|e| JournalError::io(path, e.into_error()))?;

        file.write_all(&bytes)
            .await
            .map_err(|e| JournalError::io(path, e))?;
        file.flush().await.map_err(|e| JournalError::io(path, e))?;

        debug!(header = ?T::HEADER, "created record log");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written: 0,
            _record: PhantomData,
        })
    }

    /// Appends one record and flushes it so it survives an interruption.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if encoding or writing fails.
    pub async fn append(&mut self, record: &T) -> Result<(), JournalError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .serialize(record.to_row())
            .map_err(|e| JournalError::csv(&self.path, e))?;
        let bytes = writer
            .into_inner()
            .map_err(|e| JournalError::io(&self.path, e.into_error()))?;

        self.file
            .write_all(&bytes)
            .await
            .map_err(|e| JournalError::io(&self.path, e))?;
        self.file
            .flush()
            .await
            .map_err(|e| JournalError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Number of records appended through this writer.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses every record from CSV bytes read from `path`.
///
/// # Errors
///
/// Returns [`JournalError::Csv`] for malformed CSV and
/// [`JournalError::InvalidRecord`] for rows that break record invariants.
pub fn parse_records<T: LogRecord>(path: &Path, bytes: &[u8]) -> Result<Vec<T>, JournalError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let mut records = Vec::new();

    for row in reader.deserialize::<T::Row>() {
        let row = row.map_err(|e| JournalError::csv(path, e))?;
        let record = T::from_row(row).map_err(|reason| JournalError::InvalidRecord {
            path: path.to_path_buf(),
            line: records.len() as u64 + 2,
            reason,
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Reads a record log synchronously.
///
/// Returns `Ok(None)` when the log does not exist.
///
/// # Errors
///
/// Returns [`JournalError`] if the file exists but cannot be read or parsed.
pub fn read_records<T: LogRecord>(path: &Path) -> Result<Option<Vec<T>>, JournalError> {
    match std::fs::read(path) {
        Ok(bytes) => parse_records(path, &bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(JournalError::io(path, e)),
    }
}

/// Async counterpart of [`read_records`].
///
/// # Errors
///
/// Returns [`JournalError`] if the file exists but cannot be read or parsed.
pub async fn read_records_async<T: LogRecord>(
    path: &Path,
) -> Result<Option<Vec<T>>, JournalError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => parse_records(path, &bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(JournalError::io(path, e)),
    }
}

/// Collapses records to the last one seen for each identifier.
#[must_use]
pub fn latest_by_id<T: LogRecord>(records: Vec<T>) -> HashMap<Identifier, T> {
    let mut latest = HashMap::with_capacity(records.len());
    for record in records {
        latest.insert(record.identifier().clone(), record);
    }
    latest
}
