//! Typed resolution and download records and their CSV row shapes.
//!
//! Status columns are encoded as `kind` or `kind:detail`:
//!
//! | record     | encodings                                                                  |
//! |------------|----------------------------------------------------------------------------|
//! | resolution | `success`, `rate-limited`, `http-error:<code>`, `transport-error:<msg>`    |
//! | download   | `saved`, `timeout`, `http-error:<code>`, `network-error:<msg>`, `file-error:<msg>` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// Outcome of one resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStatus {
    /// HTTP 200 with a usable resource path.
    Success,
    /// HTTP 429; eligible for retry on a later run.
    RateLimited,
    /// Any other HTTP status.
    HttpError(u16),
    /// Connection, timeout or body decoding failure.
    TransportError(String),
}

impl ResolutionStatus {
    /// Returns true for [`ResolutionStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::RateLimited => f.write_str("rate-limited"),
            Self::HttpError(code) => write!(f, "http-error:{code}"),
            Self::TransportError(message) => write!(f, "transport-error:{message}"),
        }
    }
}

impl FromStr for ResolutionStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, detail) = split_status(raw);
        match (kind, detail) {
            ("success", None) => Ok(Self::Success),
            ("rate-limited", None) => Ok(Self::RateLimited),
            ("http-error", Some(code)) => parse_code(code).map(Self::HttpError),
            ("transport-error", Some(message)) => Ok(Self::TransportError(message.to_string())),
            _ => Err(format!("unknown resolution status '{raw}'")),
        }
    }
}

/// Outcome of one download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The complete body was written and renamed into place.
    Saved,
    /// The request or body transfer timed out.
    Timeout,
    /// The origin answered with a status other than 200.
    HttpError(u16),
    /// Connection or stream failure.
    NetworkError(String),
    /// Creating, writing or renaming the destination file failed.
    FileError(String),
}

impl DownloadOutcome {
    /// Returns true for [`DownloadOutcome::Saved`].
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved => f.write_str("saved"),
            Self::Timeout => f.write_str("timeout"),
            Self::HttpError(code) => write!(f, "http-error:{code}"),
            Self::NetworkError(message) => write!(f, "network-error:{message}"),
            Self::FileError(message) => write!(f, "file-error:{message}"),
        }
    }
}

impl FromStr for DownloadOutcome {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, detail) = split_status(raw);
        match (kind, detail) {
            ("saved", None) => Ok(Self::Saved),
            ("timeout", None) => Ok(Self::Timeout),
            ("http-error", Some(code)) => parse_code(code).map(Self::HttpError),
            ("network-error", Some(message)) => Ok(Self::NetworkError(message.to_string())),
            ("file-error", Some(message)) => Ok(Self::FileError(message.to_string())),
            _ => Err(format!("unknown download outcome '{raw}'")),
        }
    }
}

fn split_status(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(':') {
        Some((kind, detail)) => (kind.trim(), Some(detail)),
        None => (raw.trim(), None),
    }
}

fn parse_code(code: &str) -> Result<u16, String> {
    code.trim()
        .parse::<u16>()
        .map_err(|_| format!("invalid HTTP status code '{code}'"))
}

/// One line of the resolution log.
///
/// Construct through [`ResolutionRecord::success`] or
/// [`ResolutionRecord::failure`]; the URL is present exactly when the status
/// is [`ResolutionStatus::Success`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRecord {
    id: Identifier,
    status: ResolutionStatus,
    resolved_url: Option<String>,
}

impl ResolutionRecord {
    /// A successful resolution to `url`.
    ///
    /// An empty `url` is not a usable resolution and is recorded as a
    /// transport error instead.
    #[must_use]
    pub fn success(id: Identifier, url: impl Into<String>) -> Self {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return Self::failure(
                id,
                ResolutionStatus::TransportError("empty resource path in response".to_string()),
            );
        }
        Self {
            id,
            status: ResolutionStatus::Success,
            resolved_url: Some(url),
        }
    }

    /// A failed resolution. A `Success` status passed here is downgraded to a
    /// transport error because there is no URL to go with it.
    #[must_use]
    pub fn failure(id: Identifier, status: ResolutionStatus) -> Self {
        let status = if status.is_success() {
            ResolutionStatus::TransportError("success without resource path".to_string())
        } else {
            status
        };
        Self {
            id,
            status,
            resolved_url: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    #[must_use]
    pub fn status(&self) -> &ResolutionStatus {
        &self.status
    }

    /// The direct resource URL; `Some` iff the status is success.
    #[must_use]
    pub fn resolved_url(&self) -> Option<&str> {
        self.resolved_url.as_deref()
    }
}

/// CSV row shape for the resolution log (`id,status,url`).
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct ResolutionRow {
    id: String,
    status: String,
    url: String,
}

impl From<&ResolutionRecord> for ResolutionRow {
    fn from(record: &ResolutionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            status: record.status.to_string(),
            url: record.resolved_url.clone().unwrap_or_default(),
        }
    }
}

impl TryFrom<ResolutionRow> for ResolutionRecord {
    type Error = String;

    fn try_from(row: ResolutionRow) -> Result<Self, Self::Error> {
        let id = Identifier::new(row.id).ok_or_else(|| "empty id".to_string())?;
        let status: ResolutionStatus = row.status.parse()?;
        let url = row.url.trim();
        match (status.is_success(), url.is_empty()) {
            (true, false) => Ok(Self {
                id,
                status,
                resolved_url: Some(url.to_string()),
            }),
            (false, true) => Ok(Self {
                id,
                status,
                resolved_url: None,
            }),
            (true, true) => Err(format!("success row for '{id}' has no url")),
            (false, false) => Err(format!("non-success row for '{id}' carries a url")),
        }
    }
}

/// One line of the download log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub id: Identifier,
    pub url: String,
    pub outcome: DownloadOutcome,
}

impl DownloadRecord {
    #[must_use]
    pub fn new(id: Identifier, url: impl Into<String>, outcome: DownloadOutcome) -> Self {
        Self {
            id,
            url: url.into(),
            outcome,
        }
    }
}

/// CSV row shape for the download log (`id,url,download_status`).
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadRow {
    id: String,
    url: String,
    download_status: String,
}

impl From<&DownloadRecord> for DownloadRow {
    fn from(record: &DownloadRecord) -> Self {
        Self {
            id: record.id.to_string(),
            url: record.url.clone(),
            download_status: record.outcome.to_string(),
        }
    }
}

impl TryFrom<DownloadRow> for DownloadRecord {
    type Error = String;

    fn try_from(row: DownloadRow) -> Result<Self, Self::Error> {
        let id = Identifier::new(row.id).ok_or_else(|| "empty id".to_string())?;
        let outcome = row.download_status.parse()?;
        Ok(Self {
            id,
            url: row.url,
            outcome,
        })
    }
}

/// Ties a typed record to its CSV row shape.
pub trait LogRecord: Sized {
    /// Header columns written when the log is created.
    const HEADER: &'static [&'static str];

    #[doc(hidden)]
    type Row: Serialize + for<'de> Deserialize<'de>;

    #[doc(hidden)]
    fn to_row(&self) -> Self::Row;

    #[doc(hidden)]
    fn from_row(row: Self::Row) -> Result<Self, String>;

    /// Identifier the record belongs to.
    fn identifier(&self) -> &Identifier;
}

impl LogRecord for ResolutionRecord {
    const HEADER: &'static [&'static str] = &["id", "status", "url"];
    type Row = ResolutionRow;

    fn to_row(&self) -> Self::Row {
        ResolutionRow::from(self)
    }

    fn from_row(row: Self::Row) -> Result<Self, String> {
        Self::try_from(row)
    }

    fn identifier(&self) -> &Identifier {
        &self.id
    }
}

impl LogRecord for DownloadRecord {
    const HEADER: &'static [&'static str] = &["id", "url", "download_status"];
    type Row = DownloadRow;

    fn to_row(&self) -> Self::Row {
        DownloadRow::from(self)
    }

    fn from_row(row: Self::Row) -> Result<Self, String> {
        Self::try_from(row)
    }

    fn identifier(&self) -> &Identifier {
        &self.id
    }
}
