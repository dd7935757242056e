//! Identifier extraction from captured lines.
//!
//! Capture files and the pending store hold one entry per line. An entry is
//! either a bare identifier (`abc123`), a URL (`https://wallhaven.cc/w/abc123`)
//! or a timestamped capture (`[2024-01-01 10:00:00] https://wallhaven.cc/w/abc123`).
//! In every case the identifier is the final path segment of the URL.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

/// Regex pattern for finding URLs in a captured line.
#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"'\]]+"#).expect("URL regex is valid") // Static pattern, safe to panic
});

/// Opaque token naming one page to resolve and download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Wraps an already-extracted identifier.
    ///
    /// Returns `None` for empty or whitespace-only input.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == raw.len() {
            Some(Self(raw))
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Extracts the identifier from one pending-store or capture line.
    ///
    /// # Examples
    ///
    /// ```
    /// use wishlist_core::Identifier;
    ///
    /// let id = Identifier::from_line("[2024-01-01 10:00:00] https://wallhaven.cc/w/abc123").unwrap();
    /// assert_eq!(id.as_str(), "abc123");
    ///
    /// let id = Identifier::from_line("zx9qpl").unwrap();
    /// assert_eq!(id.as_str(), "zx9qpl");
    ///
    /// assert!(Identifier::from_line("   ").is_none());
    /// ```
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(found) = URL_PATTERN.find(line)
            && let Some(segment) = last_path_segment(found.as_str())
        {
            trace!(line, id = %segment, "identifier from URL");
            return Self::new(segment);
        }

        let token = line.split_whitespace().next_back()?;
        let segment = token.trim_end_matches('/').rsplit('/').next()?;
        Self::new(segment)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn last_path_segment(raw_url: &str) -> Option<String> {
    let parsed = Url::parse(raw_url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()?;
    Some(segment.to_string())
}
