//! Batched, rate-limited resolution of identifiers into resource URLs.
//!
//! Identifiers are split into batches the size of the limiter's per-window
//! budget. A batch runs all of its requests concurrently, each one gated by
//! [`RateLimiter::acquire`]. When more batches remain the resolver then
//! sleeps for one full limiter window, so the next batch starts with a fresh
//! budget and no request of batch N+1 is issued before that pause ends.
//!
//! Every request produces exactly one [`ResolutionRecord`], appended to the
//! resolution log as soon as it completes.
//!
//! # Example
//!
//! ```no_run
//! use std::num::NonZeroUsize;
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wishlist_core::{Identifier, RateLimiter, RecordLog, Resolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = Arc::new(RateLimiter::new(NonZeroUsize::new(45).unwrap(), Duration::from_secs(60)));
//! let resolver = Resolver::new(
//!     "https://wallhaven.cc/api/v1/w",
//!     limiter,
//!     Duration::from_secs(30),
//!     Duration::from_secs(60),
//! )?;
//! let mut log = RecordLog::create(Path::new("src_wishlist.csv")).await?;
//! let ids: Vec<Identifier> = ["8586my", "p9pyxe"].into_iter().filter_map(Identifier::new).collect();
//! let stats = resolver.resolve_all(&ids, &mut log).await?;
//! println!("resolved {} of {}", stats.succeeded, stats.attempted);
//! # Ok(())
//! # }
//! ```

mod error;
mod http_client;

pub use error::ResolveError;
pub use http_client::build_resolver_http_client;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::identifier::Identifier;
use crate::journal::{RecordLog, ResolutionRecord, ResolutionStatus};
use crate::rate_limiter::RateLimiter;

/// Metadata API response envelope: `{"data": {"path": "<resource url>"}}`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    data: ApiResource,
}

#[derive(Debug, Deserialize)]
struct ApiResource {
    path: String,
}

/// Counters for one resolution run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Requests issued (one per identifier).
    pub attempted: usize,
    /// Identifiers resolved to a URL.
    pub succeeded: usize,
    /// Identifiers that failed for any reason, rate limiting included.
    pub failed: usize,
    /// Subset of `failed` answered with HTTP 429.
    pub rate_limited: usize,
    /// Batches processed.
    pub batches: usize,
}

impl ResolveStats {
    fn record(&mut self, status: &ResolutionStatus) {
        self.attempted += 1;
        match status {
            ResolutionStatus::Success => self.succeeded += 1,
            ResolutionStatus::RateLimited => {
                self.rate_limited += 1;
                self.failed += 1;
            }
            ResolutionStatus::HttpError(_) | ResolutionStatus::TransportError(_) => {
                self.failed += 1;
            }
        }
    }
}

/// Resolves identifiers through the metadata API.
#[derive(Debug, Clone)]
pub struct Resolver {
    client: Client,
    api_base: Url,
    limiter: Arc<RateLimiter>,
}

impl Resolver {
    /// Creates a resolver with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the API base is not an absolute URL or the
    /// client cannot be built.
    pub fn new(
        api_base: &str,
        limiter: Arc<RateLimiter>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ResolveError> {
        let client = build_resolver_http_client(connect_timeout, request_timeout)?;
        Self::with_client(client, api_base, limiter)
    }

    /// Creates a resolver around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidApiBase`] if `api_base` cannot carry
    /// path segments.
    pub fn with_client(
        client: Client,
        api_base: &str,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ResolveError> {
        let api_base = Url::parse(api_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ResolveError::InvalidApiBase {
                base: api_base.to_string(),
            })?;
        Ok(Self {
            client,
            api_base,
            limiter,
        })
    }

    /// Identifiers per batch: the limiter's per-window budget.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.limiter.permits()
    }

    /// API endpoint for one identifier: `<api-base>/<id>`.
    #[must_use]
    pub fn endpoint(&self, id: &Identifier) -> String {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id.as_str());
        }
        url.into()
    }

    /// Resolves one identifier. Never fails: every outcome is a record.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn resolve_one(&self, id: &Identifier) -> ResolutionRecord {
        self.limiter.acquire().await;

        let endpoint = self.endpoint(id);
        debug!(%endpoint, "requesting resource metadata");

        let response = match self.client.get(&endpoint).send().await {
            Ok(response) => response,
            Err(e) => {
                return ResolutionRecord::failure(
                    id.clone(),
                    ResolutionStatus::TransportError(describe_transport_error(&e)),
                );
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<ApiEnvelope>().await {
                Ok(envelope) => ResolutionRecord::success(id.clone(), envelope.data.path),
                Err(e) => ResolutionRecord::failure(
                    id.clone(),
                    ResolutionStatus::TransportError(format!(
                        "invalid response body: {}",
                        describe_transport_error(&e)
                    )),
                ),
            },
            StatusCode::TOO_MANY_REQUESTS => {
                ResolutionRecord::failure(id.clone(), ResolutionStatus::RateLimited)
            }
            status => {
                ResolutionRecord::failure(id.clone(), ResolutionStatus::HttpError(status.as_u16()))
            }
        }
    }

    /// Resolves all identifiers batch by batch, appending one record per
    /// identifier to `log` in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Journal`] if the log cannot be written.
    /// Individual request failures never end the run.
    #[instrument(skip(self, ids, log), fields(count = ids.len(), batch_size = self.batch_size()))]
    pub async fn resolve_all(
        &self,
        ids: &[Identifier],
        log: &mut RecordLog<ResolutionRecord>,
    ) -> Result<ResolveStats, ResolveError> {
        let batch_size = self.batch_size();
        let total_batches = ids.len().div_ceil(batch_size);
        let mut stats = ResolveStats::default();

        info!(
            identifiers = ids.len(),
            batches = total_batches,
            permits = self.limiter.permits(),
            window_secs = self.limiter.window().as_secs_f64(),
            "starting resolution"
        );

        for (index, batch) in ids.chunks(batch_size).enumerate() {
            let batch_num = index + 1;
            info!(batch = batch_num, of = total_batches, size = batch.len(), "processing batch");

            let mut in_flight: FuturesUnordered<_> =
                batch.iter().map(|id| self.resolve_one(id)).collect();

            while let Some(record) = in_flight.next().await {
                report_resolution(&record);
                stats.record(record.status());
                log.append(&record).await?;
            }
            stats.batches += 1;

            if batch_num < total_batches {
                let pause = self.limiter.window();
                info!(
                    wait_secs = pause.as_secs_f64(),
                    "waiting for rate limit window before next batch"
                );
                tokio::time::sleep(pause).await;
            }
        }

        info!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            rate_limited = stats.rate_limited,
            batches = stats.batches,
            "resolution complete"
        );
        Ok(stats)
    }
}

fn report_resolution(record: &ResolutionRecord) {
    match record.status() {
        ResolutionStatus::Success => {
            info!(id = %record.id(), url = record.resolved_url().unwrap_or_default(), "resolved");
        }
        ResolutionStatus::RateLimited => {
            warn!(id = %record.id(), "rate limited (429), will retry on a later run");
        }
        ResolutionStatus::HttpError(status) => {
            warn!(id = %record.id(), status, "resolution failed");
        }
        ResolutionStatus::TransportError(message) => {
            warn!(id = %record.id(), error = %message, "resolution request failed");
        }
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timeout: {error}")
    } else {
        error.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    fn resolver(base: &str, permits: usize) -> Resolver {
        let limiter = Arc::new(RateLimiter::new(
            NonZeroUsize::new(permits).unwrap(),
            Duration::from_millis(50),
        ));
        Resolver::with_client(Client::new(), base, limiter).unwrap()
    }

    #[test]
    fn test_endpoint_appends_identifier() {
        let resolver = resolver("https://wallhaven.cc/api/v1/w", 45);
        let id = Identifier::new("8586my").unwrap();
        assert_eq!(resolver.endpoint(&id), "https://wallhaven.cc/api/v1/w/8586my");
    }

    #[test]
    fn test_endpoint_handles_trailing_slash() {
        let resolver = resolver("https://wallhaven.cc/api/v1/w/", 45);
        let id = Identifier::new("8586my").unwrap();
        assert_eq!(resolver.endpoint(&id), "https://wallhaven.cc/api/v1/w/8586my");
    }

    #[test]
    fn test_endpoint_escapes_path_characters() {
        let resolver = resolver("https://api.example.com/w", 45);
        let id = Identifier::new("a b").unwrap();
        assert_eq!(resolver.endpoint(&id), "https://api.example.com/w/a%20b");
    }

    #[test]
    fn test_batch_size_follows_limiter() {
        assert_eq!(resolver("https://api.example.com/w", 7).batch_size(), 7);
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let limiter = Arc::new(RateLimiter::new(NonZeroUsize::MIN, Duration::from_secs(1)));
        let result = Resolver::with_client(Client::new(), "mailto:someone@example.com", limiter);
        assert!(matches!(result, Err(ResolveError::InvalidApiBase { .. })));
    }

    #[test]
    fn test_stats_count_every_status() {
        let mut stats = ResolveStats::default();
        stats.record(&ResolutionStatus::Success);
        stats.record(&ResolutionStatus::RateLimited);
        stats.record(&ResolutionStatus::HttpError(404));
        stats.record(&ResolutionStatus::TransportError("reset".into()));

        assert_eq!(stats.attempted, 4);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.rate_limited, 1);
    }
}
