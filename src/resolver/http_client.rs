//! HTTP client construction for metadata API requests.

use std::time::Duration;

use reqwest::Client;

use super::ResolveError;
use crate::user_agent;

/// Builds the resolver client: connect and total timeouts, shared UA, gzip.
///
/// # Errors
///
/// Returns [`ResolveError::Client`] when the client cannot be built.
pub fn build_resolver_http_client(
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client, ResolveError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .user_agent(user_agent::default_resolver_user_agent())
        .gzip(true)
        .build()
        .map_err(ResolveError::Client)
}
