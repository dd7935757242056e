//! Rolling-window rate limiting for resolution requests.
//!
//! This module provides the [`RateLimiter`] struct which grants at most
//! `permits` acquisitions inside any window of length `window`. The limiter is
//! an ordinary value: construct one per run and share it by `Arc` with every
//! task that issues API requests.
//!
//! # Example
//!
//! ```
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wishlist_core::RateLimiter;
//!
//! # async fn example() {
//! let permits = NonZeroUsize::new(45).unwrap();
//! let limiter = Arc::new(RateLimiter::new(permits, Duration::from_secs(60)));
//!
//! // The first 45 acquisitions proceed immediately; the 46th waits until
//! // the oldest grant falls out of the window.
//! limiter.acquire().await;
//! # }
//! ```

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

/// Sliding-window request limiter.
///
/// Grant timestamps live behind a `tokio::sync::Mutex`. The mutex queues
/// waiters in FIFO order and a waiter keeps the lock while it sleeps for the
/// next free slot, so every caller is eventually served in arrival order.
///
/// # Thread Safety
///
/// `RateLimiter` is `Send + Sync`; share it with `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    permits: NonZeroUsize,
    window: Duration,
    /// Instants of the grants still inside the window, oldest first.
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `permits` acquisitions per `window`.
    #[must_use]
    #[instrument(level = "debug", fields(window_ms = window.as_millis()))]
    pub fn new(permits: NonZeroUsize, window: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            permits,
            window,
            grants: Mutex::new(VecDeque::with_capacity(permits.get())),
        }
    }

    /// Maximum acquisitions per window.
    #[must_use]
    pub fn permits(&self) -> usize {
        self.permits.get()
    }

    /// Length of the rolling window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Waits until a request slot is free and claims it.
    ///
    /// Never fails; the only effect of contention is delay.
    pub async fn acquire(&self) {
        let mut grants = self.grants.lock().await;

        let now = Instant::now();
        prune(&mut grants, now, self.window);

        if grants.len() >= self.permits.get() {
            // Oldest grant still in the window decides when the next slot opens.
            if let Some(&oldest) = grants.front() {
                let ready_at = oldest + self.window;
                debug!(
                    wait_ms = ready_at.saturating_duration_since(now).as_millis(),
                    in_window = grants.len(),
                    "rate limit reached, waiting for window to slide"
                );
                tokio::time::sleep_until(ready_at).await;
                prune(&mut grants, Instant::now(), self.window);
            }
        }

        grants.push_back(Instant::now());
        trace!(in_window = grants.len(), "rate limit permit granted");
    }
}

fn prune(grants: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = grants.front() {
        if now.saturating_duration_since(oldest) >= window {
            grants.pop_front();
        } else {
            break;
        }
    }
}
