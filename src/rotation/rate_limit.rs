//! Hourly request quota tracking
//!
//! Counts requests sent to the image API inside the current quota window.
//! Exhaustion is a scheduling state rather than a failure: the rotation loop
//! polls [`RequestQuota::maybe_reset`] until a new window opens.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::config::QUOTA_WINDOW;

/// Request counter for one quota window
#[derive(Debug, Clone)]
pub struct RequestQuota {
    max_requests: u32,
    window: Duration,
    requests_this_window: u32,
    window_start: Instant,
    first_download_pending: bool,
}

impl RequestQuota {
    /// Create a quota of `max_requests` per `window`
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests_this_window: 0,
            window_start: Instant::now(),
            first_download_pending: true,
        }
    }

    /// Create an hourly quota
    pub fn hourly(max_requests: u32) -> Self {
        Self::new(max_requests, QUOTA_WINDOW)
    }

    /// Charge one request against the window
    ///
    /// Refuses the charge once the limit is reached, so the counter never
    /// exceeds the limit.
    ///
    /// # Returns
    /// Requests charged so far in this window
    pub fn record_request(&mut self) -> Result<u32, RateLimitError> {
        if !self.has_quota() {
            return Err(RateLimitError::QuotaExhausted {
                used: self.requests_this_window,
                max: self.max_requests,
            });
        }
        self.requests_this_window += 1;
        debug!(
            used = self.requests_this_window,
            max = self.max_requests,
            "Request charged against quota"
        );
        Ok(self.requests_this_window)
    }

    /// Whether at least one more request fits in this window
    pub fn has_quota(&self) -> bool {
        self.requests_this_window < self.max_requests
    }

    /// Whether `requests` more requests fit in this window
    pub fn has_quota_for(&self, requests: u32) -> bool {
        self.requests_this_window.saturating_add(requests) <= self.max_requests
    }

    /// Requests still available in this window
    pub fn remaining(&self) -> u32 {
        self.max_requests.saturating_sub(self.requests_this_window)
    }

    /// Reset the counter once more than one window has passed since the window started
    ///
    /// # Returns
    /// Whether a reset happened
    pub fn maybe_reset(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) <= self.window {
            return false;
        }
        info!(
            previous_requests = self.requests_this_window,
            "Request quota reset (new window)"
        );
        self.requests_this_window = 0;
        self.window_start = now;
        self.first_download_pending = true;
        true
    }

    /// Note a successful download; the first one of a window restarts the window clock
    ///
    /// # Returns
    /// Whether this download opened the window
    pub fn mark_download(&mut self, now: Instant) -> bool {
        if !self.first_download_pending {
            return false;
        }
        self.first_download_pending = false;
        self.window_start = now;
        true
    }

    /// Maximum requests per window
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Requests charged in the current window
    pub fn requests_this_window(&self) -> u32 {
        self.requests_this_window
    }

    /// Start of the current window
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Whether no download has completed yet in this window
    pub fn first_download_pending(&self) -> bool {
        self.first_download_pending
    }
}

/// Rate limiter errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// No request left in the current window
    #[error("request quota exhausted: {used}/{max} requests used this window")]
    QuotaExhausted {
        /// Requests already charged
        used: u32,
        /// Window limit
        max: u32,
    },
}
