//! Timeout configuration for harness requests.
//!
//! # Timeout Types
//!
//! - **connect**: DNS + TCP (+ TLS) establishment
//! - **total**: absolute deadline for the whole exchange, connect included
//!
//! A request built with [`RequestBuilder::timeout`](crate::RequestBuilder::timeout)
//! overrides `total` for that request only.
//!
//! # Usage
//!
//! ```rust,ignore
//! use wiretest::{Client, Timeouts};
//! use std::time::Duration;
//!
//! let client = Client::builder()
//!     .base_url("http://127.0.0.1:8080")
//!     .timeouts(Timeouts::api_defaults().total(Duration::from_secs(5)))
//!     .build()?;
//! ```

use std::time::Duration;

/// Timeout configuration. When a field is `None`, that phase is unbounded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for establishing the connection. Does not reset.
    ///
    /// Default: 10s for api_defaults()
    pub connect: Option<Duration>,

    /// Deadline for the entire request/response exchange. Does not reset.
    ///
    /// Default: 30s for api_defaults()
    pub total: Option<Duration>,
}

impl Timeouts {
    /// All timeouts disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for test traffic against a local or nearby service.
    ///
    /// - connect: 10s
    /// - total: 30s
    pub fn api_defaults() -> Self {
        Self {
            connect: Some(Duration::from_secs(10)),
            total: Some(Duration::from_secs(30)),
        }
    }

    /// Set connect timeout.
    pub fn connect(mut self, timeout: Duration) -> Self {
        self.connect = Some(timeout);
        self
    }

    /// Set total request deadline.
    pub fn total(mut self, timeout: Duration) -> Self {
        self.total = Some(timeout);
        self
    }

    /// Disable connect timeout.
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect = None;
        self
    }

    /// Disable total timeout.
    pub fn no_total_timeout(mut self) -> Self {
        self.total = None;
        self
    }

    /// Total deadline for one request, preferring the per-request override.
    pub fn effective_total(&self, request_override: Option<Duration>) -> Option<Duration> {
        request_override.or(self.total)
    }
}
