//! Error types for the rate API adapter.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while probing or fetching from the rate API.
#[derive(Debug, Error)]
pub enum FeedError {
    /// A gate never observed readiness within its timeout
    #[error("{gate} not available after {waited:?} ({attempts} probes)")]
    Unavailable {
        /// Gate name
        gate: String,
        /// Time spent polling
        waited: Duration,
        /// Number of probes issued
        attempts: u32,
    },

    /// Transport failure
    #[error("request to {endpoint} failed: {source}")]
    Http {
        /// Endpoint name (never the full URL, which carries the API key)
        endpoint: &'static str,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("{endpoint} returned HTTP {status}")]
    Status {
        /// Endpoint name
        endpoint: &'static str,
        /// Response status
        status: reqwest::StatusCode,
    },

    /// Body was not the expected JSON shape
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        /// Endpoint name
        endpoint: &'static str,
        /// Underlying parse error
        #[source]
        source: serde_json::Error,
    },

    /// The API answered but rejected the request
    #[error("{endpoint} rejected the request: [{code}] {message}")]
    Api {
        /// Endpoint name
        endpoint: &'static str,
        /// API error code
        code: String,
        /// API error message
        message: String,
    },

    /// Invalid base URL or parameters
    #[error("invalid request URL: {0}")]
    Url(String),
}

impl FeedError {
    /// Whether this error came from an availability gate.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, FeedError::Unavailable { .. })
    }
}
