//! Availability gates.
//!
//! A gate polls a cheap reachability probe until it reports ready or the
//! timeout elapses. Probe errors count as "not ready yet"; only the timeout
//! fails the gate.

use crate::endpoint::ProductEndpoint;
use crate::error::FeedError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A single readiness check.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Issue one check. `Ok(false)` and `Err` both mean "not ready yet".
    async fn is_ready(&self) -> Result<bool, FeedError>;
}

/// Probe that GETs a listing page and expects HTTP 200.
pub struct HttpProbe {
    http: reqwest::Client,
    endpoint: ProductEndpoint,
    url: Url,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a probe. `url` carries the API key and is never logged.
    pub fn new(http: reqwest::Client, endpoint: ProductEndpoint, url: Url, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            url,
            timeout,
        }
    }
}

#[async_trait]
impl AvailabilityProbe for HttpProbe {
    fn name(&self) -> &str {
        self.endpoint.name()
    }

    async fn is_ready(&self) -> Result<bool, FeedError> {
        let response = self
            .http
            .get(self.url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| FeedError::Http {
                endpoint: self.endpoint.name(),
                source: e.without_url(),
            })?;
        Ok(response.status() == StatusCode::OK)
    }
}

/// Polling schedule of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// Delay between probes
    pub poke_interval: Duration,
    /// Give up after this long
    pub timeout: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            poke_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(300),
        }
    }
}

/// A precondition that blocks until its probe reports ready.
#[derive(Clone)]
pub struct AvailabilityGate {
    probe: Arc<dyn AvailabilityProbe>,
    policy: GatePolicy,
}

impl AvailabilityGate {
    /// Create a gate.
    pub fn new(probe: Arc<dyn AvailabilityProbe>, policy: GatePolicy) -> Self {
        Self { probe, policy }
    }

    /// Gate name.
    pub fn name(&self) -> &str {
        self.probe.name()
    }

    /// Poll until ready or until the timeout elapses.
    ///
    /// The first probe is issued immediately. A probe is never started once
    /// the next poke would land past the timeout, and a probe still pending
    /// at the deadline is abandoned.
    pub async fn wait_until_ready(&self) -> Result<(), FeedError> {
        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, self.probe.is_ready()).await {
                Ok(Ok(true)) => {
                    info!(
                        gate = self.name(),
                        attempts,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Gate open"
                    );
                    return Ok(());
                }
                Ok(Ok(false)) => debug!(gate = self.name(), attempts, "Gate not ready"),
                Ok(Err(e)) => warn!(gate = self.name(), attempts, error = %e, "Gate probe failed"),
                Err(_) => warn!(gate = self.name(), attempts, "Gate probe still pending at deadline"),
            }

            let next = Instant::now() + self.policy.poke_interval;
            if next > deadline {
                return Err(FeedError::Unavailable {
                    gate: self.name().to_string(),
                    waited: started.elapsed(),
                    attempts,
                });
            }
            tokio::time::sleep_until(next).await;
        }
    }
}
