//! # adapter_finlife: Rate API Adapter
//!
//! Input side of the pipeline. Talks to the FSS finlife listing API:
//! - Availability gates polling the listing endpoints (`gate`)
//! - The paginated product fetcher (`client`)
//! - Endpoint and URL construction (`endpoint`)
//! - The response wire format and the base/option join (`wire`)
//!
//! The API key is a query parameter, so URLs built here are never logged
//! and transport errors are stripped of their URL before propagating.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod gate;
pub mod wire;

pub use client::{FinlifeClient, FinlifeSettings, ProductSource};
pub use endpoint::ProductEndpoint;
pub use error::FeedError;
pub use gate::{AvailabilityGate, AvailabilityProbe, GatePolicy, HttpProbe};
