//! The store seam used by the pipeline.

use crate::error::StoreError;
use async_trait::async_trait;
use rates_core::{ComparisonResult, ProductBatch, Subscriber};

/// Relational store holding products and subscribers.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Cheap authenticated read proving the store is reachable and the
    /// credentials are accepted. Performs no writes.
    async fn validate_credentials(&self) -> Result<(), StoreError>;

    /// Upsert a batch keyed on `(product_code, term_months, institution_id)`.
    ///
    /// Matching rows are updated in place, new keys inserted, nothing
    /// deleted. Re-running with the same batch leaves the same final state.
    /// Returns the number of rows written.
    async fn upsert_products(&self, batch: &ProductBatch) -> Result<u64, StoreError>;

    /// Run the comparison procedure against the stored products.
    async fn compare_products(&self) -> Result<ComparisonResult, StoreError>;

    /// Subscribers flagged active, read at call time.
    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError>;
}
