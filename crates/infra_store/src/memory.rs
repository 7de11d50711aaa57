//! In-memory product store.
//!
//! Implements the same upsert semantics as the Postgres store on a
//! `BTreeMap` keyed by [`ProductKey`]. Every operation is counted, and each
//! can be made to fail, so callers can observe which steps ran.

use crate::error::StoreError;
use crate::traits::ProductStore;
use async_trait::async_trait;
use rates_core::{CanonicalProductRow, ComparisonResult, ProductBatch, ProductKey, Subscriber};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Failure to inject into an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Fail with [`StoreError::Unauthorized`]
    Unauthorized,
    /// Fail with [`StoreError::Unreachable`]
    Unreachable,
}

impl InjectedFailure {
    fn into_error(self, operation: &'static str) -> StoreError {
        match self {
            InjectedFailure::Unauthorized => StoreError::Unauthorized {
                operation,
                message: "injected".to_string(),
            },
            InjectedFailure::Unreachable => StoreError::Unreachable {
                operation,
                message: "injected".to_string(),
            },
        }
    }
}

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    validate: AtomicUsize,
    upsert: AtomicUsize,
    compare: AtomicUsize,
    subscribers: AtomicUsize,
}

impl CallCounts {
    /// Credential probes issued.
    pub fn validate(&self) -> usize {
        self.validate.load(Ordering::SeqCst)
    }

    /// Upserts issued.
    pub fn upsert(&self) -> usize {
        self.upsert.load(Ordering::SeqCst)
    }

    /// Comparison procedure calls.
    pub fn compare(&self) -> usize {
        self.compare.load(Ordering::SeqCst)
    }

    /// Subscriber queries.
    pub fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Failures {
    validate: Option<InjectedFailure>,
    upsert: Option<InjectedFailure>,
    compare: Option<InjectedFailure>,
    subscribers: Option<InjectedFailure>,
}

/// Product store held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    products: RwLock<BTreeMap<ProductKey, CanonicalProductRow>>,
    subscribers: RwLock<Vec<Subscriber>>,
    comparison: RwLock<ComparisonResult>,
    failures: RwLock<Failures>,
    calls: CallCounts,
}

impl MemoryStore {
    /// Empty store with no subscribers and an absent comparison result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subscriber table.
    pub fn with_subscribers(self, subscribers: Vec<Subscriber>) -> Self {
        *self.subscribers.write().unwrap_or_else(|e| e.into_inner()) = subscribers;
        self
    }

    /// Set what the comparison procedure returns.
    pub fn with_comparison(self, result: ComparisonResult) -> Self {
        *self.comparison.write().unwrap_or_else(|e| e.into_inner()) = result;
        self
    }

    /// Make the credential probe fail.
    pub fn fail_validation(self, failure: InjectedFailure) -> Self {
        self.failures_mut().validate = Some(failure);
        self
    }

    /// Make the upsert fail.
    pub fn fail_upsert(self, failure: InjectedFailure) -> Self {
        self.failures_mut().upsert = Some(failure);
        self
    }

    /// Make the comparison procedure fail.
    pub fn fail_comparison(self, failure: InjectedFailure) -> Self {
        self.failures_mut().compare = Some(failure);
        self
    }

    /// Make the subscriber query fail.
    pub fn fail_subscribers(self, failure: InjectedFailure) -> Self {
        self.failures_mut().subscribers = Some(failure);
        self
    }

    fn failures_mut(&self) -> std::sync::RwLockWriteGuard<'_, Failures> {
        self.failures.write().unwrap_or_else(|e| e.into_inner())
    }

    fn failure(&self, pick: impl Fn(&Failures) -> Option<InjectedFailure>) -> Option<InjectedFailure> {
        pick(&self.failures.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Call counters.
    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    /// Snapshot of the stored products in key order.
    pub fn products(&self) -> Vec<CanonicalProductRow> {
        self.products
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Insert a row directly, bypassing the counters.
    pub fn seed(&self, row: CanonicalProductRow) {
        self.products
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(row.key(), row);
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn validate_credentials(&self) -> Result<(), StoreError> {
        self.calls.validate.fetch_add(1, Ordering::SeqCst);
        match self.failure(|f| f.validate) {
            Some(failure) => Err(failure.into_error("credential probe")),
            None => Ok(()),
        }
    }

    async fn upsert_products(&self, batch: &ProductBatch) -> Result<u64, StoreError> {
        self.calls.upsert.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure(|f| f.upsert) {
            return Err(failure.into_error("upsert products"));
        }

        let mut products = self.products.write().unwrap_or_else(|e| e.into_inner());
        for row in batch.rows() {
            products.insert(row.key(), row.clone());
        }
        Ok(batch.len() as u64)
    }

    async fn compare_products(&self) -> Result<ComparisonResult, StoreError> {
        self.calls.compare.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure(|f| f.compare) {
            return Err(failure.into_error("comparison procedure"));
        }
        Ok(self
            .comparison
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        self.calls.subscribers.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure(|f| f.subscribers) {
            return Err(failure.into_error("subscriber query"));
        }
        Ok(self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }
}
