//! Per-run state shared between steps.

use crate::notify::NotificationReport;
use chrono::NaiveDate;
use rates_core::{ComparisonResult, ProductBatch, RawProductRecord, TransformReport};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared manual-abort flag.
///
/// Cancelling prevents any further step from starting. Steps already in
/// flight are not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(CancellationToken);

impl CancellationFlag {
    /// Flag that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        self.0.cancelled().await;
    }
}

/// Raw records returned by the fetch step.
#[derive(Debug, Clone, Default)]
pub struct FetchedProducts {
    /// Deposit listing
    pub deposit: Vec<RawProductRecord>,
    /// Savings listing
    pub saving: Vec<RawProductRecord>,
}

struct Slot<T>(Mutex<Option<T>>);

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self(Mutex::new(None))
    }
}

impl<T: Clone> Slot<T> {
    fn put(&self, value: T) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    fn take(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn get(&self) -> Option<T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Ephemeral state of one run.
///
/// Created at trigger time, carries data between steps and is dropped when
/// the run ends. Only its effects (stored rows, sent mail) outlive it.
pub struct RunContext {
    run_id: Uuid,
    collected_at: NaiveDate,
    cancellation: CancellationFlag,
    fetched: Slot<FetchedProducts>,
    batch: Slot<ProductBatch>,
    transform_report: Slot<TransformReport>,
    upserted: Slot<u64>,
    comparison: Slot<ComparisonResult>,
    notification: Slot<NotificationReport>,
}

impl RunContext {
    /// Fresh context for a run collecting data dated `collected_at`.
    pub fn new(collected_at: NaiveDate, cancellation: CancellationFlag) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            collected_at,
            cancellation,
            fetched: Slot::default(),
            batch: Slot::default(),
            transform_report: Slot::default(),
            upserted: Slot::default(),
            comparison: Slot::default(),
            notification: Slot::default(),
        }
    }

    /// Run identifier.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Collection date stamped on every canonical row.
    pub fn collected_at(&self) -> NaiveDate {
        self.collected_at
    }

    /// Whether the run was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub(crate) fn put_fetched(&self, fetched: FetchedProducts) {
        self.fetched.put(fetched);
    }

    pub(crate) fn take_fetched(&self) -> Option<FetchedProducts> {
        self.fetched.take()
    }

    pub(crate) fn put_batch(&self, batch: ProductBatch, report: TransformReport) {
        self.batch.put(batch);
        self.transform_report.put(report);
    }

    pub(crate) fn take_batch(&self) -> Option<ProductBatch> {
        self.batch.take()
    }

    pub(crate) fn put_upserted(&self, rows: u64) {
        self.upserted.put(rows);
    }

    pub(crate) fn put_comparison(&self, result: ComparisonResult) {
        self.comparison.put(result);
    }

    pub(crate) fn put_notification(&self, report: NotificationReport) {
        self.notification.put(report);
    }

    /// Comparison result, once the comparison step has run.
    pub fn comparison(&self) -> Option<ComparisonResult> {
        self.comparison.get()
    }

    /// Transformer counts, once the transform step has run.
    pub fn transform_report(&self) -> Option<TransformReport> {
        self.transform_report.get()
    }

    /// Rows written, once the upsert has run.
    pub fn upserted(&self) -> Option<u64> {
        self.upserted.get()
    }

    /// Delivery summary, once the notify step has run.
    pub fn notification(&self) -> Option<NotificationReport> {
        self.notification.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_shared() {
        let flag = CancellationFlag::new();
        let ctx = RunContext::new(
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            flag.clone(),
        );
        assert!(!ctx.is_cancelled());
        flag.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let flag = CancellationFlag::new();
        let waiter = tokio::spawn({
            let flag = flag.clone();
            async move { flag.cancelled().await }
        });
        flag.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_fetched_is_consumed_once() {
        let ctx = RunContext::new(
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            CancellationFlag::new(),
        );
        ctx.put_fetched(FetchedProducts::default());
        assert!(ctx.take_fetched().is_some());
        assert!(ctx.take_fetched().is_none());
    }
}
