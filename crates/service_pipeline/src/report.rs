//! Outcome of one pipeline run.

use crate::dag::StepId;
use crate::error::{ErrorKind, PipelineError};
use crate::notify::NotificationReport;
use rates_core::{Branch, TransformReport};
use std::fmt;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Final status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepStatus {
    /// Ran and succeeded
    Succeeded,
    /// Ran and failed
    Failed,
    /// Not run because its branch was not taken
    Skipped,
    /// Not run because the run stopped first
    NotStarted,
}

impl StepStatus {
    /// Status name
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::NotStarted => "not_started",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status and timing of one step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Final status
    pub status: StepStatus,
    /// Wall time spent in the step
    pub duration: Duration,
    /// Error message when failed
    pub error: Option<String>,
}

impl StepRecord {
    pub(crate) fn not_started() -> Self {
        Self {
            status: StepStatus::NotStarted,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Report of a pipeline run.
#[derive(Debug)]
pub struct RunReport {
    /// Run identifier
    pub run_id: Uuid,
    /// Every step of the graph in execution order
    pub steps: Vec<(StepId, StepRecord)>,
    /// Successor chosen by the branch step
    pub branch: Option<StepId>,
    /// Transformer counts
    pub transform: Option<TransformReport>,
    /// Rows written by the upsert
    pub upserted: Option<u64>,
    /// Delivery summary
    pub notification: Option<NotificationReport>,
    /// Total run time
    pub duration: Duration,
    pub(crate) failure: Option<PipelineError>,
}

impl RunReport {
    /// Report for a run that stopped before any step started.
    pub(crate) fn aborted(run_id: Uuid, order: Vec<StepId>, failure: PipelineError) -> Self {
        Self {
            run_id,
            steps: order
                .into_iter()
                .map(|id| (id, StepRecord::not_started()))
                .collect(),
            branch: None,
            transform: None,
            upserted: None,
            notification: None,
            duration: Duration::ZERO,
            failure: Some(failure),
        }
    }

    /// Whether every executed step, including the chosen branch, succeeded.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// The fatal error, if the run failed.
    pub fn failure(&self) -> Option<&PipelineError> {
        self.failure.as_ref()
    }

    /// Taxonomy tag of the failure.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(PipelineError::kind)
    }

    /// Status of `step`.
    pub fn status(&self, step: StepId) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|(id, _)| *id == step)
            .map(|(_, record)| record.status)
    }

    /// Branch taken, as a notify/skip decision.
    pub fn branch_taken(&self) -> Option<Branch> {
        self.branch.map(|id| match id {
            StepId::SendResultToActiveUsers => Branch::Notify,
            _ => Branch::Skip,
        })
    }

    /// Write the summary to the log.
    pub fn log_summary(&self) {
        for (id, record) in &self.steps {
            info!(
                run_id = %self.run_id,
                step = %id,
                status = %record.status,
                duration_ms = record.duration.as_millis() as u64,
                "Step summary"
            );
        }

        let (attempted, delivered, failed) = self
            .notification
            .as_ref()
            .map(|n| (n.attempted, n.delivered, n.failures.len()))
            .unwrap_or_default();

        match &self.failure {
            None => info!(
                run_id = %self.run_id,
                branch = self.branch_taken().map(|b| b.as_str()).unwrap_or("none"),
                upserted = self.upserted.unwrap_or_default(),
                emails_attempted = attempted,
                emails_delivered = delivered,
                emails_failed = failed,
                duration_ms = self.duration.as_millis() as u64,
                "Run succeeded"
            ),
            Some(err) => error!(
                run_id = %self.run_id,
                kind = %err.kind(),
                step = err.step().map(|s| s.as_str()).unwrap_or("-"),
                error = %err,
                duration_ms = self.duration.as_millis() as u64,
                "Run failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_report() {
        let report = RunReport::aborted(
            Uuid::new_v4(),
            StepId::ALL.to_vec(),
            PipelineError::Cancelled,
        );
        assert!(!report.is_success());
        assert_eq!(report.failure_kind(), Some(ErrorKind::Cancelled));
        assert!(report
            .steps
            .iter()
            .all(|(_, r)| r.status == StepStatus::NotStarted));
    }

    #[test]
    fn test_branch_taken() {
        let mut report = RunReport::aborted(Uuid::new_v4(), vec![], PipelineError::Cancelled);
        report.branch = Some(StepId::SendResultToActiveUsers);
        assert_eq!(report.branch_taken(), Some(Branch::Notify));
        report.branch = Some(StepId::SkipEmailNotification);
        assert_eq!(report.branch_taken(), Some(Branch::Skip));
    }
}
