//! Error types for the pipeline service.

use crate::config::ConfigError;
use crate::dag::StepId;
use adapter_finlife::FeedError;
use infra_store::StoreError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Taxonomy tag of a run failure, as surfaced to the scheduling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An availability gate timed out
    UpstreamUnavailable,
    /// The product fetch failed
    FetchError,
    /// The store refused the credentials
    StoreUnauthorized,
    /// The store could not be reached
    StoreUnreachable,
    /// The upsert failed
    LoadError,
    /// The comparison procedure failed
    ComparisonError,
    /// Delivery to one recipient failed (never fatal)
    NotificationError,
    /// The run was cancelled
    Cancelled,
    /// Another run holds the run lock
    RunInProgress,
    /// Configuration is missing or invalid
    Config,
    /// Graph or wiring fault
    Internal,
}

impl ErrorKind {
    /// Tag as written to logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UpstreamUnavailable => "UpstreamUnavailable",
            ErrorKind::FetchError => "FetchError",
            ErrorKind::StoreUnauthorized => "StoreUnauthorized",
            ErrorKind::StoreUnreachable => "StoreUnreachable",
            ErrorKind::LoadError => "LoadError",
            ErrorKind::ComparisonError => "ComparisonError",
            ErrorKind::NotificationError => "NotificationError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::RunInProgress => "RunInProgress",
            ErrorKind::Config => "Config",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a single step.
#[derive(Debug, Error)]
pub enum StepError {
    /// Rate API failure
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A predecessor did not leave its output in the run context
    #[error("missing step input: {0}")]
    MissingInput(&'static str),
}

impl StepError {
    /// Taxonomy tag for this error raised at `step`.
    ///
    /// Store errors are tagged by the step that raised them: the upsert
    /// yields `LoadError`, the procedure call `ComparisonError`, anything
    /// else is an authorisation or reachability failure.
    pub fn kind_at(&self, step: StepId) -> ErrorKind {
        match self {
            StepError::Feed(e) if e.is_unavailable() => ErrorKind::UpstreamUnavailable,
            StepError::Feed(_) => ErrorKind::FetchError,
            StepError::Store(_) if step == StepId::UpsertFinanceData => ErrorKind::LoadError,
            StepError::Store(_) if step == StepId::CompareProducts => ErrorKind::ComparisonError,
            StepError::Store(e) if e.is_unauthorized() => ErrorKind::StoreUnauthorized,
            StepError::Store(_) => ErrorKind::StoreUnreachable,
            StepError::MissingInput(_) => ErrorKind::Internal,
        }
    }
}

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The step graph is malformed
    #[error("Invalid pipeline graph: {0}")]
    InvalidGraph(String),

    /// A collaborator could not be constructed
    #[error("Failed to set up {component}: {message}")]
    Setup {
        /// Component being built
        component: &'static str,
        /// Cause
        message: String,
    },

    /// A fatal step failure
    #[error("Step {step} failed: {source}")]
    Step {
        /// Failing step
        step: StepId,
        /// Cause
        #[source]
        source: StepError,
    },

    /// The run was cancelled before completing
    #[error("Run cancelled")]
    Cancelled,

    /// Another run holds the run lock
    #[error("Another run is in progress (lock file {})", path.display())]
    RunInProgress {
        /// Lock file path
        path: PathBuf,
    },

    /// The lock file could not be created
    #[error("Failed to create lock file {}: {source}", path.display())]
    Lock {
        /// Lock file path
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Create a setup error
    pub fn setup(component: &'static str, message: impl fmt::Display) -> Self {
        Self::Setup {
            component,
            message: message.to_string(),
        }
    }

    /// Create an invalid graph error
    pub fn invalid_graph(msg: impl Into<String>) -> Self {
        Self::InvalidGraph(msg.into())
    }

    /// Taxonomy tag of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) | PipelineError::Setup { .. } => ErrorKind::Config,
            PipelineError::InvalidGraph(_) | PipelineError::Lock { .. } => ErrorKind::Internal,
            PipelineError::Step { step, source } => source.kind_at(*step),
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::RunInProgress { .. } => ErrorKind::RunInProgress,
        }
    }

    /// Step that failed, if the failure came from a step.
    pub fn step(&self) -> Option<StepId> {
        match self {
            PipelineError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unavailable() -> FeedError {
        FeedError::Unavailable {
            gate: "deposit".to_string(),
            waited: Duration::from_secs(300),
            attempts: 11,
        }
    }

    fn refused() -> StoreError {
        StoreError::Unauthorized {
            operation: "credential probe",
            message: "password authentication failed".to_string(),
        }
    }

    fn unreachable() -> StoreError {
        StoreError::Unreachable {
            operation: "upsert products",
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_feed_kinds() {
        let err = StepError::from(unavailable());
        assert_eq!(
            err.kind_at(StepId::CheckDepositAvailable),
            ErrorKind::UpstreamUnavailable
        );

        let err = StepError::from(FeedError::Api {
            endpoint: "deposit",
            code: "010".to_string(),
            message: "invalid key".to_string(),
        });
        assert_eq!(err.kind_at(StepId::FetchFinanceData), ErrorKind::FetchError);
    }

    #[test]
    fn test_store_kinds_follow_step() {
        let err = StepError::from(refused());
        assert_eq!(
            err.kind_at(StepId::ValidateStoreCredentials),
            ErrorKind::StoreUnauthorized
        );

        let err = StepError::from(unreachable());
        assert_eq!(
            err.kind_at(StepId::ValidateStoreCredentials),
            ErrorKind::StoreUnreachable
        );
        assert_eq!(err.kind_at(StepId::UpsertFinanceData), ErrorKind::LoadError);
        assert_eq!(err.kind_at(StepId::CompareProducts), ErrorKind::ComparisonError);
    }

    #[test]
    fn test_pipeline_error_carries_step() {
        let err = PipelineError::Step {
            step: StepId::FetchFinanceData,
            source: StepError::MissingInput("fetched products"),
        };
        assert_eq!(err.step(), Some(StepId::FetchFinanceData));
        assert!(err.to_string().contains("fetch_finance_data"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::RunInProgress {
            path: PathBuf::from("/tmp/rates.lock"),
        };
        assert!(err.to_string().contains("/tmp/rates.lock"));
        assert_eq!(err.kind(), ErrorKind::RunInProgress);
        assert_eq!(PipelineError::Cancelled.kind().as_str(), "Cancelled");
    }
}
