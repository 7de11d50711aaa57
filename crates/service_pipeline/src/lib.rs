//! # Rates Pipeline Service
//!
//! Orchestrates one collection cycle of deposit and savings rates using the
//! A-I-S layering of the workspace:
//! - Inputs come through the Adapter layer (`adapter_finlife`)
//! - Storage goes through the Infra layer (`infra_store`)
//! - Pure transformation and branching live in `rates_core`
//!
//! ## Step Graph
//!
//! Two availability gates run concurrently and join before the fetch. The
//! fetch, transform, credential probe, upsert and comparison follow in
//! sequence, and the branch step selects either the notification or the
//! skip path. See [`steps`] for the wiring and [`dag`] for the executor.
//!
//! ## Run Guarantees
//!
//! - Any fatal step error stops the run; the report names the step and the
//!   taxonomy tag of the cause
//! - Per-recipient delivery failures are aggregated, never fatal
//! - A lock file keeps two runs from loading at the same time

pub mod config;
pub mod context;
pub mod dag;
pub mod error;
pub mod lock;
pub mod notify;
pub mod pipeline;
pub mod report;
pub mod schedule;
pub mod steps;

/// Service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{build_config, CliArgs, ConfigError, LogLevel, PipelineConfig, Secret};
    pub use crate::context::{CancellationFlag, RunContext};
    pub use crate::dag::{Dag, PipelineStep, StepId, StepNode, StepOutcome};
    pub use crate::error::{ErrorKind, PipelineError, StepError};
    pub use crate::lock::RunLock;
    pub use crate::notify::{
        EmailMessage, MailError, MailTransport, NotificationError, NotificationReport, Notifier,
        NotifierSettings, RecordingTransport,
    };
    pub use crate::pipeline::Pipeline;
    pub use crate::report::{RunReport, StepRecord, StepStatus};
    pub use crate::schedule::DailySchedule;
    pub use crate::steps::PipelineDeps;
}
