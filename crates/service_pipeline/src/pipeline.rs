//! The rates pipeline: graph, run lock and trigger entry point.

use crate::config::PipelineConfig;
use crate::context::{CancellationFlag, RunContext};
use crate::dag::Dag;
use crate::error::PipelineError;
use crate::lock::RunLock;
use crate::notify::{Notifier, SmtpMailer};
use crate::report::RunReport;
use crate::schedule::DailySchedule;
use crate::steps::{pipeline_graph, PipelineDeps};
use adapter_finlife::{FinlifeClient, ProductEndpoint};
use chrono::{NaiveDate, NaiveTime, Offset, Utc};
use infra_store::PgProductStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Instrument};

/// A configured pipeline, ready to be triggered.
pub struct Pipeline {
    dag: Dag,
    lock_file: Option<PathBuf>,
    calendar: DailySchedule,
    cancellation: CancellationFlag,
}

impl Pipeline {
    /// Pipeline over `deps` with no run lock, dating rows in UTC.
    pub fn new(deps: PipelineDeps) -> Result<Self, PipelineError> {
        Ok(Self {
            dag: pipeline_graph(deps)?,
            lock_file: None,
            calendar: DailySchedule::new(NaiveTime::MIN, Utc.fix()),
            cancellation: CancellationFlag::new(),
        })
    }

    /// Wire the production collaborators from validated configuration.
    ///
    /// Nothing connects here: the HTTP client, the store pool and the SMTP
    /// transport all connect on first use.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let client = FinlifeClient::new(config.finlife_settings()?)
            .map_err(|e| PipelineError::setup("rate API client", e))?;
        let deposit_probe = client
            .probe(ProductEndpoint::Deposit, config.request_timeout())
            .map_err(|e| PipelineError::setup("deposit probe", e))?;
        let saving_probe = client
            .probe(ProductEndpoint::Saving, config.request_timeout())
            .map_err(|e| PipelineError::setup("saving probe", e))?;

        let store = PgProductStore::connect_lazy(config.store_settings()?)
            .map_err(|e| PipelineError::setup("product store", e))?;
        let mailer = SmtpMailer::new(&config.smtp_settings()?)
            .map_err(|e| PipelineError::setup("SMTP transport", e))?;

        let deps = PipelineDeps {
            deposit_probe: Arc::new(deposit_probe),
            saving_probe: Arc::new(saving_probe),
            gate_policy: config.gate_policy(),
            source: Arc::new(client),
            store: Arc::new(store),
            notifier: Notifier::new(Arc::new(mailer), config.notifier_settings()),
        };

        Ok(Self::new(deps)?
            .with_lock_file(config.lock_file.clone())
            .with_calendar(config.schedule()?))
    }

    /// Hold `path` as the run lock for the duration of each run.
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = Some(path.into());
        self
    }

    /// Date collected rows in the offset of `calendar`.
    pub fn with_calendar(mut self, calendar: DailySchedule) -> Self {
        self.calendar = calendar;
        self
    }

    /// Flag that aborts the current and every later run.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancellation.clone()
    }

    /// Execute one run, dated today in the pipeline's calendar.
    pub async fn run(&self) -> RunReport {
        self.run_for(self.calendar.local_date(Utc::now())).await
    }

    /// Execute one run, stamping rows with `collected_at`.
    pub async fn run_for(&self, collected_at: NaiveDate) -> RunReport {
        let ctx = RunContext::new(collected_at, self.cancellation.clone());
        let span = tracing::info_span!("run", run_id = %ctx.run_id(), %collected_at);

        async {
            let _lock = match self.acquire_lock() {
                Ok(lock) => lock,
                Err(err) => return RunReport::aborted(ctx.run_id(), self.dag.order(), err),
            };
            info!(steps = self.dag.len(), "Run started");
            self.dag.execute(&ctx).await
        }
        .instrument(span)
        .await
    }

    fn acquire_lock(&self) -> Result<Option<RunLock>, PipelineError> {
        self.lock_file.as_ref().map(RunLock::acquire).transpose()
    }

    /// Step names grouped by wave.
    pub fn describe(&self) -> Vec<Vec<&'static str>> {
        self.dag
            .waves()
            .iter()
            .map(|wave| wave.iter().map(|id| id.as_str()).collect())
            .collect()
    }
}
