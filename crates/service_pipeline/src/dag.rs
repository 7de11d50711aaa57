//! Step graph and its executor.
//!
//! The pipeline is an explicit directed acyclic graph. [`Dag::new`] rejects
//! duplicate steps, unknown dependencies and cycles, then groups the steps
//! into waves (Kahn levels): every step of a wave depends only on steps of
//! earlier waves. [`Dag::execute`] runs the waves in order, the steps of one
//! wave concurrently.
//!
//! Scheduling rules:
//! - a wave starts only after every step of the previous wave finished
//! - the first failure stops the run; later waves stay `NotStarted`
//! - a branch step names its chosen successor; its other direct successors
//!   are `Skipped`, as is every step whose dependencies were all skipped
//! - cancellation is checked before each wave

use crate::context::RunContext;
use crate::error::{PipelineError, StepError};
use crate::report::{RunReport, StepRecord, StepStatus};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Identifier of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepId {
    /// Gate on the deposit listing
    CheckDepositAvailable,
    /// Gate on the savings listing
    CheckSavingAvailable,
    /// Fetch both listings
    FetchFinanceData,
    /// Normalise into a canonical batch
    TransformFinanceData,
    /// Probe store credentials
    ValidateStoreCredentials,
    /// Upsert the batch
    UpsertFinanceData,
    /// Run the comparison procedure
    CompareProducts,
    /// Choose notify or skip
    BranchOnComparison,
    /// Email active subscribers
    SendResultToActiveUsers,
    /// No-op path when nothing improved
    SkipEmailNotification,
}

impl StepId {
    /// All step ids in pipeline order.
    pub const ALL: [StepId; 10] = [
        StepId::CheckDepositAvailable,
        StepId::CheckSavingAvailable,
        StepId::FetchFinanceData,
        StepId::TransformFinanceData,
        StepId::ValidateStoreCredentials,
        StepId::UpsertFinanceData,
        StepId::CompareProducts,
        StepId::BranchOnComparison,
        StepId::SendResultToActiveUsers,
        StepId::SkipEmailNotification,
    ];

    /// Step name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::CheckDepositAvailable => "check_deposit_available",
            StepId::CheckSavingAvailable => "check_saving_available",
            StepId::FetchFinanceData => "fetch_finance_data",
            StepId::TransformFinanceData => "transform_finance_data",
            StepId::ValidateStoreCredentials => "validate_store_credentials",
            StepId::UpsertFinanceData => "upsert_finance_data",
            StepId::CompareProducts => "compare_products",
            StepId::BranchOnComparison => "branch_on_comparison",
            StepId::SendResultToActiveUsers => "send_result_to_active_users",
            StepId::SkipEmailNotification => "skip_email_notification",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished step tells the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed; successors are eligible
    Completed,
    /// Step completed and chose one successor; the others are skipped
    Branch(StepId),
}

/// One unit of work in the graph.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Step identifier.
    fn id(&self) -> StepId;

    /// Execute the step against the run context.
    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, StepError>;
}

/// A step together with the steps it depends on.
pub struct StepNode {
    step: Arc<dyn PipelineStep>,
    depends_on: Vec<StepId>,
}

impl StepNode {
    /// Node for `step` running after every step in `depends_on`.
    pub fn new(step: Arc<dyn PipelineStep>, depends_on: &[StepId]) -> Self {
        Self {
            step,
            depends_on: depends_on.to_vec(),
        }
    }

    /// Step identifier.
    pub fn id(&self) -> StepId {
        self.step.id()
    }

    /// Dependencies.
    pub fn depends_on(&self) -> &[StepId] {
        &self.depends_on
    }
}

/// Validated step graph.
pub struct Dag {
    nodes: HashMap<StepId, StepNode>,
    dependents: HashMap<StepId, Vec<StepId>>,
    waves: Vec<Vec<StepId>>,
}

impl Dag {
    /// Validate `nodes` and group them into waves.
    pub fn new(nodes: Vec<StepNode>) -> Result<Self, PipelineError> {
        let mut declared: Vec<StepId> = Vec::with_capacity(nodes.len());
        let mut by_id: HashMap<StepId, StepNode> = HashMap::with_capacity(nodes.len());

        for node in nodes {
            let id = node.id();
            if by_id.contains_key(&id) {
                return Err(PipelineError::invalid_graph(format!("duplicate step id: {id}")));
            }
            declared.push(id);
            by_id.insert(id, node);
        }

        let mut indegree: HashMap<StepId, usize> = HashMap::with_capacity(declared.len());
        let mut dependents: HashMap<StepId, Vec<StepId>> = HashMap::with_capacity(declared.len());
        for id in &declared {
            indegree.insert(*id, 0);
            dependents.entry(*id).or_default();
        }

        for id in &declared {
            let mut seen = HashSet::new();
            for dep in by_id[id].depends_on() {
                if !by_id.contains_key(dep) {
                    return Err(PipelineError::invalid_graph(format!(
                        "step {id} depends on unknown step {dep}"
                    )));
                }
                if !seen.insert(*dep) {
                    continue;
                }
                *indegree.entry(*id).or_default() += 1;
                dependents.entry(*dep).or_default().push(*id);
            }
        }

        let mut waves = Vec::new();
        let mut current: Vec<StepId> = declared
            .iter()
            .copied()
            .filter(|id| indegree[id] == 0)
            .collect();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();
            let mut next = BTreeSet::new();
            for id in &current {
                for child in &dependents[id] {
                    if let Some(d) = indegree.get_mut(child) {
                        *d -= 1;
                        if *d == 0 {
                            next.insert(*child);
                        }
                    }
                }
            }
            waves.push(current);
            // Declaration order within a wave keeps logs deterministic.
            current = declared
                .iter()
                .copied()
                .filter(|id| next.contains(id))
                .collect();
        }

        if placed != declared.len() {
            return Err(PipelineError::invalid_graph("pipeline steps contain a cycle"));
        }

        Ok(Self {
            nodes: by_id,
            dependents,
            waves,
        })
    }

    /// Steps grouped into waves.
    pub fn waves(&self) -> &[Vec<StepId>] {
        &self.waves
    }

    /// Steps in execution order.
    pub fn order(&self) -> Vec<StepId> {
        self.waves.iter().flatten().copied().collect()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no steps.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependencies of `id`.
    pub fn dependencies(&self, id: StepId) -> &[StepId] {
        self.nodes.get(&id).map(StepNode::depends_on).unwrap_or(&[])
    }

    /// Direct successors of `id`.
    pub fn dependents(&self, id: StepId) -> &[StepId] {
        self.dependents.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run every wave against `ctx` and report the outcome of each step.
    pub async fn execute(&self, ctx: &RunContext) -> RunReport {
        let run_started = Instant::now();
        let mut records: BTreeMap<StepId, StepRecord> = self
            .order()
            .into_iter()
            .map(|id| (id, StepRecord::not_started()))
            .collect();
        let mut pruned: HashSet<StepId> = HashSet::new();
        let mut branch = None;
        let mut failure = None;

        for (index, wave) in self.waves.iter().enumerate() {
            if ctx.is_cancelled() {
                warn!(wave = index, "Run cancelled; no further steps will start");
                failure = Some(PipelineError::Cancelled);
                break;
            }

            let mut runnable = Vec::with_capacity(wave.len());
            for id in wave {
                if self.should_skip(*id, &pruned, &records) {
                    debug!(step = %id, "Skipping step");
                    if let Some(record) = records.get_mut(id) {
                        record.status = StepStatus::Skipped;
                    }
                } else {
                    runnable.push(*id);
                }
            }

            let results = join_all(runnable.iter().map(|id| self.run_step(*id, ctx))).await;

            for (id, (result, elapsed)) in runnable.iter().copied().zip(results) {
                let Some(record) = records.get_mut(&id) else {
                    continue;
                };
                record.duration = elapsed;
                match result {
                    Ok(StepOutcome::Completed) => record.status = StepStatus::Succeeded,
                    Ok(StepOutcome::Branch(chosen)) => {
                        record.status = StepStatus::Succeeded;
                        info!(step = %id, chosen = %chosen, "Branch selected");
                        branch = Some(chosen);
                        pruned.extend(self.dependents(id).iter().filter(|s| **s != chosen));
                    }
                    Err(source) => {
                        record.status = StepStatus::Failed;
                        record.error = Some(source.to_string());
                        let err = PipelineError::Step { step: id, source };
                        error!(step = %id, kind = %err.kind(), error = %err, "Step failed");
                        failure.get_or_insert(err);
                    }
                }
            }

            if failure.is_some() {
                break;
            }
        }

        RunReport {
            run_id: ctx.run_id(),
            steps: self
                .order()
                .into_iter()
                .filter_map(|id| records.remove(&id).map(|r| (id, r)))
                .collect(),
            branch,
            transform: ctx.transform_report(),
            upserted: ctx.upserted(),
            notification: ctx.notification(),
            duration: run_started.elapsed(),
            failure,
        }
    }

    fn should_skip(
        &self,
        id: StepId,
        pruned: &HashSet<StepId>,
        records: &BTreeMap<StepId, StepRecord>,
    ) -> bool {
        if pruned.contains(&id) {
            return true;
        }
        let deps = self.dependencies(id);
        !deps.is_empty()
            && deps
                .iter()
                .all(|d| records.get(d).map(|r| r.status) == Some(StepStatus::Skipped))
    }

    async fn run_step(
        &self,
        id: StepId,
        ctx: &RunContext,
    ) -> (Result<StepOutcome, StepError>, std::time::Duration) {
        let started = Instant::now();
        let result = match self.nodes.get(&id) {
            Some(node) => {
                let span = tracing::info_span!("step", step = %id);
                async {
                    info!("Step started");
                    let result = node.step.execute(ctx).await;
                    if result.is_ok() {
                        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Step finished");
                    }
                    result
                }
                .instrument(span)
                .await
            }
            None => Err(StepError::MissingInput("step node")),
        };
        (result, started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancellationFlag;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct Probe {
        id: StepId,
        outcome: Result<StepOutcome, &'static str>,
        log: Arc<Mutex<Vec<StepId>>>,
    }

    #[async_trait]
    impl PipelineStep for Probe {
        fn id(&self) -> StepId {
            self.id
        }

        async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, StepError> {
            self.log.lock().unwrap().push(self.id);
            self.outcome.map_err(StepError::MissingInput)
        }
    }

    fn node(
        id: StepId,
        deps: &[StepId],
        outcome: Result<StepOutcome, &'static str>,
        log: &Arc<Mutex<Vec<StepId>>>,
    ) -> StepNode {
        StepNode::new(
            Arc::new(Probe {
                id,
                outcome,
                log: log.clone(),
            }),
            deps,
        )
    }

    fn ctx() -> RunContext {
        RunContext::new(
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            CancellationFlag::new(),
        )
    }

    use StepId::*;

    #[test]
    fn test_rejects_duplicates_unknown_and_cycles() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ok = Ok(StepOutcome::Completed);

        let dup = Dag::new(vec![
            node(FetchFinanceData, &[], ok, &log),
            node(FetchFinanceData, &[], ok, &log),
        ]);
        assert!(dup.err().unwrap().to_string().contains("duplicate"));

        let unknown = Dag::new(vec![node(FetchFinanceData, &[CheckDepositAvailable], ok, &log)]);
        assert!(unknown.err().unwrap().to_string().contains("unknown step"));

        let cycle = Dag::new(vec![
            node(FetchFinanceData, &[TransformFinanceData], ok, &log),
            node(TransformFinanceData, &[FetchFinanceData], ok, &log),
        ]);
        assert!(cycle.err().unwrap().to_string().contains("cycle"));
    }

    #[test]
    fn test_waves_join_independent_gates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ok = Ok(StepOutcome::Completed);
        let dag = Dag::new(vec![
            node(CheckDepositAvailable, &[], ok, &log),
            node(CheckSavingAvailable, &[], ok, &log),
            node(FetchFinanceData, &[CheckDepositAvailable, CheckSavingAvailable], ok, &log),
            node(TransformFinanceData, &[FetchFinanceData], ok, &log),
        ])
        .unwrap();

        assert_eq!(
            dag.waves(),
            &[
                vec![CheckDepositAvailable, CheckSavingAvailable],
                vec![FetchFinanceData],
                vec![TransformFinanceData],
            ]
        );
        assert_eq!(dag.dependents(FetchFinanceData), &[TransformFinanceData]);
    }

    #[tokio::test]
    async fn test_branch_skips_other_successor() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ok = Ok(StepOutcome::Completed);
        let dag = Dag::new(vec![
            node(BranchOnComparison, &[], Ok(StepOutcome::Branch(SkipEmailNotification)), &log),
            node(SendResultToActiveUsers, &[BranchOnComparison], ok, &log),
            node(SkipEmailNotification, &[BranchOnComparison], ok, &log),
        ])
        .unwrap();

        let report = dag.execute(&ctx()).await;
        assert!(report.is_success());
        assert_eq!(report.branch, Some(SkipEmailNotification));
        assert_eq!(report.status(SendResultToActiveUsers), Some(StepStatus::Skipped));
        assert_eq!(report.status(SkipEmailNotification), Some(StepStatus::Succeeded));
        assert_eq!(*log.lock().unwrap(), vec![BranchOnComparison, SkipEmailNotification]);
    }

    #[tokio::test]
    async fn test_failure_stops_later_waves() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ok = Ok(StepOutcome::Completed);
        let dag = Dag::new(vec![
            node(CheckDepositAvailable, &[], ok, &log),
            node(CheckSavingAvailable, &[], Err("gate"), &log),
            node(FetchFinanceData, &[CheckDepositAvailable, CheckSavingAvailable], ok, &log),
        ])
        .unwrap();

        let report = dag.execute(&ctx()).await;
        assert!(!report.is_success());
        assert_eq!(report.status(CheckDepositAvailable), Some(StepStatus::Succeeded));
        assert_eq!(report.status(CheckSavingAvailable), Some(StepStatus::Failed));
        assert_eq!(report.status(FetchFinanceData), Some(StepStatus::NotStarted));
        assert_eq!(report.failure().and_then(|e| e.step()), Some(CheckSavingAvailable));
        assert!(!log.lock().unwrap().contains(&FetchFinanceData));
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let dag = Dag::new(vec![node(FetchFinanceData, &[], Ok(StepOutcome::Completed), &log)]).unwrap();

        let flag = CancellationFlag::new();
        flag.cancel();
        let ctx = RunContext::new(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(), flag);

        let report = dag.execute(&ctx).await;
        assert!(matches!(report.failure(), Some(PipelineError::Cancelled)));
        assert!(log.lock().unwrap().is_empty());
    }
}
