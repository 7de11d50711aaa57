//! Concrete pipeline steps and the graph that wires them.
//!
//! ```text
//! check_deposit_available ─┐
//!                          ├─> fetch ─> transform ─> validate ─> upsert ─> compare ─> branch ─┬─> send_result_to_active_users
//! check_saving_available ──┘                                                                  └─> skip_email_notification
//! ```

use crate::context::{FetchedProducts, RunContext};
use crate::dag::{Dag, PipelineStep, StepId, StepNode, StepOutcome};
use crate::error::{PipelineError, StepError};
use crate::notify::Notifier;
use adapter_finlife::{AvailabilityGate, AvailabilityProbe, GatePolicy, ProductSource};
use async_trait::async_trait;
use infra_store::ProductStore;
use rates_core::{build_batch, Branch, ProductType};
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators the pipeline steps call.
#[derive(Clone)]
pub struct PipelineDeps {
    /// Readiness probe for the deposit listing
    pub deposit_probe: Arc<dyn AvailabilityProbe>,
    /// Readiness probe for the savings listing
    pub saving_probe: Arc<dyn AvailabilityProbe>,
    /// Gate polling policy
    pub gate_policy: GatePolicy,
    /// Product fetcher
    pub source: Arc<dyn ProductSource>,
    /// Product and subscriber store
    pub store: Arc<dyn ProductStore>,
    /// Result notifier
    pub notifier: Notifier,
}

struct GateStep {
    id: StepId,
    gate: AvailabilityGate,
}

#[async_trait]
impl PipelineStep for GateStep {
    fn id(&self) -> StepId {
        self.id
    }

    async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, StepError> {
        self.gate.wait_until_ready().await?;
        Ok(StepOutcome::Completed)
    }
}

struct FetchStep {
    source: Arc<dyn ProductSource>,
}

#[async_trait]
impl PipelineStep for FetchStep {
    fn id(&self) -> StepId {
        StepId::FetchFinanceData
    }

    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, StepError> {
        let (deposit, saving) = tokio::try_join!(
            self.source.fetch(ProductType::Deposit),
            self.source.fetch(ProductType::Saving),
        )?;
        info!(deposit = deposit.len(), saving = saving.len(), "Fetched raw products");
        ctx.put_fetched(FetchedProducts { deposit, saving });
        Ok(StepOutcome::Completed)
    }
}

struct TransformStep;

#[async_trait]
impl PipelineStep for TransformStep {
    fn id(&self) -> StepId {
        StepId::TransformFinanceData
    }

    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, StepError> {
        let fetched = ctx
            .take_fetched()
            .ok_or(StepError::MissingInput("fetched products"))?;
        let (batch, report) = build_batch(&fetched.deposit, &fetched.saving, ctx.collected_at());

        if report.dropped() > 0 {
            warn!(
                missing_institution = report.missing_institution,
                missing_product_code = report.missing_product_code,
                invalid_term = report.invalid_term,
                "Dropped incomplete records"
            );
        }
        info!(
            input = report.input,
            rows = batch.len(),
            collapsed = report.collapsed,
            "Transformed products"
        );
        ctx.put_batch(batch, report);
        Ok(StepOutcome::Completed)
    }
}

struct ValidateCredentialsStep {
    store: Arc<dyn ProductStore>,
}

#[async_trait]
impl PipelineStep for ValidateCredentialsStep {
    fn id(&self) -> StepId {
        StepId::ValidateStoreCredentials
    }

    async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, StepError> {
        self.store.validate_credentials().await?;
        Ok(StepOutcome::Completed)
    }
}

struct UpsertStep {
    store: Arc<dyn ProductStore>,
}

#[async_trait]
impl PipelineStep for UpsertStep {
    fn id(&self) -> StepId {
        StepId::UpsertFinanceData
    }

    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, StepError> {
        let batch = ctx
            .take_batch()
            .ok_or(StepError::MissingInput("canonical batch"))?;
        let written = self.store.upsert_products(&batch).await?;
        ctx.put_upserted(written);
        Ok(StepOutcome::Completed)
    }
}

struct CompareStep {
    store: Arc<dyn ProductStore>,
}

#[async_trait]
impl PipelineStep for CompareStep {
    fn id(&self) -> StepId {
        StepId::CompareProducts
    }

    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, StepError> {
        let result = self.store.compare_products().await?;
        info!(entries = result.len(), "Comparison finished");
        ctx.put_comparison(result);
        Ok(StepOutcome::Completed)
    }
}

struct BranchStep;

#[async_trait]
impl PipelineStep for BranchStep {
    fn id(&self) -> StepId {
        StepId::BranchOnComparison
    }

    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, StepError> {
        let result = ctx
            .comparison()
            .ok_or(StepError::MissingInput("comparison result"))?;
        let chosen = match Branch::select(&result) {
            Branch::Notify => StepId::SendResultToActiveUsers,
            Branch::Skip => StepId::SkipEmailNotification,
        };
        Ok(StepOutcome::Branch(chosen))
    }
}

struct NotifyStep {
    store: Arc<dyn ProductStore>,
    notifier: Notifier,
}

#[async_trait]
impl PipelineStep for NotifyStep {
    fn id(&self) -> StepId {
        StepId::SendResultToActiveUsers
    }

    async fn execute(&self, ctx: &RunContext) -> Result<StepOutcome, StepError> {
        let result = ctx
            .comparison()
            .ok_or(StepError::MissingInput("comparison result"))?;
        let subscribers = self.store.active_subscribers().await?;
        let report = self.notifier.notify(&result, &subscribers).await;
        ctx.put_notification(report);
        Ok(StepOutcome::Completed)
    }
}

struct SkipStep;

#[async_trait]
impl PipelineStep for SkipStep {
    fn id(&self) -> StepId {
        StepId::SkipEmailNotification
    }

    async fn execute(&self, _ctx: &RunContext) -> Result<StepOutcome, StepError> {
        info!("No new better products; skipping notification");
        Ok(StepOutcome::Completed)
    }
}

/// Build the pipeline graph over `deps`.
pub fn pipeline_graph(deps: PipelineDeps) -> Result<Dag, PipelineError> {
    use StepId::*;

    let gate = |id: StepId, probe: Arc<dyn AvailabilityProbe>| -> Arc<dyn PipelineStep> {
        Arc::new(GateStep {
            id,
            gate: AvailabilityGate::new(probe, deps.gate_policy),
        })
    };

    Dag::new(vec![
        StepNode::new(gate(CheckDepositAvailable, deps.deposit_probe.clone()), &[]),
        StepNode::new(gate(CheckSavingAvailable, deps.saving_probe.clone()), &[]),
        StepNode::new(
            Arc::new(FetchStep {
                source: deps.source.clone(),
            }),
            &[CheckDepositAvailable, CheckSavingAvailable],
        ),
        StepNode::new(Arc::new(TransformStep), &[FetchFinanceData]),
        StepNode::new(
            Arc::new(ValidateCredentialsStep {
                store: deps.store.clone(),
            }),
            &[TransformFinanceData],
        ),
        StepNode::new(
            Arc::new(UpsertStep {
                store: deps.store.clone(),
            }),
            &[ValidateStoreCredentials],
        ),
        StepNode::new(
            Arc::new(CompareStep {
                store: deps.store.clone(),
            }),
            &[UpsertFinanceData],
        ),
        StepNode::new(Arc::new(BranchStep), &[CompareProducts]),
        StepNode::new(
            Arc::new(NotifyStep {
                store: deps.store.clone(),
                notifier: deps.notifier.clone(),
            }),
            &[BranchOnComparison],
        ),
        StepNode::new(Arc::new(SkipStep), &[BranchOnComparison]),
    ])
}
