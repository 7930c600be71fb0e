//! Pipeline orchestration.
//!
//! [`PipelineCoordinator`] drives the [`StageExecutor`] once per stage in
//! [`StageName::ORDERED`] order while holding the workspace lease for the
//! whole run, applies the transition rules, derives the overall status and
//! hands the frozen [`PipelineRun`] to the report aggregator.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};

use qa_council_core::obs::{
    emit_pipeline_finished, emit_pipeline_started, emit_stage_finished, emit_stage_warning,
    run_span,
};
use qa_council_core::{
    aggregate, Collaborators, FailureKind, NotExecutedReason, PipelineRun, PipelineRunBuilder,
    QaConfig, Report, StageName, StageResult, WorkspaceId, WorkspaceManager,
};

use crate::cancel::Cancellation;
use crate::executor::{StageContext, StageExecutor};
use crate::gate::StatusGate;
use crate::options::PipelineOptions;
use crate::transition::{after, repair_guard, RepairDecision, Transition};

/// One `(locator, branch)` pair for [`PipelineCoordinator::run_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTarget {
    pub locator: String,
    pub branch: String,
}

impl PipelineTarget {
    pub fn new(locator: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            branch: branch.into(),
        }
    }
}

/// Pipeline orchestrator.
pub struct PipelineCoordinator {
    manager: Arc<WorkspaceManager>,
    executor: StageExecutor,
}

impl PipelineCoordinator {
    pub fn new(config: QaConfig, collaborators: Collaborators) -> Self {
        let manager = Arc::new(WorkspaceManager::new(
            config.workspace_dir.clone(),
            collaborators.vcs.clone(),
            Duration::from_secs(config.acquire_timeout_secs),
        ));
        let executor = StageExecutor::new(Arc::new(config), collaborators, manager.clone());
        Self { manager, executor }
    }

    pub fn manager(&self) -> &Arc<WorkspaceManager> {
        &self.manager
    }

    /// Run the full pipeline against `(locator, branch)` and return its report.
    pub async fn run_pipeline(
        &self,
        locator: &str,
        branch: &str,
        options: &PipelineOptions,
    ) -> Report {
        let run = self
            .execute(locator, branch, options, &Cancellation::never())
            .await;
        aggregate(&run)
    }

    /// Run several pipelines concurrently. Runs on the same identity are serialised
    /// by the workspace lease; reports come back in `targets` order.
    pub async fn run_batch(
        &self,
        targets: &[PipelineTarget],
        options: &PipelineOptions,
    ) -> Vec<Report> {
        join_all(
            targets
                .iter()
                .map(|t| self.run_pipeline(&t.locator, &t.branch, options)),
        )
        .await
    }

    /// Execute every stage and return the finalized run.
    ///
    /// Always yields a complete run: one result per stage, in order.
    pub async fn execute(
        &self,
        locator: &str,
        branch: &str,
        options: &PipelineOptions,
        cancellation: &Cancellation,
    ) -> PipelineRun {
        let builder = PipelineRun::start(locator, branch);
        let span = run_span(&builder.run_id().to_string());
        self.drive(builder, locator, branch, options, cancellation)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        mut builder: PipelineRunBuilder,
        locator: &str,
        branch: &str,
        options: &PipelineOptions,
        cancellation: &Cancellation,
    ) -> PipelineRun {
        let run_id = builder.run_id().to_string();
        emit_pipeline_started(&run_id, locator, branch);

        let id = WorkspaceId::derive(locator, branch);
        let lease = tokio::select! {
            biased;
            _ = cancellation.cancelled() => None,
            lease = self.manager.lease(&id) => Some(lease),
        };

        let Some(lease) = lease else {
            warn!(run_id = %run_id, "cancelled while waiting for workspace lease");
            let reason = NotExecutedReason::Cancelled {
                stage: StageName::Acquire,
            };
            record(
                &mut builder,
                &run_id,
                StageResult::failure(
                    StageName::Acquire,
                    FailureKind::Cancelled,
                    "cancelled while waiting for workspace lease",
                ),
            );
            for stage in &StageName::ORDERED[1..] {
                record(&mut builder, &run_id, StageResult::not_executed(*stage, reason));
            }
            return finish(builder, &run_id);
        };

        let ctx = StageContext {
            run_id: &run_id,
            locator,
            branch,
            options,
            lease: &lease,
            cancellation,
        };

        let mut halted = None;
        for stage in StageName::ORDERED {
            let result = match halted {
                Some(reason) => StageResult::not_executed(stage, reason),
                None if stage == StageName::Repair => {
                    match repair_guard(builder.result(StageName::Run)) {
                        RepairDecision::Execute => {
                            self.executor.run(stage, &ctx, builder.results()).await
                        }
                        RepairDecision::Skip(reason) => StageResult::repair_skipped(reason),
                    }
                }
                None => self.executor.run(stage, &ctx, builder.results()).await,
            };

            if halted.is_none() {
                if let Transition::Halt(reason) = after(&result) {
                    halted = Some(reason);
                }
            }
            record(&mut builder, &run_id, result);
        }

        drop(lease);
        finish(builder, &run_id)
    }
}

fn record(builder: &mut PipelineRunBuilder, run_id: &str, result: StageResult) {
    for warning in &result.warnings {
        emit_stage_warning(run_id, result.stage, &warning.message);
    }
    emit_stage_finished(run_id, &result);
    if let Err(e) = builder.record(result) {
        warn!(run_id = %run_id, error = %e, "stage result rejected");
    }
}

fn finish(builder: PipelineRunBuilder, run_id: &str) -> PipelineRun {
    let verdict = StatusGate::evaluate(builder.results());
    if !verdict.reasons.is_empty() {
        info!(run_id = %run_id, reasons = ?verdict.reasons, "{}", verdict.message);
    }
    let run = builder.finish(verdict.status);
    emit_pipeline_finished(run_id, run.status(), run.duration_ms(), run.stages());
    run
}
