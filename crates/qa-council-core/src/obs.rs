//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan` RAII guard and [`run_span`]
//! - Emission functions for key lifecycle events: start, stage finish, warning, finish
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::info;

use crate::domain::{PipelineStatus, StageName, StageResult, StageStatus};

/// Span tagging everything inside one pipeline run.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("qa.run", run_id = %run_id)
}

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// The guard is `!Send`; async code instruments its future with [`run_span`] instead.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("2d0c…");
/// // Now all tracing calls are associated with run_id = "2d0c…"
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run_id.
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// Emit event: pipeline started against a target.
pub fn emit_pipeline_started(run_id: &str, locator: &str, branch: &str) {
    info!(event = "pipeline.started", run_id = %run_id, locator = %locator, branch = %branch);
}

/// Emit event: one stage recorded.
pub fn emit_stage_finished(run_id: &str, result: &StageResult) {
    let kind = result.failure_kind().map(|k| k.as_str()).unwrap_or("");
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %result.stage,
        status = %result.status(),
        failure_kind = kind,
        duration_ms = result.duration_ms,
    );
}

/// Emit event: a non-fatal warning attached to a stage.
pub fn emit_stage_warning(run_id: &str, stage: StageName, message: &str) {
    tracing::warn!(event = "stage.warning", run_id = %run_id, stage = %stage, message = %message);
}

/// Emit event: pipeline finished with its overall status.
pub fn emit_pipeline_finished(
    run_id: &str,
    status: PipelineStatus,
    duration_ms: u64,
    stages: &[StageResult],
) {
    let failed = stages
        .iter()
        .filter(|s| s.status() == StageStatus::Failure)
        .count();
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        status = %status,
        duration_ms = duration_ms,
        failed_stages = failed,
    );
}
