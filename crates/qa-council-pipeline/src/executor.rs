//! Stage execution against a leased workspace.
//!
//! [`StageExecutor::run`] invokes one named stage and always returns a
//! [`StageResult`]. Collaborator errors are classified into the bounded
//! [`FailureKind`] taxonomy; non-fatal conditions become warnings.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use qa_council_core::git::parse_github_repo;
use qa_council_core::repair::plan_fixes;
use qa_council_core::resolve_test_command;
use qa_council_core::{
    AcquirePayload, CollaboratorError, Collaborators, DispatchOutcome, DispatchRequest,
    FailureKind, GeneratePayload, InspectPayload, PublishPayload, QaConfig, QaError, SkipReason,
    StageName, StagePayload, StageResult, StageWarning, TriggerConfig, WarningKind, Workspace,
    WorkspaceLease, WorkspaceManager,
};

use crate::cancel::Cancellation;
use crate::options::PipelineOptions;

/// Everything a stage needs beyond prior results.
pub struct StageContext<'a> {
    pub run_id: &'a str,
    pub locator: &'a str,
    pub branch: &'a str,
    pub options: &'a PipelineOptions,
    pub lease: &'a WorkspaceLease,
    pub cancellation: &'a Cancellation,
}

/// Runs single stages through the configured collaborators.
pub struct StageExecutor {
    config: Arc<QaConfig>,
    collaborators: Collaborators,
    manager: Arc<WorkspaceManager>,
}

impl StageExecutor {
    pub fn new(
        config: Arc<QaConfig>,
        collaborators: Collaborators,
        manager: Arc<WorkspaceManager>,
    ) -> Self {
        Self {
            config,
            collaborators,
            manager,
        }
    }

    /// Execute `stage`, racing it against the run's cancellation.
    pub async fn run(
        &self,
        stage: StageName,
        ctx: &StageContext<'_>,
        prior: &[StageResult],
    ) -> StageResult {
        let start = Instant::now();
        debug!(run_id = %ctx.run_id, %stage, "executing stage");

        let result = tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => {
                warn!(run_id = %ctx.run_id, %stage, "stage cancelled");
                StageResult::failure(
                    stage,
                    FailureKind::Cancelled,
                    "cancelled by external signal or deadline",
                )
            }
            result = self.execute(stage, ctx, prior) => result,
        };

        result.with_duration(start.elapsed().as_millis() as u64)
    }

    async fn execute(
        &self,
        stage: StageName,
        ctx: &StageContext<'_>,
        prior: &[StageResult],
    ) -> StageResult {
        let workspace = match stage {
            StageName::Acquire => return self.acquire(ctx).await,
            _ => match self.manager.resolve(ctx.lease.id()).await {
                Ok(workspace) => workspace,
                Err(e) => {
                    return StageResult::failure(stage, FailureKind::WorkspaceInvalid, e.to_string())
                }
            },
        };

        match stage {
            StageName::Acquire => unreachable!("acquire returns before resolving"),
            StageName::Inspect => self.inspect(&workspace).await,
            StageName::Generate => self.generate(&workspace, ctx, prior).await,
            StageName::Run => self.run_tests(&workspace, ctx).await,
            StageName::Repair => repair(prior),
            StageName::Publish => self.publish(&workspace, ctx).await,
        }
    }

    async fn acquire(&self, ctx: &StageContext<'_>) -> StageResult {
        match self.manager.acquire_with(ctx.lease, ctx.locator, ctx.branch).await {
            Ok(acquired) => {
                let ws = acquired.workspace;
                let verb = if acquired.refreshed { "refreshed" } else { "cloned" };
                let short: String = ws.revision.chars().take(12).collect();
                let summary = format!("{verb} {}@{} at {short}", ws.locator, ws.branch);
                StageResult::success(
                    StagePayload::Acquire(AcquirePayload {
                        workspace_id: ws.id,
                        root: ws.root,
                        revision: ws.revision,
                        refreshed: acquired.refreshed,
                    }),
                    summary,
                )
            }
            Err(QaError::Acquisition { kind, message }) => {
                StageResult::failure(StageName::Acquire, kind.failure_kind(), message)
            }
            Err(QaError::Io(e)) => StageResult::failure(
                StageName::Acquire,
                FailureKind::StorageUnwritable,
                e.to_string(),
            ),
            Err(e) => StageResult::failure(
                StageName::Acquire,
                FailureKind::WorkspaceInvalid,
                e.to_string(),
            ),
        }
    }

    async fn inspect(&self, workspace: &Workspace) -> StageResult {
        let pattern = &self.config.file_pattern;
        match self.collaborators.analyzer.inspect(&workspace.root, pattern).await {
            Ok(files) => {
                let payload = InspectPayload {
                    file_pattern: pattern.clone(),
                    files,
                };
                let summary = format!(
                    "{} files, {} functions, {} classes",
                    payload.total_files(),
                    payload.total_functions(),
                    payload.total_classes()
                );
                let warnings = if payload.files.is_empty() {
                    vec![StageWarning::new(
                        WarningKind::EmptyInventory,
                        format!("no files match '{pattern}'"),
                    )]
                } else {
                    Vec::new()
                };
                StageResult::success(StagePayload::Inspect(payload), summary)
                    .with_warnings(warnings)
            }
            Err(e) => {
                StageResult::failure(StageName::Inspect, FailureKind::AnalysisError, e.to_string())
            }
        }
    }

    async fn generate(
        &self,
        workspace: &Workspace,
        ctx: &StageContext<'_>,
        prior: &[StageResult],
    ) -> StageResult {
        let Some(StagePayload::Inspect(inventory)) = payload(prior, StageName::Inspect) else {
            return StageResult::failure(
                StageName::Generate,
                FailureKind::GenerationFailed,
                "no inventory from inspect",
            );
        };

        let selector = ctx.options.target_selector();
        match self
            .collaborators
            .generator
            .generate(&workspace.root, &inventory.files, &selector)
            .await
        {
            Ok(output) => {
                let warnings: Vec<StageWarning> = output
                    .conflicts
                    .iter()
                    .map(|path| {
                        StageWarning::new(
                            WarningKind::GenerationConflict,
                            format!("kept human-authored {}", path.display()),
                        )
                        .with_path(path)
                    })
                    .collect();
                let summary = format!(
                    "{} test cases in {} files for {} targets ({} preserved)",
                    output.test_cases,
                    output.written.len(),
                    output.targets,
                    output.conflicts.len()
                );
                let complete = output.is_complete();
                let errors = output.errors.join("; ");
                let payload = StagePayload::Generate(GeneratePayload {
                    written: output.written,
                    preserved: output.conflicts,
                    test_cases: output.test_cases,
                    targets: output.targets,
                });
                let result = if complete {
                    StageResult::success(payload, summary)
                } else {
                    StageResult::failure(
                        StageName::Generate,
                        FailureKind::GenerationFailed,
                        format!("partial generation, {summary}: {errors}"),
                    )
                    .with_payload(payload)
                };
                result.with_warnings(warnings)
            }
            Err(e) => StageResult::failure(
                StageName::Generate,
                FailureKind::GenerationFailed,
                e.to_string(),
            ),
        }
    }

    async fn run_tests(&self, workspace: &Workspace, ctx: &StageContext<'_>) -> StageResult {
        let timeout = ctx.options.run_timeout();
        let selector = ctx.options.test_selector.as_deref();
        let outcome = tokio::time::timeout(
            timeout,
            self.collaborators.executor.run(&workspace.root, selector, timeout),
        )
        .await;

        match outcome {
            Ok(Ok(summary)) => {
                let text = format!(
                    "{} passed, {} failed, {} skipped",
                    summary.passed, summary.failed, summary.skipped
                );
                info!(
                    run_id = %ctx.run_id,
                    passed = summary.passed,
                    failed = summary.failed,
                    "tests executed"
                );
                StageResult::success(StagePayload::Run(summary), text)
            }
            Ok(Err(CollaboratorError::Timeout { secs })) => StageResult::failure(
                StageName::Run,
                FailureKind::ExecutionTimeout,
                format!("test runner exceeded {secs}s"),
            ),
            Ok(Err(e)) => {
                StageResult::failure(StageName::Run, FailureKind::ExecutionCrash, e.to_string())
            }
            Err(_) => StageResult::failure(
                StageName::Run,
                FailureKind::ExecutionTimeout,
                format!("test runner exceeded {}s", timeout.as_secs()),
            ),
        }
    }

    async fn publish(&self, workspace: &Workspace, ctx: &StageContext<'_>) -> StageResult {
        let trigger =
            TriggerConfig::new(self.config.workflow_branches.clone()).including(ctx.branch);
        let test_command = resolve_test_command(&self.config.test_command, &workspace.root);
        let config_path = match self
            .collaborators
            .renderer
            .render(&workspace.root, &test_command, &trigger)
            .await
        {
            Ok(path) => path,
            Err(e) => {
                return StageResult::failure(
                    StageName::Publish,
                    FailureKind::RenderFailed,
                    e.to_string(),
                )
            }
        };

        let (dispatch, warning) = self.dispatch(ctx).await;
        let summary = format!(
            "workflow written to {}; dispatch {}",
            config_path.display(),
            dispatch_label(&dispatch)
        );
        StageResult::success(
            StagePayload::Publish(PublishPayload {
                config_path,
                dispatch,
            }),
            summary,
        )
        .with_warnings(warning.into_iter().collect())
    }

    /// One dispatch attempt. Every failure is a warning.
    async fn dispatch(&self, ctx: &StageContext<'_>) -> (DispatchOutcome, Option<StageWarning>) {
        if !ctx.options.dispatch_enabled {
            return (DispatchOutcome::Disabled, None);
        }
        let Some(credential) = self.config.github_token.as_deref() else {
            return (
                DispatchOutcome::MissingCredential,
                Some(StageWarning::new(
                    WarningKind::DispatchUnauthorized,
                    "dispatch skipped: no GITHUB_TOKEN configured",
                )),
            );
        };
        let Some((owner, repo)) = parse_github_repo(ctx.locator) else {
            let message = format!("{} is not a GitHub repository", ctx.locator);
            return (
                DispatchOutcome::Failed {
                    message: message.clone(),
                },
                Some(StageWarning::new(WarningKind::DispatchFailed, message)),
            );
        };

        let request = DispatchRequest {
            owner,
            repo,
            git_ref: ctx.branch.to_string(),
        };
        let timeout = Duration::from_secs(self.config.dispatch_timeout_secs);
        let outcome = tokio::time::timeout(
            timeout,
            self.collaborators.dispatcher.dispatch(&request, credential),
        )
        .await;

        match outcome {
            Ok(Ok(())) => (DispatchOutcome::Accepted, None),
            Ok(Err(CollaboratorError::Unauthorized(message))) => (
                DispatchOutcome::Unauthorized {
                    message: message.clone(),
                },
                Some(StageWarning::new(
                    WarningKind::DispatchUnauthorized,
                    format!("dispatch unauthorized: {message}"),
                )),
            ),
            Ok(Err(e)) => {
                let message = e.to_string();
                (
                    DispatchOutcome::Failed {
                        message: message.clone(),
                    },
                    Some(StageWarning::new(
                        WarningKind::DispatchFailed,
                        format!("dispatch failed: {message}"),
                    )),
                )
            }
            Err(_) => {
                let message = format!("dispatch timed out after {}s", timeout.as_secs());
                (
                    DispatchOutcome::Failed {
                        message: message.clone(),
                    },
                    Some(StageWarning::new(WarningKind::DispatchFailed, message)),
                )
            }
        }
    }
}

fn payload(prior: &[StageResult], stage: StageName) -> Option<&StagePayload> {
    prior
        .iter()
        .find(|r| r.stage == stage)
        .and_then(|r| r.payload.as_ref())
}

fn repair(prior: &[StageResult]) -> StageResult {
    let Some(StagePayload::Run(summary)) = payload(prior, StageName::Run) else {
        return StageResult::repair_skipped(SkipReason::RunDidNotComplete);
    };
    let plan = plan_fixes(summary);
    let text = format!(
        "{} suggested fixes for {} failing tests",
        plan.fixes.len(),
        summary.failed
    );
    StageResult::success(StagePayload::Repair(plan), text)
}

fn dispatch_label(outcome: &DispatchOutcome) -> &'static str {
    match outcome {
        DispatchOutcome::Disabled => "disabled",
        DispatchOutcome::Accepted => "accepted",
        DispatchOutcome::MissingCredential => "skipped (no credential)",
        DispatchOutcome::Unauthorized { .. } => "unauthorized",
        DispatchOutcome::Failed { .. } => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_council_core::fakes::FakeSet;
    use qa_council_core::{FailureRecord, StageStatus, TestRunSummary, WorkspaceId};

    struct Harness {
        _dir: tempfile::TempDir,
        manager: Arc<WorkspaceManager>,
        executor: StageExecutor,
    }

    fn harness(fakes: &FakeSet) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(QaConfig {
            workspace_dir: dir.path().join("ws"),
            ..QaConfig::default()
        });
        let collaborators = fakes.collaborators();
        let manager = Arc::new(WorkspaceManager::new(
            &config.workspace_dir,
            collaborators.vcs.clone(),
            Duration::from_secs(5),
        ));
        let executor = StageExecutor::new(config, collaborators, manager.clone());
        Harness {
            _dir: dir,
            manager,
            executor,
        }
    }

    #[tokio::test]
    async fn test_stage_without_workspace_is_invalid() {
        let fakes = FakeSet::new();
        let h = harness(&fakes);
        let lease = h.manager.lease(&WorkspaceId::derive("repo", "main")).await;
        let options = PipelineOptions::default();
        let cancellation = Cancellation::never();
        let ctx = StageContext {
            run_id: "r",
            locator: "repo",
            branch: "main",
            options: &options,
            lease: &lease,
            cancellation: &cancellation,
        };

        let result = h.executor.run(StageName::Inspect, &ctx, &[]).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::WorkspaceInvalid));
        assert_eq!(fakes.analyzer.calls(), 0);
    }

    #[tokio::test]
    async fn test_acquire_then_inspect() {
        let fakes = FakeSet::new();
        let h = harness(&fakes);
        let lease = h.manager.lease(&WorkspaceId::derive("repo", "main")).await;
        let options = PipelineOptions::default();
        let cancellation = Cancellation::never();
        let ctx = StageContext {
            run_id: "r",
            locator: "repo",
            branch: "main",
            options: &options,
            lease: &lease,
            cancellation: &cancellation,
        };

        let acquired = h.executor.run(StageName::Acquire, &ctx, &[]).await;
        assert!(acquired.passed());
        let inspected = h.executor.run(StageName::Inspect, &ctx, &[acquired]).await;
        assert!(inspected.passed());
        assert!(inspected.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_generate_without_inventory_fails() {
        let fakes = FakeSet::new();
        let h = harness(&fakes);
        let lease = h.manager.lease(&WorkspaceId::derive("repo", "main")).await;
        let options = PipelineOptions::default();
        let cancellation = Cancellation::never();
        let ctx = StageContext {
            run_id: "r",
            locator: "repo",
            branch: "main",
            options: &options,
            lease: &lease,
            cancellation: &cancellation,
        };
        let acquired = h.executor.run(StageName::Acquire, &ctx, &[]).await;

        let result = h.executor.run(StageName::Generate, &ctx, &[acquired]).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::GenerationFailed));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fakes = FakeSet::new();
        let h = harness(&fakes);
        let lease = h.manager.lease(&WorkspaceId::derive("repo", "main")).await;
        let options = PipelineOptions::default();
        let (handle, cancellation) = Cancellation::channel();
        handle.cancel();
        let ctx = StageContext {
            run_id: "r",
            locator: "repo",
            branch: "main",
            options: &options,
            lease: &lease,
            cancellation: &cancellation,
        };

        let result = h.executor.run(StageName::Acquire, &ctx, &[]).await;
        assert!(result.was_cancelled());
        assert_eq!(fakes.vcs.calls(), 0);
    }

    #[test]
    fn test_repair_plans_from_run_payload() {
        let summary = TestRunSummary {
            failed: 1,
            failures: vec![FailureRecord::new("t", "AssertionError").at("tests/t.py", Some(3))],
            ..TestRunSummary::default()
        };
        let run = StageResult::success(StagePayload::Run(summary), "ran");
        let result = repair(&[run]);
        assert_eq!(result.status(), StageStatus::Success);
        match result.payload {
            Some(StagePayload::Repair(plan)) => assert_eq!(plan.fixes.len(), 1),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_repair_without_run_payload_skips() {
        let result = repair(&[]);
        assert_eq!(result.status(), StageStatus::Skipped);
    }
}
