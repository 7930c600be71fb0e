//! Pipeline run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{QaError, Result};
use crate::domain::payload::StagePayload;
use crate::domain::stage::{StageName, StageResult};
use crate::domain::workspace::WorkspaceId;

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every stage succeeded and no test failed.
    Success,
    /// Tests ran but some failed, or a non-fatal stage failed.
    CompletedWithFailures,
    /// A fatal stage failed, the test runner never completed, or the run was cancelled.
    Failed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStatus::Success => "success",
            PipelineStatus::CompletedWithFailures => "completed_with_failures",
            PipelineStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Ordered, finalized history of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    run_id: Uuid,
    workspace_id: WorkspaceId,
    locator: String,
    branch: String,
    stages: Vec<StageResult>,
    status: PipelineStatus,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Start recording a new run.
    pub fn start(locator: &str, branch: &str) -> PipelineRunBuilder {
        PipelineRunBuilder {
            run_id: Uuid::new_v4(),
            workspace_id: WorkspaceId::derive(locator, branch),
            locator: locator.to_string(),
            branch: branch.to_string(),
            stages: Vec::with_capacity(StageName::ORDERED.len()),
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Stage results in [`StageName::ORDERED`] order.
    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn stage(&self, name: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// Append-only builder; the only way to assemble a [`PipelineRun`].
#[derive(Debug)]
pub struct PipelineRunBuilder {
    run_id: Uuid,
    workspace_id: WorkspaceId,
    locator: String,
    branch: String,
    stages: Vec<StageResult>,
    started_at: DateTime<Utc>,
}

impl PipelineRunBuilder {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    /// The stage that must be recorded next, if any.
    pub fn next_stage(&self) -> Option<StageName> {
        StageName::ORDERED.get(self.stages.len()).copied()
    }

    /// Append a result, enforcing the fixed stage order.
    pub fn record(&mut self, result: StageResult) -> Result<()> {
        let expected = self.next_stage().ok_or(QaError::RunComplete)?;
        if result.stage != expected {
            return Err(QaError::StageOrder {
                expected,
                actual: result.stage,
            });
        }
        self.stages.push(result);
        Ok(())
    }

    pub fn results(&self) -> &[StageResult] {
        &self.stages
    }

    pub fn result(&self, name: StageName) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Payload recorded for `name`, if that stage produced one.
    pub fn payload(&self, name: StageName) -> Option<&StagePayload> {
        self.result(name).and_then(|r| r.payload.as_ref())
    }

    /// Freeze the run with its derived overall status.
    pub fn finish(self, status: PipelineStatus) -> PipelineRun {
        PipelineRun {
            run_id: self.run_id,
            workspace_id: self.workspace_id,
            locator: self.locator,
            branch: self.branch,
            stages: self.stages,
            status,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stage::{FailureKind, NotExecutedReason};

    #[test]
    fn test_builder_enforces_order() {
        let mut builder = PipelineRun::start("https://github.com/acme/app", "main");
        assert_eq!(builder.next_stage(), Some(StageName::Acquire));

        let err = builder
            .record(StageResult::failure(
                StageName::Inspect,
                FailureKind::AnalysisError,
                "unreadable",
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            QaError::StageOrder {
                expected: StageName::Acquire,
                actual: StageName::Inspect
            }
        ));
    }

    #[test]
    fn test_builder_rejects_seventh_stage() {
        let mut builder = PipelineRun::start("repo", "main");
        for stage in StageName::ORDERED {
            builder
                .record(StageResult::not_executed(
                    stage,
                    NotExecutedReason::Cancelled {
                        stage: StageName::Acquire,
                    },
                ))
                .unwrap();
        }
        assert_eq!(builder.next_stage(), None);
        let err = builder
            .record(StageResult::failure(
                StageName::Publish,
                FailureKind::RenderFailed,
                "x",
            ))
            .unwrap_err();
        assert!(matches!(err, QaError::RunComplete));
    }

    #[test]
    fn test_finish_freezes_identity() {
        let builder = PipelineRun::start("https://github.com/acme/app.git", "main");
        let run_id = builder.run_id();
        let run = builder.finish(PipelineStatus::Failed);
        assert_eq!(run.run_id(), run_id);
        assert_eq!(
            run.workspace_id(),
            &WorkspaceId::derive("https://github.com/acme/app", "main")
        );
        assert_eq!(run.status(), PipelineStatus::Failed);
        assert!(run.finished_at() >= run.started_at());
        assert!(run.stages().is_empty());
    }

    #[test]
    fn test_pipeline_status_display() {
        assert_eq!(PipelineStatus::Success.to_string(), "success");
        assert_eq!(
            PipelineStatus::CompletedWithFailures.to_string(),
            "completed_with_failures"
        );
        assert_eq!(PipelineStatus::Failed.to_string(), "failed");
    }
}
