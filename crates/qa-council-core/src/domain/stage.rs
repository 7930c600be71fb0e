//! Pipeline stage definitions and immutable stage outcome records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::payload::StagePayload;

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Clone or refresh the target repository.
    Acquire,

    /// Inventory functions/classes per source file.
    Inspect,

    /// Emit test artifacts from the inventory.
    Generate,

    /// Execute the test suite and collect coverage.
    Run,

    /// Classify failures into suggested fixes (conditional).
    Repair,

    /// Render the CI workflow and optionally dispatch it.
    Publish,
}

impl StageName {
    /// Fixed, total stage order.
    pub const ORDERED: [StageName; 6] = [
        StageName::Acquire,
        StageName::Inspect,
        StageName::Generate,
        StageName::Run,
        StageName::Repair,
        StageName::Publish,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            StageName::Acquire => "acquire",
            StageName::Inspect => "inspect",
            StageName::Generate => "generate",
            StageName::Run => "run",
            StageName::Repair => "repair",
            StageName::Publish => "publish",
        }
    }

    /// Whether a failure of this stage short-circuits the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageName::Acquire | StageName::Inspect)
    }

    /// Whether this stage only runs behind a guard.
    pub fn is_conditional(&self) -> bool {
        matches!(self, StageName::Repair)
    }

    /// Whether this stage suspends on network or test execution and carries a timeout.
    pub fn has_timeout(&self) -> bool {
        matches!(
            self,
            StageName::Acquire | StageName::Run | StageName::Publish
        )
    }

    /// Position in [`StageName::ORDERED`].
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse stage status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failure,
    Skipped,
    NotExecuted,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Success => "success",
            StageStatus::Failure => "failure",
            StageStatus::Skipped => "skipped",
            StageStatus::NotExecuted => "not_executed",
        };
        f.write_str(s)
    }
}

/// Bounded failure taxonomy shared by every stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Auth,
    SourceNotFound,
    StorageUnwritable,
    AnalysisError,
    GenerationFailed,
    ExecutionTimeout,
    ExecutionCrash,
    RenderFailed,
    WorkspaceInvalid,
    Cancelled,
}

impl FailureKind {
    /// Whether this kind originates from workspace acquisition.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            FailureKind::Network
                | FailureKind::Auth
                | FailureKind::SourceNotFound
                | FailureKind::StorageUnwritable
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Auth => "auth",
            FailureKind::SourceNotFound => "source_not_found",
            FailureKind::StorageUnwritable => "storage_unwritable",
            FailureKind::AnalysisError => "analysis_error",
            FailureKind::GenerationFailed => "generation_failed",
            FailureKind::ExecutionTimeout => "execution_timeout",
            FailureKind::ExecutionCrash => "execution_crash",
            FailureKind::RenderFailed => "render_failed",
            FailureKind::WorkspaceInvalid => "workspace_invalid",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal conditions reported alongside a stage result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A human-authored test file already occupies a generated path.
    GenerationConflict,
    /// Dispatch credential missing or rejected.
    DispatchUnauthorized,
    /// Dispatch could not be delivered.
    DispatchFailed,
    /// No files matched the inspection pattern.
    EmptyInventory,
}

/// A warning attached to a stage result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageWarning {
    pub kind: WarningKind,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl StageWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Why the Repair stage was skipped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Run executed and every test passed.
    NoFailingTests,
    /// Run did not complete, so there are no failure records to classify.
    RunDidNotComplete,
}

/// Why a stage never ran.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotExecutedReason {
    /// A fatal upstream stage failed.
    UpstreamFailure { stage: StageName },
    /// An upstream stage was cancelled.
    Cancelled { stage: StageName },
}

impl std::fmt::Display for NotExecutedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotExecutedReason::UpstreamFailure { stage } => {
                write!(f, "upstream stage '{stage}' failed")
            }
            NotExecutedReason::Cancelled { stage } => {
                write!(f, "upstream stage '{stage}' was cancelled")
            }
        }
    }
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    Failure { kind: FailureKind, message: String },
    Skipped { reason: SkipReason },
    NotExecuted { reason: NotExecutedReason },
}

/// Immutable outcome record of one stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageResult {
    /// Which stage produced this record.
    pub stage: StageName,

    /// Status plus failure/skip detail.
    pub outcome: StageOutcome,

    /// Stage-specific structured output, when the stage produced any.
    pub payload: Option<StagePayload>,

    /// Non-fatal warnings.
    pub warnings: Vec<StageWarning>,

    /// Human-readable one-line summary.
    pub summary: String,

    /// When the record was created.
    pub recorded_at: DateTime<Utc>,

    /// Wall-clock duration of the stage.
    pub duration_ms: u64,
}

impl StageResult {
    fn new(stage: StageName, outcome: StageOutcome, summary: String) -> Self {
        Self {
            stage,
            outcome,
            payload: None,
            warnings: Vec::new(),
            summary,
            recorded_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// A successful stage with its payload.
    pub fn success(payload: StagePayload, summary: impl Into<String>) -> Self {
        let stage = payload.stage();
        Self::new(stage, StageOutcome::Success, summary.into()).with_payload(payload)
    }

    /// A failed stage with a classified kind.
    pub fn failure(stage: StageName, kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let summary = format!("{stage} failed ({kind}): {message}");
        Self::new(stage, StageOutcome::Failure { kind, message }, summary)
    }

    /// A skipped Repair stage. Skipping is only defined for the conditional stage.
    pub fn repair_skipped(reason: SkipReason) -> Self {
        let summary = match reason {
            SkipReason::NoFailingTests => "repair skipped: no failing tests".to_string(),
            SkipReason::RunDidNotComplete => {
                "repair skipped: run did not complete, no failure records".to_string()
            }
        };
        Self::new(StageName::Repair, StageOutcome::Skipped { reason }, summary)
    }

    /// A stage that never ran because of an upstream condition.
    pub fn not_executed(stage: StageName, reason: NotExecutedReason) -> Self {
        let summary = format!("{stage} not executed: {reason}");
        Self::new(stage, StageOutcome::NotExecuted { reason }, summary)
    }

    /// Attach a payload (a failed stage may still carry partial output).
    pub fn with_payload(mut self, payload: StagePayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<StageWarning>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Coarse status of this record.
    pub fn status(&self) -> StageStatus {
        match self.outcome {
            StageOutcome::Success => StageStatus::Success,
            StageOutcome::Failure { .. } => StageStatus::Failure,
            StageOutcome::Skipped { .. } => StageStatus::Skipped,
            StageOutcome::NotExecuted { .. } => StageStatus::NotExecuted,
        }
    }

    /// Classified failure kind, if the stage failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.outcome {
            StageOutcome::Failure { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Whether this stage succeeded.
    pub fn passed(&self) -> bool {
        self.status() == StageStatus::Success
    }

    /// Whether this stage was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.failure_kind() == Some(FailureKind::Cancelled)
    }
}
