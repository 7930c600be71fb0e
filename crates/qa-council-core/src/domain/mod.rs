//! Domain models for QA Council.
//!
//! Canonical definitions for the core entities:
//! - `Workspace`: materialised checkout keyed by `(locator, branch)`
//! - `StageResult`: immutable outcome of one stage invocation
//! - `StagePayload`: stage-specific structured output
//! - `PipelineRun`: ordered history of one pipeline invocation

pub mod error;
pub mod payload;
pub mod run;
pub mod stage;
pub mod workspace;

// Re-export main types and errors
pub use error::{AcquisitionKind, QaError, Result};
pub use payload::{
    AcquirePayload, DispatchOutcome, FailureCategory, FailureRecord, FileInventory, FixEffort,
    FixPriority, GeneratePayload, InspectPayload, PublishPayload, RepairPayload, StagePayload,
    SuggestedFix, TargetSelector, TestRunSummary,
};
pub use run::{PipelineRun, PipelineRunBuilder, PipelineStatus};
pub use stage::{
    FailureKind, NotExecutedReason, SkipReason, StageName, StageOutcome, StageResult,
    StageStatus, StageWarning, WarningKind,
};
pub use workspace::{normalize_locator, Workspace, WorkspaceId};
