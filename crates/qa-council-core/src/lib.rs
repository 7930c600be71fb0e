//! QA Council Core Library
//!
//! Domain model, workspace management, collaborator contracts and their local
//! implementations, report aggregation and observability for the QA Council
//! pipeline.

pub mod analysis;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod execution;
pub mod fakes;
pub mod generation;
pub mod git;
pub mod obs;
pub mod publish;
pub mod repair;
pub mod report;
pub mod telemetry;
pub mod workspace;

pub use domain::{
    normalize_locator, AcquirePayload, AcquisitionKind, DispatchOutcome, FailureCategory,
    FailureKind, FailureRecord, FileInventory, FixEffort, FixPriority, GeneratePayload,
    InspectPayload, NotExecutedReason, PipelineRun, PipelineRunBuilder, PipelineStatus,
    PublishPayload, QaError, RepairPayload, Result, SkipReason, StageName, StageOutcome,
    StagePayload, StageResult, StageStatus, StageWarning, SuggestedFix, TargetSelector,
    TestRunSummary, WarningKind, Workspace, WorkspaceId,
};

pub use collaborators::{
    Analyzer, Checkout, CiRenderer, CollabResult, CollaboratorError, Collaborators,
    DispatchRequest, Dispatcher, GenerationOutput, TestExecutor, TestGenerator, TriggerConfig,
    VcsCollaborator,
};

pub use analysis::SourceAnalyzer;
pub use config::QaConfig;
pub use execution::{resolve_test_command, CommandTestExecutor, TestRunner};
pub use generation::TemplateGenerator;
pub use git::{capture_head_sha, is_git_repo, parse_github_repo, GitVcs};
pub use publish::{GithubDispatcher, WorkflowRenderer};
pub use repair::{classify_failure, plan_fixes};
pub use report::{aggregate, read_report_artifact, write_report_artifact, Report};
pub use telemetry::init_tracing;
pub use workspace::{Acquired, WorkspaceLease, WorkspaceManager};
