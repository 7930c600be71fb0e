//! External collaborator contracts.
//!
//! The pipeline never clones, parses, runs tests or talks to GitHub itself. It
//! delegates to the traits below:
//! - `VcsCollaborator`: clone or update a checkout
//! - `Analyzer`: inventory testable units per file
//! - `TestGenerator`: emit test artifacts under the conventional layout
//! - `TestExecutor`: run tests, collect counts, coverage and failure records
//! - `CiRenderer` / `Dispatcher`: render the workflow file and trigger it
//!
//! Local implementations live in `git`, `analysis`, `generation`, `execution`
//! and `publish`; in-memory fakes live in `fakes`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::SourceAnalyzer;
use crate::config::QaConfig;
use crate::domain::{FileInventory, TargetSelector, TestRunSummary};
use crate::execution::CommandTestExecutor;
use crate::generation::TemplateGenerator;
use crate::git::GitVcs;
use crate::publish::{GithubDispatcher, WorkflowRenderer};

/// Errors returned by collaborators, already coarsely classified.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage not writable: {0}")]
    StorageUnwritable(String),

    #[error("input unreadable: {0}")]
    Unreadable(String),

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("collaborator crashed: {0}")]
    Crashed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collaborator calls.
pub type CollabResult<T> = std::result::Result<T, CollaboratorError>;

// ---------------------------------------------------------------------------
// VCS
// ---------------------------------------------------------------------------

/// A checkout produced by the VCS collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub path: PathBuf,
    pub revision: String,
    /// `true` when an existing checkout was updated in place.
    pub refreshed: bool,
}

#[async_trait]
pub trait VcsCollaborator: Send + Sync {
    /// Clone `locator` at `branch` into `dest`, or update `dest` in place if it exists.
    async fn clone_or_update(&self, locator: &str, branch: &str, dest: &Path)
        -> CollabResult<Checkout>;
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Inventory files under `root` matching `file_pattern`. Empty input is not an error.
    async fn inspect(&self, root: &Path, file_pattern: &str) -> CollabResult<Vec<FileInventory>>;
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Files touched by one generation pass, relative to the workspace root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutput {
    pub written: Vec<PathBuf>,
    /// Human-authored files at generated paths, left untouched.
    pub conflicts: Vec<PathBuf>,
    pub test_cases: usize,
    pub targets: usize,
    /// Artifacts that could not be written. The pass continues past them.
    pub errors: Vec<String>,
}

impl GenerationOutput {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

#[async_trait]
pub trait TestGenerator: Send + Sync {
    /// Emit test artifacts for the selected inventory entries. Never overwrites
    /// a human-authored file. Per-file write failures land in
    /// [`GenerationOutput::errors`]; `Err` is reserved for failures before any write.
    async fn generate(
        &self,
        root: &Path,
        inventory: &[FileInventory],
        selector: &TargetSelector,
    ) -> CollabResult<GenerationOutput>;
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TestExecutor: Send + Sync {
    /// Run the suite (or `selector`) under `root`. A crash or timeout is an error,
    /// never an empty summary.
    async fn run(
        &self,
        root: &Path,
        selector: Option<&str>,
        timeout: Duration,
    ) -> CollabResult<TestRunSummary>;
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

/// When the rendered workflow triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub branches: Vec<String>,
    pub manual_dispatch: bool,
}

impl TriggerConfig {
    pub fn new(branches: Vec<String>) -> Self {
        Self {
            branches,
            manual_dispatch: true,
        }
    }

    /// Ensure `branch` is among the trigger branches.
    pub fn including(mut self, branch: &str) -> Self {
        if !branch.is_empty() && !self.branches.iter().any(|b| b == branch) {
            self.branches.push(branch.to_string());
        }
        self
    }
}

#[async_trait]
pub trait CiRenderer: Send + Sync {
    /// Render the workflow under `root`, returning the written path.
    async fn render(
        &self,
        root: &Path,
        test_command: &str,
        trigger: &TriggerConfig,
    ) -> CollabResult<PathBuf>;
}

/// Target of a workflow dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Trigger the rendered workflow. Not retried.
    async fn dispatch(&self, request: &DispatchRequest, credential: &str) -> CollabResult<()>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The full set of collaborators a pipeline needs.
#[derive(Clone)]
pub struct Collaborators {
    pub vcs: Arc<dyn VcsCollaborator>,
    pub analyzer: Arc<dyn Analyzer>,
    pub generator: Arc<dyn TestGenerator>,
    pub executor: Arc<dyn TestExecutor>,
    pub renderer: Arc<dyn CiRenderer>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl Collaborators {
    /// Local implementations: git CLI, source heuristics, template generator,
    /// test command runner, workflow renderer and the GitHub REST dispatcher.
    pub fn local(config: &QaConfig) -> Self {
        Self {
            vcs: Arc::new(GitVcs::new(config.github_token.clone())),
            analyzer: Arc::new(SourceAnalyzer::new()),
            generator: Arc::new(
                TemplateGenerator::new()
                    .with_max_targets(config.max_targets)
                    .with_e2e_base_url(config.e2e_base_url.clone()),
            ),
            executor: Arc::new(CommandTestExecutor::new(&config.test_command)),
            renderer: Arc::new(WorkflowRenderer::new()),
            dispatcher: Arc::new(GithubDispatcher::new(
                &config.github_api_url,
                Duration::from_secs(config.dispatch_timeout_secs),
            )),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
