//! Stage-specific payloads, one fixed schema per stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::stage::StageName;
use crate::domain::workspace::WorkspaceId;

// ---------------------------------------------------------------------------
// Acquire
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquirePayload {
    pub workspace_id: WorkspaceId,
    pub root: PathBuf,
    pub revision: String,
    /// `true` when an existing checkout was updated in place.
    pub refreshed: bool,
}

// ---------------------------------------------------------------------------
// Inspect
// ---------------------------------------------------------------------------

/// Testable units discovered in one source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileInventory {
    /// Path relative to the workspace root.
    pub file: PathBuf,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    /// Decision-point count; the analyzer defines the scale.
    pub complexity: u32,
}

impl FileInventory {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            functions: Vec::new(),
            classes: Vec::new(),
            complexity: 0,
        }
    }

    /// File stem, e.g. `service` for `app/service.py`.
    pub fn module(&self) -> String {
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Functions not marked private by a leading underscore.
    pub fn public_functions(&self) -> impl Iterator<Item = &String> {
        self.functions.iter().filter(|f| !f.starts_with('_'))
    }

    pub fn public_classes(&self) -> impl Iterator<Item = &String> {
        self.classes.iter().filter(|c| !c.starts_with('_'))
    }

    pub fn has_public_units(&self) -> bool {
        self.public_functions().next().is_some() || self.public_classes().next().is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InspectPayload {
    pub file_pattern: String,
    pub files: Vec<FileInventory>,
}

impl InspectPayload {
    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_functions(&self) -> usize {
        self.files.iter().map(|f| f.functions.len()).sum()
    }

    pub fn total_classes(&self) -> usize {
        self.files.iter().map(|f| f.classes.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

/// Which source files Generate should cover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "path", rename_all = "snake_case")]
pub enum TargetSelector {
    /// Every testable file in the inventory.
    All,
    /// One file, relative to the workspace root.
    File(PathBuf),
}

impl TargetSelector {
    pub fn matches(&self, file: &Path) -> bool {
        match self {
            TargetSelector::All => true,
            TargetSelector::File(target) => file == target || file.ends_with(target),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratePayload {
    /// Test files written, relative to the workspace root.
    pub written: Vec<PathBuf>,
    /// Existing human-authored files left untouched.
    pub preserved: Vec<PathBuf>,
    /// Individual test cases emitted across all written files.
    pub test_cases: usize,
    /// Source files selected for generation.
    pub targets: usize,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One failing test as reported by the runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl FailureRecord {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    /// `file:line`, `file`, or `<unknown>`.
    pub fn location(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.clone(),
            _ => "<unknown>".to_string(),
        }
    }
}

/// Counts, coverage and failure records from one test execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestRunSummary {
    pub runner: String,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Coverage percentage per tracked module.
    pub coverage_by_module: BTreeMap<String, f64>,
    /// Overall coverage as reported by the runner, if any.
    pub total_coverage: Option<f64>,
    pub failures: Vec<FailureRecord>,
}

impl TestRunSummary {
    pub fn total(&self) -> u32 {
        self.passed + self.failed + self.skipped
    }

    /// Whether at least one test failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || !self.failures.is_empty()
    }

    /// Reported total, or the mean across modules when only a per-module table exists.
    pub fn coverage_percent(&self) -> Option<f64> {
        if let Some(total) = self.total_coverage {
            return Some(total);
        }
        if self.coverage_by_module.is_empty() {
            return None;
        }
        let sum: f64 = self.coverage_by_module.values().sum();
        Some(sum / self.coverage_by_module.len() as f64)
    }
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

/// Fixed failure taxonomy used by the repair classifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    AssertionMismatch,
    MissingField,
    StaleLocator,
    Timeout,
    Unknown,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureCategory::AssertionMismatch => "assertion_mismatch",
            FailureCategory::MissingField => "missing_field",
            FailureCategory::StaleLocator => "stale_locator",
            FailureCategory::Timeout => "timeout",
            FailureCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FixPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FixEffort {
    Small,
    Medium,
    Large,
}

/// Advisory fix for one failure classification group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuggestedFix {
    pub category: FailureCategory,
    pub priority: FixPriority,
    pub effort: FixEffort,
    pub suggestion: String,
    pub target_file: Option<String>,
    /// Failing tests covered by this fix.
    pub tests: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepairPayload {
    /// Ranked, one per classification group.
    pub fixes: Vec<SuggestedFix>,
    pub failures_classified: usize,
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

/// What happened to the optional workflow dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Disabled,
    Accepted,
    MissingCredential,
    Unauthorized { message: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishPayload {
    pub config_path: PathBuf,
    pub dispatch: DispatchOutcome,
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

/// Structured stage output keyed by stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StagePayload {
    Acquire(AcquirePayload),
    Inspect(InspectPayload),
    Generate(GeneratePayload),
    Run(TestRunSummary),
    Repair(RepairPayload),
    Publish(PublishPayload),
}

impl StagePayload {
    pub fn stage(&self) -> StageName {
        match self {
            StagePayload::Acquire(_) => StageName::Acquire,
            StagePayload::Inspect(_) => StageName::Inspect,
            StagePayload::Generate(_) => StageName::Generate,
            StagePayload::Run(_) => StageName::Run,
            StagePayload::Repair(_) => StageName::Repair,
            StagePayload::Publish(_) => StageName::Publish,
        }
    }
}
