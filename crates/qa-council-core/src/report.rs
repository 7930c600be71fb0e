//! Report Aggregator.
//!
//! Folds a finished [`PipelineRun`] into one ordered [`Report`]:
//! - one entry per stage, in stage order, including skipped and not-executed stages
//! - test roll-up (counts and coverage)
//! - suggested fixes with counts by priority
//! - generated files, workflow path, dispatch outcome and every warning
//!
//! Persisted as `report.json` plus a `report.digest` integrity file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::{
    DispatchOutcome, FixPriority, PipelineRun, PipelineStatus, QaError, Result, StageName,
    StageOutcome, StagePayload, StageStatus, SuggestedFix, TestRunSummary, WarningKind,
    WorkspaceId,
};
use crate::repair::count_by_priority;

const REPORT_FILE: &str = "report.json";
const DIGEST_FILE: &str = "report.digest";

// ── report schema ─────────────────────────────────────────────────────────

/// One row of the per-stage summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageReportEntry {
    pub stage: StageName,
    pub status: StageStatus,
    pub outcome: StageOutcome,
    pub summary: String,
    pub duration_ms: u64,
    pub warnings: usize,
}

/// Test counts and coverage from the Run stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestRollup {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub coverage_percent: Option<f64>,
    pub coverage_by_module: BTreeMap<String, f64>,
}

impl From<&TestRunSummary> for TestRollup {
    fn from(summary: &TestRunSummary) -> Self {
        Self {
            total: summary.total(),
            passed: summary.passed,
            failed: summary.failed,
            skipped: summary.skipped,
            coverage_percent: summary.coverage_percent(),
            coverage_by_module: summary.coverage_by_module.clone(),
        }
    }
}

/// A warning, tagged with the stage that raised it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportWarning {
    pub stage: StageName,
    pub kind: WarningKind,
    pub message: String,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub run_id: Uuid,
    pub workspace_id: WorkspaceId,
    pub locator: String,
    pub branch: String,
    pub status: PipelineStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stages: Vec<StageReportEntry>,
    /// `None` when the Run stage produced no summary.
    pub tests: Option<TestRollup>,
    pub fixes: Vec<SuggestedFix>,
    pub fixes_by_priority: BTreeMap<FixPriority, usize>,
    pub generated_files: Vec<PathBuf>,
    pub preserved_files: Vec<PathBuf>,
    pub workflow_path: Option<PathBuf>,
    pub dispatch: Option<DispatchOutcome>,
    pub warnings: Vec<ReportWarning>,
}

/// Build the report for a finished run.
pub fn aggregate(run: &PipelineRun) -> Report {
    let mut report = Report {
        run_id: run.run_id(),
        workspace_id: run.workspace_id().clone(),
        locator: run.locator().to_string(),
        branch: run.branch().to_string(),
        status: run.status(),
        started_at: run.started_at(),
        finished_at: run.finished_at(),
        duration_ms: run.duration_ms(),
        stages: Vec::with_capacity(run.stages().len()),
        tests: None,
        fixes: Vec::new(),
        fixes_by_priority: BTreeMap::new(),
        generated_files: Vec::new(),
        preserved_files: Vec::new(),
        workflow_path: None,
        dispatch: None,
        warnings: Vec::new(),
    };

    for result in run.stages() {
        report.stages.push(StageReportEntry {
            stage: result.stage,
            status: result.status(),
            outcome: result.outcome.clone(),
            summary: result.summary.clone(),
            duration_ms: result.duration_ms,
            warnings: result.warnings.len(),
        });
        report
            .warnings
            .extend(result.warnings.iter().map(|w| ReportWarning {
                stage: result.stage,
                kind: w.kind,
                message: w.message.clone(),
                path: w.path.clone(),
            }));

        match &result.payload {
            Some(StagePayload::Generate(generated)) => {
                report.generated_files = generated.written.clone();
                report.preserved_files = generated.preserved.clone();
            }
            Some(StagePayload::Run(summary)) => {
                report.tests = Some(TestRollup::from(summary));
            }
            Some(StagePayload::Repair(repair)) => {
                report.fixes = repair.fixes.clone();
                report.fixes_by_priority = count_by_priority(&repair.fixes);
            }
            Some(StagePayload::Publish(publish)) => {
                report.workflow_path = Some(publish.config_path.clone());
                report.dispatch = Some(publish.dispatch.clone());
            }
            Some(StagePayload::Acquire(_)) | Some(StagePayload::Inspect(_)) | None => {}
        }
    }

    report
}

impl Report {
    pub fn stage(&self, name: StageName) -> Option<&StageReportEntry> {
        self.stages.iter().find(|e| e.stage == name)
    }

    /// Render the report as a Markdown string.
    pub fn render_markdown(&self) -> String {
        let mut md = format!("# QA Report: {} ({})\n\n", self.locator, self.branch);
        md.push_str(&format!("- Run: `{}`\n", self.run_id));
        md.push_str(&format!("- Workspace: `{}`\n", self.workspace_id.short()));
        md.push_str(&format!("- Status: **{}**\n", self.status));
        md.push_str(&format!("- Duration: {} ms\n", self.duration_ms));

        md.push_str("\n## Stages\n\n| Stage | Status | Summary |\n|---|---|---|\n");
        for entry in &self.stages {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                entry.stage,
                entry.status,
                entry.summary.replace('|', "\\|")
            ));
        }

        md.push_str("\n## Tests\n\n");
        match &self.tests {
            Some(tests) => {
                md.push_str(&format!(
                    "{} total: {} passed, {} failed, {} skipped\n",
                    tests.total, tests.passed, tests.failed, tests.skipped
                ));
                match tests.coverage_percent {
                    Some(pct) => md.push_str(&format!("\nCoverage: {pct:.1}%\n")),
                    None => md.push_str("\nCoverage: n/a\n"),
                }
                for (module, pct) in &tests.coverage_by_module {
                    md.push_str(&format!("- `{module}`: {pct:.1}%\n"));
                }
            }
            None => md.push_str("not run\n"),
        }

        md.push_str("\n## Suggested Fixes\n\n");
        if self.fixes.is_empty() {
            md.push_str("none\n");
        }
        for (i, fix) in self.fixes.iter().enumerate() {
            md.push_str(&format!(
                "{}. [{:?}/{:?}] **{}** {}: {}\n",
                i + 1,
                fix.priority,
                fix.effort,
                fix.category,
                fix.target_file.as_deref().unwrap_or("-"),
                fix.suggestion
            ));
        }

        if !self.generated_files.is_empty() || self.workflow_path.is_some() {
            md.push_str("\n## Artifacts\n\n");
            for path in &self.generated_files {
                md.push_str(&format!("- `{}`\n", path.display()));
            }
            if let Some(path) = &self.workflow_path {
                md.push_str(&format!("- `{}` (workflow)\n", path.display()));
            }
        }

        if !self.warnings.is_empty() {
            md.push_str("\n## Warnings\n\n");
            for warning in &self.warnings {
                md.push_str(&format!("- {}: {}", warning.stage, warning.message));
                if let Some(path) = &warning.path {
                    md.push_str(&format!(" (`{}`)", path.display()));
                }
                md.push('\n');
            }
        }

        md
    }

    /// Short plain-text summary for terminals.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "QA run {} on {}@{}: {}\n",
            self.run_id, self.locator, self.branch, self.status
        );
        for entry in &self.stages {
            out.push_str(&format!(
                "  {:<9} {:<13} {}\n",
                entry.stage.name(),
                entry.status.to_string(),
                entry.summary
            ));
        }
        if let Some(tests) = &self.tests {
            out.push_str(&format!(
                "  tests: {} passed, {} failed, {} skipped",
                tests.passed, tests.failed, tests.skipped
            ));
            if let Some(pct) = tests.coverage_percent {
                out.push_str(&format!(", coverage {pct:.1}%"));
            }
            out.push('\n');
        }
        if !self.fixes.is_empty() {
            out.push_str(&format!("  suggested fixes: {}\n", self.fixes.len()));
        }
        for warning in &self.warnings {
            out.push_str(&format!("  warning [{}]: {}\n", warning.stage, warning.message));
        }
        out
    }
}

// ── persistence ───────────────────────────────────────────────────────────

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `<dir>/<run_id>/report.json` and `<dir>/<run_id>/report.digest`.
pub fn write_report_artifact(report: &Report, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(report.run_id.to_string());
    std::fs::create_dir_all(&run_dir)?;

    let artifact_path = run_dir.join(REPORT_FILE);
    let digest_path = run_dir.join(DIGEST_FILE);
    let json = serde_json::to_vec_pretty(report)?;

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(&digest_path, sha256_hex(&json).as_bytes())?;

    Ok(artifact_path)
}

/// Read and verify `<dir>/<run_id>/report.json` integrity.
pub fn read_report_artifact(run_id: &str, dir: &Path) -> Result<Report> {
    let run_dir = dir.join(run_id);
    let json = std::fs::read(run_dir.join(REPORT_FILE))?;
    let digest = std::fs::read_to_string(run_dir.join(DIGEST_FILE))?;

    let actual = sha256_hex(&json);
    if digest.trim() != actual {
        return Err(QaError::DigestMismatch {
            expected: digest.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
