//! Overall pipeline status evaluation.

use qa_council_core::{PipelineStatus, StageName, StagePayload, StageResult, StageStatus};
use serde::{Deserialize, Serialize};

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateVerdict {
    /// Derived three-way status.
    pub status: PipelineStatus,

    /// Why the status is not `success` (empty if it is).
    pub reasons: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Derives the overall status from recorded stage results.
pub struct StatusGate;

impl StatusGate {
    /// Evaluate the run.
    ///
    /// Gate rules:
    /// - `failed` if Acquire or Inspect failed, Run did not execute, or any stage was cancelled
    /// - `completed_with_failures` if tests failed or a non-fatal stage failed
    /// - `success` otherwise
    pub fn evaluate(stages: &[StageResult]) -> GateVerdict {
        let mut fatal = Vec::new();
        let mut degraded = Vec::new();

        for result in stages {
            if result.was_cancelled() {
                fatal.push(format!("stage '{}' was cancelled", result.stage));
            } else if let Some(kind) = result.failure_kind() {
                let line = format!("stage '{}' failed ({kind})", result.stage);
                if result.stage.is_fatal() || result.stage == StageName::Run {
                    fatal.push(line);
                } else {
                    degraded.push(line);
                }
            }
        }

        match stages.iter().find(|r| r.stage == StageName::Run) {
            Some(run) if run.status() == StageStatus::Success => {
                if let Some(StagePayload::Run(summary)) = &run.payload {
                    if summary.has_failures() {
                        degraded.push(format!("{} test(s) failed", summary.failed));
                    }
                }
            }
            Some(run) if run.status() == StageStatus::Failure => {}
            _ => fatal.push("run stage did not execute".to_string()),
        }

        let (status, reasons) = if !fatal.is_empty() {
            fatal.extend(degraded);
            (PipelineStatus::Failed, fatal)
        } else if !degraded.is_empty() {
            (PipelineStatus::CompletedWithFailures, degraded)
        } else {
            (PipelineStatus::Success, Vec::new())
        };

        let message = match status {
            PipelineStatus::Success => "All stages passed".to_string(),
            _ => format!("Pipeline {status} with {} reason(s)", reasons.len()),
        };

        GateVerdict {
            status,
            reasons,
            message,
        }
    }
}
