//! State-machine transition rules.
//!
//! ```text
//! Acquire -> Inspect -> Generate -> Run -> (failures? Repair : skip) -> Publish
//! ```
//!
//! A fatal failure (Acquire, Inspect) or any cancellation halts the run; every
//! later stage is then recorded as not executed with the halting reason.

use qa_council_core::{
    NotExecutedReason, SkipReason, StageName, StagePayload, StageResult, StageStatus,
};

/// What happens after a stage is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Continue,
    Halt(NotExecutedReason),
}

/// Whether the conditional Repair stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairDecision {
    Execute,
    Skip(SkipReason),
}

/// Decide whether the run continues past `result`.
pub fn after(result: &StageResult) -> Transition {
    let stage = result.stage;
    if result.was_cancelled() {
        return Transition::Halt(NotExecutedReason::Cancelled { stage });
    }
    if stage.is_fatal() && result.status() == StageStatus::Failure {
        return Transition::Halt(NotExecutedReason::UpstreamFailure { stage });
    }
    Transition::Continue
}

/// Repair executes iff Run executed and reported at least one failing test.
pub fn repair_guard(run: Option<&StageResult>) -> RepairDecision {
    match run {
        Some(result) if result.stage == StageName::Run && result.passed() => match &result.payload {
            Some(StagePayload::Run(summary)) if summary.has_failures() => RepairDecision::Execute,
            Some(StagePayload::Run(_)) => RepairDecision::Skip(SkipReason::NoFailingTests),
            _ => RepairDecision::Skip(SkipReason::RunDidNotComplete),
        },
        _ => RepairDecision::Skip(SkipReason::RunDidNotComplete),
    }
}
