//! Failure classification and advisory fix planning.
//!
//! Repair never touches the workspace. It maps raw failure records onto the
//! fixed [`FailureCategory`] taxonomy and emits one ranked [`SuggestedFix`]
//! per `(category, file)` group.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::domain::{
    FailureCategory, FailureRecord, FixEffort, FixPriority, RepairPayload, SuggestedFix,
    TestRunSummary,
};

/// Classify one failure record. Rules are checked in precedence order.
pub fn classify_failure(record: &FailureRecord) -> FailureCategory {
    let msg = record.message.to_lowercase();
    let path = record.file.as_deref().unwrap_or("").to_lowercase();

    if path.contains("e2e")
        || path.contains("/pages/")
        || msg.contains("locator")
        || msg.contains("selector")
        || msg.contains("no such element")
        || msg.contains("element not found")
    {
        return FailureCategory::StaleLocator;
    }
    if msg.contains("timeout") || msg.contains("timed out") {
        return FailureCategory::Timeout;
    }
    if msg.contains("keyerror")
        || msg.contains("attributeerror")
        || msg.contains("has no attribute")
        || msg.contains("missing")
    {
        return FailureCategory::MissingField;
    }
    if msg.contains("assertionerror") || msg.contains("assert") || msg.contains("expected") {
        return FailureCategory::AssertionMismatch;
    }

    FailureCategory::Unknown
}

/// Priority and effort for a category.
pub fn fix_profile(category: FailureCategory) -> (FixPriority, FixEffort) {
    match category {
        FailureCategory::StaleLocator => (FixPriority::High, FixEffort::Small),
        FailureCategory::MissingField => (FixPriority::High, FixEffort::Medium),
        FailureCategory::AssertionMismatch => (FixPriority::Medium, FixEffort::Small),
        FailureCategory::Timeout => (FixPriority::Medium, FixEffort::Medium),
        FailureCategory::Unknown => (FixPriority::Low, FixEffort::Large),
    }
}

fn suggestion(category: FailureCategory, file: Option<&str>, tests: usize) -> String {
    let location = file.unwrap_or("the failing tests");
    let base = match category {
        FailureCategory::StaleLocator => format!(
            "Update the UI locators in {location}: prefer stable data-testid or role selectors over positional CSS."
        ),
        FailureCategory::MissingField => format!(
            "Check the fields and keys accessed in {location} against the current data model; a field was renamed or removed."
        ),
        FailureCategory::AssertionMismatch => format!(
            "Compare the expected values in {location} with current behaviour and update the assertion or fix the regression."
        ),
        FailureCategory::Timeout => format!(
            "Replace fixed sleeps in {location} with explicit waits and review the timeout budget."
        ),
        FailureCategory::Unknown => format!(
            "Inspect the full traceback for {location}; the failure did not match a known pattern."
        ),
    };
    if tests > 1 {
        format!("{base} ({tests} failing tests)")
    } else {
        base
    }
}

/// Classify every failure in `summary` and plan one fix per classification group.
///
/// A summary with failing tests but no parsed records still yields one
/// `unknown` fix, so failures never produce an empty plan.
pub fn plan_fixes(summary: &TestRunSummary) -> RepairPayload {
    if summary.failures.is_empty() {
        if summary.failed == 0 {
            return RepairPayload::default();
        }
        let (priority, effort) = fix_profile(FailureCategory::Unknown);
        return RepairPayload {
            fixes: vec![SuggestedFix {
                category: FailureCategory::Unknown,
                priority,
                effort,
                suggestion: format!(
                    "{} test(s) failed without parseable failure records; re-run with verbose output and inspect the log.",
                    summary.failed
                ),
                target_file: None,
                tests: Vec::new(),
            }],
            failures_classified: 0,
        };
    }

    let mut groups: BTreeMap<(FailureCategory, Option<String>), Vec<String>> = BTreeMap::new();
    for record in &summary.failures {
        groups
            .entry((classify_failure(record), record.file.clone()))
            .or_default()
            .push(record.name.clone());
    }

    let mut fixes: Vec<SuggestedFix> = groups
        .into_iter()
        .map(|((category, file), tests)| {
            let (priority, effort) = fix_profile(category);
            SuggestedFix {
                category,
                priority,
                effort,
                suggestion: suggestion(category, file.as_deref(), tests.len()),
                target_file: file,
                tests,
            }
        })
        .collect();

    fixes.sort_by(|a, b| {
        (Reverse(a.priority), Reverse(a.tests.len()), &a.target_file).cmp(&(
            Reverse(b.priority),
            Reverse(b.tests.len()),
            &b.target_file,
        ))
    });

    RepairPayload {
        fixes,
        failures_classified: summary.failures.len(),
    }
}

/// Number of fixes at each priority.
pub fn count_by_priority(fixes: &[SuggestedFix]) -> BTreeMap<FixPriority, usize> {
    let mut counts = BTreeMap::new();
    for fix in fixes {
        *counts.entry(fix.priority).or_insert(0) += 1;
    }
    counts
}
