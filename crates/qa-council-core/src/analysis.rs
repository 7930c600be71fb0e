//! Static-analysis collaborator and test-target selection.
//!
//! The analyzer is deliberately shallow: line-oriented heuristics over Python
//! sources, enough to inventory top-level functions and classes and to give
//! each file a decision-point complexity score.

use async_trait::async_trait;
use regex::Regex;
use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::collaborators::{Analyzer, CollabResult, CollaboratorError};
use crate::domain::FileInventory;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    "venv",
    "env",
    "virtualenv",
    "site-packages",
];

/// Module names that are bootstrap or glue code, not test targets.
const EXCLUDED_MODULES: &[&str] = &[
    "__init__",
    "__main__",
    "conftest",
    "setup",
    "manage",
    "wsgi",
    "asgi",
    "alembic",
    "migration",
    "version",
    "celeryconfig",
];

const EXCLUDED_PREFIXES: &[&str] = &["test_", "tests_"];

/// Directory names whose contents are never selected.
const EXCLUDED_DIRS: &[&str] = &["migrations", "alembic", "versions", "tests", "test"];

fn function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")
            .expect("regex for function definitions")
    })
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^class\s+([A-Za-z_][A-Za-z0-9_]*)\s*[(:]")
            .expect("regex for class definitions")
    })
}

fn decision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:if|elif|for|async\s+for|while|except|case)\b|\b(?:and|or)\b")
            .expect("regex for decision points")
    })
}

/// Inventory one source file's content.
pub fn analyze_source(file: impl Into<PathBuf>, content: &str) -> FileInventory {
    let mut inventory = FileInventory::new(file);
    let mut in_docstring = false;

    for line in content.lines() {
        let trimmed = line.trim_start();
        // Triple-quoted blocks toggle on an odd count of delimiters.
        let quotes = trimmed.matches("\"\"\"").count() + trimmed.matches("'''").count();
        if in_docstring {
            if quotes % 2 == 1 {
                in_docstring = false;
            }
            continue;
        }
        if quotes % 2 == 1 {
            in_docstring = true;
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }

        if let Some(caps) = function_re().captures(line) {
            inventory.functions.push(caps[1].to_string());
        } else if let Some(caps) = class_re().captures(line) {
            inventory.classes.push(caps[1].to_string());
        }
        inventory.complexity += decision_re().find_iter(line).count() as u32;
    }

    inventory
}

/// Whether `name` matches `pattern` (`*`, `*.ext`, or an exact file name).
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern == "*" {
        return true;
    }
    match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => name == pattern,
    }
}

pub(crate) fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

fn walk(root: &Path, dir: &Path, pattern: &str, out: &mut Vec<FileInventory>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if skip_dir(&name) || path.join("pyvenv.cfg").exists() {
                continue;
            }
            walk(root, &path, pattern, out);
        } else if file_type.is_file() && matches_pattern(&name, pattern) {
            let Ok(content) = std::fs::read_to_string(&path) else {
                debug!(file = %path.display(), "skipping non-UTF-8 file");
                continue;
            };
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            out.push(analyze_source(relative, &content));
        }
    }
}

/// Walk `root` and inventory every file matching `pattern`, sorted by path.
pub fn inspect_tree(root: &Path, pattern: &str) -> CollabResult<Vec<FileInventory>> {
    if !root.is_dir() {
        return Err(CollaboratorError::Unreadable(format!(
            "{} is not a readable directory",
            root.display()
        )));
    }
    std::fs::read_dir(root)
        .map_err(|e| CollaboratorError::Unreadable(format!("{}: {e}", root.display())))?;

    let mut files = Vec::new();
    walk(root, root, pattern, &mut files);
    files.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(files)
}

/// Analyzer collaborator backed by [`inspect_tree`].
#[derive(Debug, Clone, Default)]
pub struct SourceAnalyzer;

impl SourceAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for SourceAnalyzer {
    async fn inspect(&self, root: &Path, file_pattern: &str) -> CollabResult<Vec<FileInventory>> {
        let root = root.to_path_buf();
        let pattern = file_pattern.to_string();
        let files = tokio::task::spawn_blocking(move || inspect_tree(&root, &pattern))
            .await
            .map_err(|e| CollaboratorError::Crashed(format!("analysis task failed: {e}")))??;
        info!(files = files.len(), pattern = file_pattern, "inspection complete");
        Ok(files)
    }
}

/// Testability score: `2 * functions + 3 * classes + complexity`, public units only.
pub fn testability_score(inventory: &FileInventory) -> u32 {
    let functions = inventory.public_functions().count() as u32;
    let classes = inventory.public_classes().count() as u32;
    2 * functions + 3 * classes + inventory.complexity
}

/// Whether a file is a candidate for generated tests at all.
pub fn is_testable(inventory: &FileInventory) -> bool {
    let module = inventory.module().to_lowercase();
    if EXCLUDED_MODULES.contains(&module.as_str()) {
        return false;
    }
    if EXCLUDED_PREFIXES.iter().any(|p| module.starts_with(p)) {
        return false;
    }
    let in_excluded_dir = inventory
        .file
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|s| EXCLUDED_DIRS.contains(&s))
        });
    !in_excluded_dir && inventory.has_public_units()
}

/// Rank testable files by score (descending, then path), keeping at most `max`.
pub fn select_test_targets(inventory: &[FileInventory], max: Option<usize>) -> Vec<&FileInventory> {
    let mut scored: Vec<(u32, &FileInventory)> = inventory
        .iter()
        .filter(|inv| is_testable(inv))
        .map(|inv| (testability_score(inv), inv))
        .collect();
    scored.sort_by(|a, b| (Reverse(a.0), &a.1.file).cmp(&(Reverse(b.0), &b.1.file)));
    scored
        .into_iter()
        .take(max.unwrap_or(usize::MAX))
        .map(|(_, inv)| inv)
        .collect()
}
