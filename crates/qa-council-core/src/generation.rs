//! Template-based test generation collaborator.
//!
//! Generated files live under `tests/unit/` and `tests/e2e/` and start with
//! [`GENERATED_MARKER`]. A file at a generated path without the marker is
//! human-authored and is never overwritten.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::analysis::select_test_targets;
use crate::collaborators::{CollabResult, CollaboratorError, GenerationOutput, TestGenerator};
use crate::domain::{FileInventory, TargetSelector};

/// First line of every generated file.
pub const GENERATED_MARKER: &str = "# @generated by qa-council: delete this line to take ownership";

pub const UNIT_DIR: &str = "tests/unit";
pub const E2E_DIR: &str = "tests/e2e";
pub const E2E_SMOKE_FILE: &str = "test_smoke_e2e.py";

/// Relative path of the unit test file generated for `source`.
///
/// `app/models/user.py` maps to `tests/unit/test_app_models_user.py`.
pub fn unit_test_path(source: &Path) -> PathBuf {
    let stem = source.with_extension("");
    let flat: Vec<String> = stem
        .components()
        .map(|c| c.as_os_str().to_string_lossy().replace(['-', '.', ' '], "_"))
        .filter(|s| !s.is_empty())
        .collect();
    PathBuf::from(UNIT_DIR).join(format!("test_{}.py", flat.join("_")))
}

/// Dotted import path, e.g. `app.models.user`.
fn module_import(source: &Path) -> String {
    source
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a unit test module; returns the content and the number of test cases.
pub fn render_unit_tests(target: &FileInventory) -> (String, usize) {
    let functions: Vec<&String> = target.public_functions().collect();
    let classes: Vec<&String> = target.public_classes().collect();
    let module = module_import(&target.file);

    let mut out = String::new();
    out.push_str(GENERATED_MARKER);
    out.push('\n');
    out.push_str(&format!(
        "\"\"\"Smoke tests for `{}`.\"\"\"\n\nimport inspect\n\nimport {module} as module_under_test\n",
        target.file.display()
    ));

    for name in &functions {
        out.push_str(&format!(
            "\n\ndef test_{name}_is_exposed():\n    \
             target = getattr(module_under_test, \"{name}\", None)\n    \
             assert callable(target)\n"
        ));
    }
    for name in &classes {
        out.push_str(&format!(
            "\n\ndef test_{name}_is_a_class():\n    \
             target = getattr(module_under_test, \"{name}\", None)\n    \
             assert inspect.isclass(target)\n"
        ));
    }

    (out, functions.len() + classes.len())
}

/// Render the end-to-end smoke test against `base_url`.
pub fn render_e2e_smoke(base_url: &str) -> String {
    format!(
        "{GENERATED_MARKER}\n\
         \"\"\"End-to-end smoke test.\"\"\"\n\n\
         import pytest\n\n\
         BASE_URL = \"{base_url}\"\n\n\n\
         @pytest.mark.e2e\n\
         def test_home_page_loads(page):\n    \
         response = page.goto(BASE_URL)\n    \
         assert response is not None and response.ok\n"
    )
}

enum WriteOutcome {
    Written,
    Conflict,
}

async fn write_artifact(root: &Path, relative: &Path, content: &str) -> CollabResult<WriteOutcome> {
    let path = root.join(relative);
    if path.exists() {
        let owned = tokio::fs::read_to_string(&path)
            .await
            .map(|existing| existing.lines().next() == Some(GENERATED_MARKER))
            .unwrap_or(false);
        if !owned {
            warn!(path = %relative.display(), "human-authored test file preserved");
            return Ok(WriteOutcome::Conflict);
        }
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            CollaboratorError::StorageUnwritable(format!("{}: {e}", parent.display()))
        })?;
    }
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| CollaboratorError::StorageUnwritable(format!("{}: {e}", path.display())))?;
    debug!(path = %relative.display(), "test artifact written");
    Ok(WriteOutcome::Written)
}

/// Reserve `path` for this pass, suffixing `_2`, `_3`, ... when two sources
/// flatten to the same test file.
fn claim_path(claimed: &mut HashSet<PathBuf>, path: PathBuf) -> PathBuf {
    if claimed.insert(path.clone()) {
        return path;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut n = 2;
    loop {
        let candidate = path.with_file_name(format!("{stem}_{n}.py"));
        if claimed.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Write one artifact and fold the outcome into `output`. A failed write is
/// recorded and the pass continues.
async fn record_write(
    output: &mut GenerationOutput,
    root: &Path,
    relative: PathBuf,
    content: &str,
    cases: usize,
) {
    match write_artifact(root, &relative, content).await {
        Ok(WriteOutcome::Written) => {
            output.written.push(relative);
            output.test_cases += cases;
        }
        Ok(WriteOutcome::Conflict) => output.conflicts.push(relative),
        Err(e) => {
            warn!(path = %relative.display(), error = %e, "test artifact not written");
            output.errors.push(e.to_string());
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemplateGenerator {
    max_targets: Option<usize>,
    e2e_base_url: Option<String>,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_targets(mut self, max_targets: Option<usize>) -> Self {
        self.max_targets = max_targets;
        self
    }

    pub fn with_e2e_base_url(mut self, base_url: Option<String>) -> Self {
        self.e2e_base_url = base_url;
        self
    }
}

#[async_trait]
impl TestGenerator for TemplateGenerator {
    async fn generate(
        &self,
        root: &Path,
        inventory: &[FileInventory],
        selector: &TargetSelector,
    ) -> CollabResult<GenerationOutput> {
        let targets: Vec<&FileInventory> = match selector {
            TargetSelector::All => select_test_targets(inventory, self.max_targets),
            TargetSelector::File(file) => {
                let matched: Vec<&FileInventory> =
                    inventory.iter().filter(|inv| selector.matches(&inv.file)).collect();
                if matched.is_empty() {
                    return Err(CollaboratorError::NotFound(format!(
                        "target file {} is not in the inventory",
                        file.display()
                    )));
                }
                matched.into_iter().filter(|inv| inv.has_public_units()).collect()
            }
        };

        let mut output = GenerationOutput {
            targets: targets.len(),
            ..GenerationOutput::default()
        };
        let mut claimed = HashSet::new();

        for target in targets {
            let relative = claim_path(&mut claimed, unit_test_path(&target.file));
            let (content, cases) = render_unit_tests(target);
            record_write(&mut output, root, relative, &content, cases).await;
        }

        if let Some(base_url) = &self.e2e_base_url {
            let relative = PathBuf::from(E2E_DIR).join(E2E_SMOKE_FILE);
            record_write(&mut output, root, relative, &render_e2e_smoke(base_url), 1).await;
        }

        info!(
            written = output.written.len(),
            conflicts = output.conflicts.len(),
            errors = output.errors.len(),
            test_cases = output.test_cases,
            "generation complete"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Vec<FileInventory> {
        vec![
            FileInventory {
                file: PathBuf::from("app/models.py"),
                functions: vec!["load".into(), "_cache".into()],
                classes: vec!["User".into()],
                complexity: 2,
            },
            FileInventory {
                file: PathBuf::from("app/util.py"),
                functions: vec!["slugify".into()],
                classes: vec![],
                complexity: 0,
            },
        ]
    }

    #[test]
    fn unit_test_path_flattens_module() {
        assert_eq!(
            unit_test_path(Path::new("app/models/user.py")),
            PathBuf::from("tests/unit/test_app_models_user.py")
        );
        assert_eq!(
            unit_test_path(Path::new("my-lib.py")),
            PathBuf::from("tests/unit/test_my_lib.py")
        );
    }

    #[test]
    fn render_unit_tests_counts_public_units() {
        let (content, cases) = render_unit_tests(&inventory()[0]);
        assert_eq!(cases, 2);
        assert!(content.starts_with(GENERATED_MARKER));
        assert!(content.contains("import app.models as module_under_test"));
        assert!(content.contains("def test_load_is_exposed"));
        assert!(content.contains("def test_User_is_a_class"));
        assert!(!content.contains("_cache_is_exposed"));
    }

    #[tokio::test]
    async fn generate_all_writes_unit_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = TemplateGenerator::new()
            .generate(dir.path(), &inventory(), &TargetSelector::All)
            .await
            .unwrap();
        assert_eq!(out.targets, 2);
        assert_eq!(out.test_cases, 3);
        assert!(out.conflicts.is_empty());
        for path in &out.written {
            assert!(path.starts_with(UNIT_DIR));
            assert!(dir.path().join(path).is_file());
        }
    }

    #[tokio::test]
    async fn generate_preserves_human_authored_file() {
        let dir = tempfile::tempdir().unwrap();
        let human = dir.path().join("tests/unit/test_app_util.py");
        std::fs::create_dir_all(human.parent().unwrap()).unwrap();
        std::fs::write(&human, "def test_mine():\n    assert True\n").unwrap();

        let out = TemplateGenerator::new()
            .generate(dir.path(), &inventory(), &TargetSelector::All)
            .await
            .unwrap();
        assert_eq!(out.conflicts, vec![PathBuf::from("tests/unit/test_app_util.py")]);
        assert_eq!(out.written, vec![PathBuf::from("tests/unit/test_app_models.py")]);
        assert_eq!(
            std::fs::read_to_string(&human).unwrap(),
            "def test_mine():\n    assert True\n"
        );
    }

    #[tokio::test]
    async fn generate_rewrites_own_output() {
        let dir = tempfile::tempdir().unwrap();
        let generator = TemplateGenerator::new();
        let first = generator
            .generate(dir.path(), &inventory(), &TargetSelector::All)
            .await
            .unwrap();
        let second = generator
            .generate(dir.path(), &inventory(), &TargetSelector::All)
            .await
            .unwrap();
        assert_eq!(first.written, second.written);
        assert!(second.conflicts.is_empty());
    }

    #[tokio::test]
    async fn generate_single_file_and_unknown_file() {
        let dir = tempfile::tempdir().unwrap();
        let generator = TemplateGenerator::new();
        let out = generator
            .generate(
                dir.path(),
                &inventory(),
                &TargetSelector::File(PathBuf::from("util.py")),
            )
            .await
            .unwrap();
        assert_eq!(out.written, vec![PathBuf::from("tests/unit/test_app_util.py")]);

        let err = generator
            .generate(
                dir.path(),
                &inventory(),
                &TargetSelector::File(PathBuf::from("missing.py")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn generate_e2e_when_base_url_configured() {
        let dir = tempfile::tempdir().unwrap();
        let out = TemplateGenerator::new()
            .with_e2e_base_url(Some("http://localhost:8000".to_string()))
            .generate(dir.path(), &[], &TargetSelector::All)
            .await
            .unwrap();
        assert_eq!(out.written, vec![PathBuf::from("tests/e2e/test_smoke_e2e.py")]);
        assert_eq!(out.test_cases, 1);
        let content =
            std::fs::read_to_string(dir.path().join("tests/e2e/test_smoke_e2e.py")).unwrap();
        assert!(content.contains("http://localhost:8000"));
    }

    #[tokio::test]
    async fn generate_keeps_going_after_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let human = dir.path().join("tests/unit/test_app_util.py");
        std::fs::create_dir_all(human.parent().unwrap()).unwrap();
        std::fs::write(&human, "def test_mine():\n    assert True\n").unwrap();
        // A plain file where the e2e directory belongs makes that write fail.
        std::fs::write(dir.path().join("tests/e2e"), "not a directory").unwrap();

        let out = TemplateGenerator::new()
            .with_e2e_base_url(Some("http://localhost:8000".to_string()))
            .generate(dir.path(), &inventory(), &TargetSelector::All)
            .await
            .unwrap();

        assert!(!out.is_complete());
        assert_eq!(out.errors.len(), 1);
        assert!(out.errors[0].contains("tests/e2e"));
        assert_eq!(out.conflicts, vec![PathBuf::from("tests/unit/test_app_util.py")]);
        assert_eq!(out.written, vec![PathBuf::from("tests/unit/test_app_models.py")]);
        assert!(dir.path().join("tests/unit/test_app_models.py").is_file());
    }

    #[tokio::test]
    async fn generate_separates_colliding_test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let inventory = vec![
            FileInventory {
                file: PathBuf::from("app/models.py"),
                functions: vec!["load".into()],
                classes: vec![],
                complexity: 0,
            },
            FileInventory {
                file: PathBuf::from("app_models.py"),
                functions: vec!["save".into()],
                classes: vec![],
                complexity: 0,
            },
        ];

        let out = TemplateGenerator::new()
            .generate(dir.path(), &inventory, &TargetSelector::All)
            .await
            .unwrap();

        assert_eq!(out.test_cases, 2);
        assert_eq!(out.written.len(), 2);
        assert_ne!(out.written[0], out.written[1]);
        let contents: Vec<String> = out
            .written
            .iter()
            .map(|p| std::fs::read_to_string(dir.path().join(p)).unwrap())
            .collect();
        assert!(contents.iter().any(|c| c.contains("test_load_is_exposed")));
        assert!(contents.iter().any(|c| c.contains("test_save_is_exposed")));
    }

    #[test]
    fn claim_path_suffixes_duplicates() {
        let mut claimed = HashSet::new();
        let base = PathBuf::from("tests/unit/test_app_models.py");
        assert_eq!(claim_path(&mut claimed, base.clone()), base);
        assert_eq!(
            claim_path(&mut claimed, base.clone()),
            PathBuf::from("tests/unit/test_app_models_2.py")
        );
        assert_eq!(
            claim_path(&mut claimed, base),
            PathBuf::from("tests/unit/test_app_models_3.py")
        );
    }
}
