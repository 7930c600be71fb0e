//! In-memory collaborator fakes (testing only)
//!
//! Provides `FakeVcs`, `FakeAnalyzer`, `FakeGenerator`, `FakeTestExecutor`,
//! `FakeRenderer` and `FakeDispatcher`, which satisfy the collaborator
//! contracts without git, a test runner or the network. `FakeSet` bundles one
//! of each and hands out a [`Collaborators`] view over them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{
    Analyzer, Checkout, CiRenderer, CollabResult, CollaboratorError, Collaborators,
    DispatchRequest, Dispatcher, GenerationOutput, TestExecutor, TestGenerator, TriggerConfig,
    VcsCollaborator,
};
use crate::domain::{FileInventory, TargetSelector, TestRunSummary};
use crate::generation::unit_test_path;
use crate::publish::workflow_path;

type ErrorFactory = Arc<dyn Fn() -> CollaboratorError + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// FakeVcs
// ---------------------------------------------------------------------------

/// Creates the destination directory and seeds it with configured files.
#[derive(Default)]
pub struct FakeVcs {
    files: Vec<(PathBuf, String)>,
    revision: Option<String>,
    delay: Option<Duration>,
    failure: Option<ErrorFactory>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    destinations: Mutex<Vec<PathBuf>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file into every fresh checkout.
    pub fn with_file(mut self, relative: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.push((relative.into(), content.into()));
        self
    }

    /// Report `revision` instead of the default hex sha.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Hold each call for `delay` (used to observe serialisation).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> CollaboratorError + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(factory));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn destinations(&self) -> Vec<PathBuf> {
        lock(&self.destinations).clone()
    }

    async fn checkout(&self, dest: &Path) -> CollabResult<Checkout> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(factory) = &self.failure {
            return Err(factory());
        }

        let refreshed = dest.exists();
        std::fs::create_dir_all(dest)?;
        if !refreshed {
            for (relative, content) in &self.files {
                let path = dest.join(relative);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, content)?;
            }
        }
        lock(&self.destinations).push(dest.to_path_buf());
        Ok(Checkout {
            path: dest.to_path_buf(),
            revision: self
                .revision
                .clone()
                .unwrap_or_else(|| "0000000000000000000000000000000000fa4e01".to_string()),
            refreshed,
        })
    }
}

#[async_trait]
impl VcsCollaborator for FakeVcs {
    async fn clone_or_update(
        &self,
        _locator: &str,
        _branch: &str,
        dest: &Path,
    ) -> CollabResult<Checkout> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let result = self.checkout(dest).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// FakeAnalyzer
// ---------------------------------------------------------------------------

/// Returns a fixed inventory regardless of the workspace contents.
pub struct FakeAnalyzer {
    inventory: Vec<FileInventory>,
    failure: Option<ErrorFactory>,
    calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn new(inventory: Vec<FileInventory>) -> Self {
        Self {
            inventory,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// `files` source files under `app/`, spreading `functions` public functions across them.
    pub fn with_counts(files: usize, functions: usize) -> Self {
        let mut inventory: Vec<FileInventory> = (0..files)
            .map(|i| FileInventory::new(format!("app/module_{i}.py")))
            .collect();
        if !inventory.is_empty() {
            for n in 0..functions {
                let slot = n % inventory.len();
                inventory[slot].functions.push(format!("func_{n}"));
            }
        }
        Self::new(inventory)
    }

    pub fn failing_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> CollaboratorError + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(factory));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeAnalyzer {
    fn default() -> Self {
        Self::with_counts(1, 1)
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn inspect(&self, _root: &Path, _file_pattern: &str) -> CollabResult<Vec<FileInventory>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(factory) => Err(factory()),
            None => Ok(self.inventory.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeGenerator
// ---------------------------------------------------------------------------

/// Reports one artifact per selected file without touching disk.
#[derive(Default)]
pub struct FakeGenerator {
    conflicts: Vec<PathBuf>,
    unwritable: Vec<PathBuf>,
    failure: Option<ErrorFactory>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `path` as a human-authored conflict instead of writing it.
    pub fn with_conflict(mut self, path: impl Into<PathBuf>) -> Self {
        self.conflicts.push(path.into());
        self
    }

    /// Fail the write of `path` while the rest of the pass continues.
    pub fn with_write_error(mut self, path: impl Into<PathBuf>) -> Self {
        self.unwritable.push(path.into());
        self
    }

    pub fn failing_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> CollaboratorError + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(factory));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestGenerator for FakeGenerator {
    async fn generate(
        &self,
        _root: &Path,
        inventory: &[FileInventory],
        selector: &TargetSelector,
    ) -> CollabResult<GenerationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(factory) = &self.failure {
            return Err(factory());
        }

        let mut output = GenerationOutput::default();
        for target in inventory.iter().filter(|inv| selector.matches(&inv.file)) {
            output.targets += 1;
            let path = unit_test_path(&target.file);
            if self.conflicts.contains(&path) {
                output.conflicts.push(path);
            } else if self.unwritable.contains(&path) {
                output
                    .errors
                    .push(format!("storage not writable: {}", path.display()));
            } else {
                output.test_cases +=
                    target.public_functions().count() + target.public_classes().count();
                output.written.push(path);
            }
        }
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// FakeTestExecutor
// ---------------------------------------------------------------------------

enum ExecBehaviour {
    Summary(TestRunSummary),
    Hang,
    Crash(String),
}

/// Returns a canned summary, hangs forever, or crashes.
pub struct FakeTestExecutor {
    behaviour: ExecBehaviour,
    calls: AtomicUsize,
    last_selector: Mutex<Option<String>>,
    last_timeout: Mutex<Option<Duration>>,
}

impl FakeTestExecutor {
    fn with_behaviour(behaviour: ExecBehaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            last_selector: Mutex::new(None),
            last_timeout: Mutex::new(None),
        }
    }

    pub fn returning(summary: TestRunSummary) -> Self {
        Self::with_behaviour(ExecBehaviour::Summary(summary))
    }

    /// Never completes; the caller's timeout or cancellation must fire.
    pub fn hanging() -> Self {
        Self::with_behaviour(ExecBehaviour::Hang)
    }

    pub fn crashing(message: impl Into<String>) -> Self {
        Self::with_behaviour(ExecBehaviour::Crash(message.into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_selector(&self) -> Option<String> {
        lock(&self.last_selector).clone()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        *lock(&self.last_timeout)
    }
}

impl Default for FakeTestExecutor {
    fn default() -> Self {
        Self::returning(TestRunSummary {
            runner: "fake".to_string(),
            passed: 1,
            ..TestRunSummary::default()
        })
    }
}

#[async_trait]
impl TestExecutor for FakeTestExecutor {
    async fn run(
        &self,
        _root: &Path,
        selector: Option<&str>,
        timeout: Duration,
    ) -> CollabResult<TestRunSummary> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_selector) = selector.map(String::from);
        *lock(&self.last_timeout) = Some(timeout);
        match &self.behaviour {
            ExecBehaviour::Summary(summary) => Ok(summary.clone()),
            ExecBehaviour::Hang => std::future::pending().await,
            ExecBehaviour::Crash(message) => Err(CollaboratorError::Crashed(message.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeRenderer
// ---------------------------------------------------------------------------

/// Records render calls and returns the conventional workflow path.
#[derive(Default)]
pub struct FakeRenderer {
    failure: Option<ErrorFactory>,
    renders: Mutex<Vec<(String, TriggerConfig)>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> CollaboratorError + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(factory));
        self
    }

    /// `(test_command, trigger)` for every render call.
    pub fn renders(&self) -> Vec<(String, TriggerConfig)> {
        lock(&self.renders).clone()
    }
}

#[async_trait]
impl CiRenderer for FakeRenderer {
    async fn render(
        &self,
        _root: &Path,
        test_command: &str,
        trigger: &TriggerConfig,
    ) -> CollabResult<PathBuf> {
        if let Some(factory) = &self.failure {
            return Err(factory());
        }
        lock(&self.renders).push((test_command.to_string(), trigger.clone()));
        Ok(workflow_path())
    }
}

// ---------------------------------------------------------------------------
// FakeDispatcher
// ---------------------------------------------------------------------------

/// Accepts every dispatch unless configured to fail.
#[derive(Default)]
pub struct FakeDispatcher {
    failure: Option<ErrorFactory>,
    requests: Mutex<Vec<DispatchRequest>>,
}

impl FakeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> CollaboratorError + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(factory));
        self
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn dispatch(&self, request: &DispatchRequest, _credential: &str) -> CollabResult<()> {
        lock(&self.requests).push(request.clone());
        match &self.failure {
            Some(factory) => Err(factory()),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeSet
// ---------------------------------------------------------------------------

/// One fake of each collaborator, kept inspectable after the run.
#[derive(Clone)]
pub struct FakeSet {
    pub vcs: Arc<FakeVcs>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub generator: Arc<FakeGenerator>,
    pub executor: Arc<FakeTestExecutor>,
    pub renderer: Arc<FakeRenderer>,
    pub dispatcher: Arc<FakeDispatcher>,
}

impl Default for FakeSet {
    fn default() -> Self {
        Self {
            vcs: Arc::new(FakeVcs::new()),
            analyzer: Arc::new(FakeAnalyzer::default()),
            generator: Arc::new(FakeGenerator::new()),
            executor: Arc::new(FakeTestExecutor::default()),
            renderer: Arc::new(FakeRenderer::new()),
            dispatcher: Arc::new(FakeDispatcher::new()),
        }
    }
}

impl FakeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vcs(mut self, vcs: FakeVcs) -> Self {
        self.vcs = Arc::new(vcs);
        self
    }

    pub fn with_analyzer(mut self, analyzer: FakeAnalyzer) -> Self {
        self.analyzer = Arc::new(analyzer);
        self
    }

    pub fn with_generator(mut self, generator: FakeGenerator) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    pub fn with_executor(mut self, executor: FakeTestExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn with_renderer(mut self, renderer: FakeRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: FakeDispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            vcs: self.vcs.clone(),
            analyzer: self.analyzer.clone(),
            generator: self.generator.clone(),
            executor: self.executor.clone(),
            renderer: self.renderer.clone(),
            dispatcher: self.dispatcher.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_counts_spreads_functions() {
        let analyzer = FakeAnalyzer::with_counts(5, 12);
        let total: usize = analyzer.inventory.iter().map(|f| f.functions.len()).sum();
        assert_eq!(analyzer.inventory.len(), 5);
        assert_eq!(total, 12);
    }

    #[tokio::test]
    async fn fake_vcs_reports_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ws");
        let vcs = FakeVcs::new().with_file("tests/unit/test_keep.py", "human");
        let first = vcs.clone_or_update("repo", "main", &dest).await.unwrap();
        let second = vcs.clone_or_update("repo", "main", &dest).await.unwrap();
        assert!(!first.refreshed);
        assert!(second.refreshed);
        assert_eq!(vcs.calls(), 2);
        assert_eq!(
            std::fs::read_to_string(dest.join("tests/unit/test_keep.py")).unwrap(),
            "human"
        );
    }

    #[tokio::test]
    async fn fake_generator_honours_conflicts() {
        let generator = FakeGenerator::new().with_conflict("tests/unit/test_app_module_0.py");
        let analyzer = FakeAnalyzer::with_counts(2, 4);
        let out = generator
            .generate(Path::new("."), &analyzer.inventory, &TargetSelector::All)
            .await
            .unwrap();
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.written.len(), 1);
        assert_eq!(out.test_cases, 2);
    }
}
