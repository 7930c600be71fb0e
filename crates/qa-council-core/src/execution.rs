//! Test-execution collaborator: picks the test runner for a checkout, runs it
//! and parses its terminal output into a [`TestRunSummary`].

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::process::{Output, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::analysis::skip_dir;
use crate::collaborators::{CollabResult, CollaboratorError, TestExecutor};
use crate::domain::{FailureRecord, TestRunSummary};

/// Configured test command that asks for runner discovery in each checkout.
pub const AUTO_TEST_COMMAND: &str = "auto";

/// Runners the executor knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestRunner {
    Pytest,
    Vitest,
    Jest,
    Unittest,
    /// Any other command. Run as given, without extra flags.
    Other,
}

impl TestRunner {
    /// Pick a runner from the markers present under `root`.
    ///
    /// Python test configuration or test files win, then the `package.json`
    /// dependencies, then bare Python sources. Anything else gets pytest.
    pub fn discover(root: &Path) -> Self {
        let has_pytest_markers = ["pytest.ini", "pyproject.toml", "tox.ini"]
            .iter()
            .any(|marker| root.join(marker).is_file());
        let has_python_tests = contains_file(&root.join("tests"), &|name| name.ends_with(".py"))
            || has_root_test_module(root);
        if has_pytest_markers || has_python_tests {
            return TestRunner::Pytest;
        }
        if let Some(runner) = package_json_runner(root) {
            return runner;
        }
        if contains_file(root, &|name| name.ends_with(".py")) {
            return TestRunner::Unittest;
        }
        TestRunner::Pytest
    }

    /// Classify an explicit command line by the runner it invokes.
    pub fn classify(command: &[String]) -> Self {
        let invokes = |runner: &str| {
            command
                .iter()
                .filter_map(|word| Path::new(word).file_name())
                .any(|name| name.to_string_lossy() == runner)
        };
        if invokes("pytest") || invokes("py.test") {
            TestRunner::Pytest
        } else if invokes("unittest") {
            TestRunner::Unittest
        } else if invokes("vitest") {
            TestRunner::Vitest
        } else if invokes("jest") {
            TestRunner::Jest
        } else {
            TestRunner::Other
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TestRunner::Pytest => "pytest",
            TestRunner::Vitest => "vitest",
            TestRunner::Jest => "jest",
            TestRunner::Unittest => "unittest",
            TestRunner::Other => "other",
        }
    }

    /// The command a discovered runner is started with. Empty for [`TestRunner::Other`].
    pub fn default_command(self) -> Vec<String> {
        let words: &[&str] = match self {
            TestRunner::Pytest => &["pytest"],
            TestRunner::Vitest => &["npm", "run", "test", "--", "--run"],
            TestRunner::Jest => &["npm", "test", "--", "--runInBand"],
            TestRunner::Unittest => &["python", "-m", "unittest", "discover", "-v"],
            TestRunner::Other => &[],
        };
        words.iter().map(|w| w.to_string()).collect()
    }

    pub fn command_line(self) -> String {
        self.default_command().join(" ")
    }

    /// Exit codes that mean the runner executed and reported.
    fn executed_exit_codes(self) -> &'static [i32] {
        match self {
            // 5: nothing collected
            TestRunner::Pytest | TestRunner::Unittest => &[0, 1, 5],
            TestRunner::Vitest | TestRunner::Jest | TestRunner::Other => &[0, 1],
        }
    }
}

fn is_auto(test_command: &str) -> bool {
    test_command.trim().eq_ignore_ascii_case(AUTO_TEST_COMMAND)
}

/// The command line a configured test command stands for in `root`.
pub fn resolve_test_command(test_command: &str, root: &Path) -> String {
    if is_auto(test_command) {
        TestRunner::discover(root).command_line()
    } else {
        test_command.trim().to_string()
    }
}

fn contains_file(dir: &Path, matches: &dyn Fn(&str) -> bool) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let name = entry.file_name().to_string_lossy().to_string();
        match entry.file_type() {
            Ok(t) if t.is_dir() => !skip_dir(&name) && contains_file(&entry.path(), matches),
            Ok(t) if t.is_file() => matches(&name),
            _ => false,
        }
    })
}

fn has_root_test_module(root: &Path) -> bool {
    std::fs::read_dir(root).is_ok_and(|entries| {
        entries.flatten().any(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            name.starts_with("test_") && name.ends_with(".py") && entry.path().is_file()
        })
    })
}

fn package_json_runner(root: &Path) -> Option<TestRunner> {
    let path = root.join("package.json");
    let bytes = std::fs::read(&path).ok()?;
    let manifest: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring unparsable package.json");
            return None;
        }
    };
    let depends_on = |package: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|table| manifest[*table].get(package).is_some())
    };
    if depends_on("vitest") {
        Some(TestRunner::Vitest)
    } else if depends_on("jest") {
        Some(TestRunner::Jest)
    } else {
        None
    }
}

/// One concrete way of starting the runner.
#[derive(Debug, Clone, PartialEq)]
struct Invocation {
    runner: TestRunner,
    command: Vec<String>,
}

impl Invocation {
    fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    fn runner_label(&self) -> String {
        match self.runner {
            TestRunner::Other => Path::new(self.program())
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            runner => runner.name().to_string(),
        }
    }

    /// Arguments after the program. Only pytest gets report and coverage flags.
    fn args(&self, root: &Path, selector: Option<&str>, coverage: bool) -> Vec<String> {
        let mut args: Vec<String> = self.command.iter().skip(1).cloned().collect();
        match self.runner {
            TestRunner::Pytest => {
                args.extend(["-v", "--tb=short", "-rfE"].map(String::from));
                if coverage {
                    args.push(format!("--cov={}", root.display()));
                    args.push("--cov-report=term".to_string());
                }
                args.push(selector.unwrap_or(".").to_string());
            }
            TestRunner::Unittest => {
                let start = match selector {
                    Some(s) => s,
                    None if root.join("tests").is_dir() => "tests",
                    None => ".",
                };
                args.push(start.to_string());
            }
            TestRunner::Vitest | TestRunner::Jest | TestRunner::Other => {
                args.extend(selector.map(String::from));
            }
        }
        args
    }

    /// What to run instead when the runner refuses our options, and whether
    /// coverage stays on.
    fn fallback(&self, coverage: bool) -> Option<(Invocation, bool)> {
        match self.runner {
            TestRunner::Pytest if coverage => Some((self.clone(), false)),
            TestRunner::Vitest | TestRunner::Jest
                if self.command == self.runner.default_command() =>
            {
                let plain = Invocation {
                    runner: self.runner,
                    command: vec!["npm".to_string(), "test".to_string()],
                };
                Some((plain, false))
            }
            _ => None,
        }
    }

    fn executed(&self, output: &Output) -> bool {
        output
            .status
            .code()
            .is_some_and(|c| self.runner.executed_exit_codes().contains(&c))
    }
}

/// Runs the configured test command, or a discovered one for `auto`.
#[derive(Debug, Clone)]
pub struct CommandTestExecutor {
    /// `None` discovers the runner per checkout.
    command: Option<Vec<String>>,
    runner: Option<TestRunner>,
    coverage: bool,
}

impl CommandTestExecutor {
    pub fn new(test_command: &str) -> Self {
        let command = if is_auto(test_command) {
            None
        } else {
            Some(test_command.split_whitespace().map(String::from).collect())
        };
        Self {
            command,
            runner: None,
            coverage: true,
        }
    }

    /// Treat the command as `runner` instead of classifying it.
    pub fn with_runner(mut self, runner: TestRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Disable the coverage flags up front.
    pub fn without_coverage(mut self) -> Self {
        self.coverage = false;
        self
    }

    async fn invocation(&self, root: &Path) -> CollabResult<Invocation> {
        let invocation = match (&self.command, self.runner) {
            (Some(command), runner) => Invocation {
                runner: runner.unwrap_or_else(|| TestRunner::classify(command)),
                command: command.clone(),
            },
            (None, Some(runner)) => Invocation {
                runner,
                command: runner.default_command(),
            },
            (None, None) => {
                let dir = root.to_path_buf();
                let runner = tokio::task::spawn_blocking(move || TestRunner::discover(&dir))
                    .await
                    .map_err(|e| {
                        CollaboratorError::Crashed(format!("runner discovery failed: {e}"))
                    })?;
                info!(runner = runner.name(), "discovered test runner");
                Invocation {
                    runner,
                    command: runner.default_command(),
                }
            }
        };
        if invocation.command.is_empty() {
            return Err(CollaboratorError::Crashed(
                "test command is empty".to_string(),
            ));
        }
        Ok(invocation)
    }

    async fn spawn(
        &self,
        invocation: &Invocation,
        root: &Path,
        args: &[String],
        timeout: Duration,
    ) -> CollabResult<Output> {
        let program = invocation.program();
        debug!(program = %program, ?args, runner = invocation.runner.name(), "spawning test runner");
        let child = Command::new(program)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CollaboratorError::Crashed(format!("failed to start {program}: {e}")))?;

        // Dropping the wait future on timeout kills the child.
        tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorError::Timeout {
                secs: timeout.as_secs(),
            })?
            .map_err(|e| CollaboratorError::Crashed(format!("{program} failed: {e}")))
    }
}

#[async_trait]
impl TestExecutor for CommandTestExecutor {
    async fn run(
        &self,
        root: &Path,
        selector: Option<&str>,
        timeout: Duration,
    ) -> CollabResult<TestRunSummary> {
        let started = Instant::now();
        let mut invocation = self.invocation(root).await?;
        let coverage = self.coverage && invocation.runner == TestRunner::Pytest;
        let mut output = self
            .spawn(
                &invocation,
                root,
                &invocation.args(root, selector, coverage),
                timeout,
            )
            .await?;

        if !invocation.executed(&output) && rejects_options(&combined(&output)) {
            if let Some((next, coverage)) = invocation.fallback(coverage) {
                warn!(
                    runner = invocation.runner.name(),
                    "test runner rejected its options, re-running with the fallback command"
                );
                let remaining = timeout.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    return Err(CollaboratorError::Timeout {
                        secs: timeout.as_secs(),
                    });
                }
                output = self
                    .spawn(&next, root, &next.args(root, selector, coverage), remaining)
                    .await?;
                invocation = next;
            }
        }

        let text = combined(&output);
        if !invocation.executed(&output) {
            let code = output
                .status
                .code()
                .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
            return Err(CollaboratorError::Crashed(format!(
                "test runner exited with {code}: {}",
                tail(&text)
            )));
        }

        let mut summary = parse_test_output(&text);
        summary.runner = invocation.runner_label();
        if output.status.code() == Some(1) && summary.total() == 0 && summary.failures.is_empty()
        {
            return Err(CollaboratorError::Crashed(format!(
                "test runner exited with code 1 but reported no results: {}",
                tail(&text)
            )));
        }
        info!(
            runner = %summary.runner,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            coverage = ?summary.coverage_percent(),
            "test run complete"
        );
        Ok(summary)
    }
}

fn combined(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push('\n');
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Last few non-blank lines, for crash messages.
fn tail(text: &str) -> String {
    let mut lines: Vec<&str> = text
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(5)
        .collect();
    lines.reverse();
    lines.join(" | ")
}

/// Whether the runner refused the options it was started with.
pub fn rejects_options(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("unrecognized arguments")
        || lower.contains("unknown option")
        || lower.contains("no such option")
}

fn count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(\d+) (passed|failed|skipped|errors?|xfailed|xpassed|todo|passing|failing|pending)\b",
        )
        .expect("regex for result counts")
    })
}

fn coverage_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\S+)\s+\d+\s+\d+\s+(?:\d+\s+\d+\s+)?(\d+(?:\.\d+)?)%")
            .expect("regex for coverage rows")
    })
}

fn failure_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:FAILED|ERROR) (\S+)(?: - (.*))?$").expect("regex for failure lines")
    })
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^_{3,} (.+?) _{3,}$").expect("regex for section headers"))
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+?):(\d+): ").expect("regex for traceback locations"))
}

fn ran_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Ran (\d+) tests? in ").expect("regex for unittest totals"))
}

fn outcome_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:OK|FAILED)(?: \((.+)\))?$").expect("regex for unittest outcomes")
    })
}

fn unittest_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:FAIL|ERROR): (\S+) \(([^)]*)\)").expect("regex for unittest failures")
    })
}

fn frame_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\s*File "([^"]+)", line (\d+)"#).expect("regex for python frames")
    })
}

fn jest_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*FAIL\s+(\S+)\s*$").expect("regex for jest suites"))
}

fn jest_case_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*● (.+)$").expect("regex for jest failures"))
}

fn vitest_case_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*FAIL\s+(\S+) > (.+)$").expect("regex for vitest failures"))
}

fn js_location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([^\s()]+):(\d+):\d+").expect("regex for js stack frames"))
}

/// jest `Tests:` and vitest `Tests` summary lines.
fn is_tests_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("Tests:") || line.starts_with("Tests ")
}

fn is_rule(line: &str, c: char) -> bool {
    line.len() >= 10 && line.chars().all(|ch| ch == c)
}

/// `(passed, failed, skipped)` from the final summary line; errors count as failures.
///
/// Understands pytest's `=`-framed line, unittest's `Ran N tests` block and the
/// jest/vitest `Tests` line, then falls back to the last line with counts.
pub fn parse_counts(output: &str) -> (u32, u32, u32) {
    let lines: Vec<&str> = output.lines().collect();
    let pytest_line = lines
        .iter()
        .rev()
        .find(|l| l.trim_start().starts_with('=') && count_re().is_match(l));
    if pytest_line.is_none() {
        if let Some(counts) = parse_unittest_counts(&lines) {
            return counts;
        }
    }
    let line = pytest_line
        .or_else(|| {
            lines
                .iter()
                .rev()
                .find(|l| is_tests_line(l) && count_re().is_match(l))
        })
        .or_else(|| lines.iter().rev().find(|l| count_re().is_match(l)));

    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    if let Some(line) = line {
        for caps in count_re().captures_iter(line) {
            let n: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passed" | "xpassed" | "passing" => passed += n,
                "failed" | "error" | "errors" | "failing" => failed += n,
                "skipped" | "xfailed" | "todo" | "pending" => skipped += n,
                _ => {}
            }
        }
    }
    (passed, failed, skipped)
}

fn parse_unittest_counts(lines: &[&str]) -> Option<(u32, u32, u32)> {
    let ran_at = lines.iter().rposition(|l| ran_re().is_match(l.trim_end()))?;
    let ran: u32 = ran_re().captures(lines[ran_at].trim_end())?[1].parse().ok()?;

    let (mut failed, mut skipped) = (0u32, 0u32);
    let details = lines[ran_at..]
        .iter()
        .find_map(|l| outcome_re().captures(l.trim_end()))
        .and_then(|caps| caps.get(1).map(|m| m.as_str()));
    for part in details.unwrap_or("").split(',') {
        let Some((key, n)) = part.trim().split_once('=') else {
            continue;
        };
        let n: u32 = n.parse().unwrap_or(0);
        match key {
            "failures" | "errors" | "unexpected successes" => failed += n,
            "skipped" | "expected failures" => skipped += n,
            _ => {}
        }
    }
    Some((ran.saturating_sub(failed + skipped), failed, skipped))
}

/// Per-module coverage rows and the `TOTAL` row of a coverage table.
pub fn parse_coverage(output: &str) -> (BTreeMap<String, f64>, Option<f64>) {
    let mut modules = BTreeMap::new();
    let mut total = None;
    for line in output.lines() {
        let Some(caps) = coverage_row_re().captures(line.trim_end()) else {
            continue;
        };
        let Ok(pct) = caps[2].parse::<f64>() else {
            continue;
        };
        match &caps[1] {
            "TOTAL" => total = Some(pct),
            name if name.ends_with(".py") || name.contains('/') => {
                modules.insert(name.to_string(), pct);
            }
            _ => {}
        }
    }
    (modules, total)
}

/// Failure records from every transcript shape the executor understands.
pub fn parse_failures(output: &str) -> Vec<FailureRecord> {
    let mut records = parse_pytest_failures(output);
    records.extend(parse_unittest_failures(output));
    records.extend(parse_js_failures(output));

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert((r.name.clone(), r.file.clone())));
    records
}

/// Records from pytest's short test summary, with line numbers recovered from
/// the matching traceback section.
fn parse_pytest_failures(output: &str) -> Vec<FailureRecord> {
    // section name -> (file, line) frames in order of appearance
    let mut frames: HashMap<String, Vec<(String, u32)>> = HashMap::new();
    let mut current: Option<String> = None;
    for line in output.lines() {
        if let Some(caps) = section_re().captures(line) {
            current = Some(caps[1].to_string());
            continue;
        }
        if let (Some(section), Some(caps)) = (&current, location_re().captures(line)) {
            if let Ok(n) = caps[2].parse() {
                frames
                    .entry(section.clone())
                    .or_default()
                    .push((caps[1].to_string(), n));
            }
        }
    }

    output
        .lines()
        .filter_map(|line| failure_line_re().captures(line.trim_end()))
        .map(|caps| {
            let node_id = caps[1].to_string();
            let message = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
            let (file, name) = match node_id.split_once("::") {
                Some((file, name)) => (file.to_string(), name.to_string()),
                None => (node_id.clone(), node_id.clone()),
            };
            let section = name.replace("::", ".");
            let line = frames
                .get(&section)
                .and_then(|f| f.iter().rev().find(|(path, _)| *path == file))
                .map(|(_, n)| *n);
            FailureRecord {
                name,
                file: Some(file),
                line,
                message,
            }
        })
        .collect()
}

/// `FAIL:`/`ERROR:` blocks of a verbose unittest run. The first traceback
/// frame locates the test and the last line of the block is the message.
fn parse_unittest_failures(output: &str) -> Vec<FailureRecord> {
    let lines: Vec<&str> = output.lines().map(str::trim_end).collect();
    let mut records = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let Some(caps) = unittest_header_re().captures(line) else {
            continue;
        };
        let body: Vec<&str> = lines[i + 1..]
            .iter()
            .skip_while(|l| is_rule(l, '-'))
            .take_while(|l| !is_rule(l, '=') && !is_rule(l, '-'))
            .copied()
            .collect();
        let frame = body.iter().find_map(|l| frame_re().captures(l));
        let message = body
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_default();
        records.push(FailureRecord {
            name: caps[1].to_string(),
            file: frame.as_ref().map(|f| f[1].to_string()),
            line: frame.as_ref().and_then(|f| f[2].parse().ok()),
            message,
        });
    }
    records
}

fn ends_js_block(line: &str) -> bool {
    let trimmed = line.trim_start();
    jest_case_re().is_match(line)
        || jest_file_re().is_match(line)
        || vitest_case_re().is_match(line)
        || trimmed.starts_with("PASS ")
        || trimmed.starts_with("Test Suites:")
        || is_tests_line(line)
}

/// jest `●` blocks under their `FAIL <suite>` header, and vitest
/// `FAIL <file> > <test>` blocks.
fn parse_js_failures(output: &str) -> Vec<FailureRecord> {
    let lines: Vec<&str> = output.lines().map(str::trim_end).collect();
    let mut records = Vec::new();
    let mut suite: Option<String> = None;
    for (i, line) in lines.iter().enumerate() {
        let (name, file) = if let Some(caps) = vitest_case_re().captures(line) {
            (caps[2].trim().to_string(), Some(caps[1].to_string()))
        } else if let Some(caps) = jest_file_re().captures(line) {
            suite = Some(caps[1].to_string());
            continue;
        } else if let Some(caps) = jest_case_re().captures(line) {
            let name = caps[1].trim().to_string();
            if name == "Console" {
                continue;
            }
            (name, suite.clone())
        } else {
            continue;
        };

        let end = lines[i + 1..]
            .iter()
            .position(|l| ends_js_block(l))
            .map_or(lines.len(), |p| i + 1 + p);
        let body = &lines[i + 1..end];
        let message = body
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string();
        let line = file.as_deref().and_then(|f| {
            body.iter()
                .flat_map(|l| js_location_re().captures_iter(l))
                .find(|c| c[1].ends_with(f))
                .and_then(|c| c[2].parse().ok())
        });
        records.push(FailureRecord {
            name,
            file,
            line,
            message,
        });
    }
    records
}

/// Parse a full runner transcript.
pub fn parse_test_output(output: &str) -> TestRunSummary {
    let (passed, failed, skipped) = parse_counts(output);
    let (coverage_by_module, total_coverage) = parse_coverage(output);
    TestRunSummary {
        runner: String::new(),
        passed,
        failed,
        skipped,
        coverage_by_module,
        total_coverage,
        failures: parse_failures(output),
    }
}
