//! QA Council CLI
//!
//! The `qa-council` command runs the six-stage QA pipeline against a repository.
//!
//! ## Commands
//!
//! - `run`: Acquire, inspect, generate, run, repair and publish for one branch
//! - `analyze`: Inventory a local source tree and rank test targets
//! - `repair`: Classify a saved test run and print suggested fixes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn, Level};

use qa_council_core::analysis::{inspect_tree, select_test_targets, testability_score};
use qa_council_core::obs::RunSpan;
use qa_council_core::repair::count_by_priority;
use qa_council_core::{
    aggregate, init_tracing, plan_fixes, write_report_artifact, Collaborators, FailureRecord,
    PipelineStatus, QaConfig, Report, TestRunSummary,
};
use qa_council_pipeline::{Cancellation, PipelineCoordinator, PipelineOptions};

#[derive(Parser)]
#[command(name = "qa-council")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automated QA pipeline for remote repositories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline against a repository branch
    Run {
        /// Repository URL or local path
        locator: String,

        /// Branch to check out
        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Only generate tests for this source file
        #[arg(long)]
        target_file: Option<PathBuf>,

        /// Only run tests matching this path or node id
        #[arg(long)]
        test_selector: Option<String>,

        /// Trigger the rendered workflow on GitHub after publishing
        #[arg(long)]
        dispatch: bool,

        /// Wall-clock budget for the test run
        #[arg(long, env = "QA_RUN_TIMEOUT_SECS")]
        run_timeout_secs: Option<u64>,

        /// Cancel the whole run after this many seconds
        #[arg(long, env = "QA_DEADLINE_SECS")]
        deadline_secs: Option<u64>,

        /// Report format written to stdout
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Also write the rendered report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inventory a local source tree and rank test targets
    Analyze {
        /// Root directory to walk
        #[arg(default_value = ".")]
        path: PathBuf,

        /// File pattern (`*`, `*.ext` or an exact file name)
        #[arg(short, long, default_value = "*.py")]
        pattern: String,
    },

    /// Classify a saved test run summary and print ranked fixes
    Repair {
        /// JSON test run summary, or a bare list of failure records
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            locator,
            branch,
            target_file,
            test_selector,
            dispatch,
            run_timeout_secs,
            deadline_secs,
            format,
            output,
        } => {
            let config = QaConfig::from_env().context("Failed to load configuration")?;
            let mut options = PipelineOptions::from_config(&config).with_dispatch(dispatch);
            if let Some(file) = target_file {
                options = options.with_target_file(file);
            }
            if let Some(selector) = test_selector {
                options = options.with_test_selector(selector);
            }
            if let Some(secs) = run_timeout_secs {
                anyhow::ensure!(secs > 0, "--run-timeout-secs must be greater than zero");
                options = options.with_run_timeout_secs(secs);
            }
            cmd_run(
                config,
                &locator,
                &branch,
                &options,
                deadline_secs,
                format,
                output.as_deref(),
            )
            .await
        }
        Commands::Analyze { path, pattern } => cmd_analyze(&path, &pattern),
        Commands::Repair { file } => cmd_repair(&file),
    }
}

async fn cmd_run(
    config: QaConfig,
    locator: &str,
    branch: &str,
    options: &PipelineOptions,
    deadline_secs: Option<u64>,
    format: ReportFormat,
    output: Option<&Path>,
) -> Result<()> {
    let report_dir = config.report_dir.clone();
    let collaborators = Collaborators::local(&config);
    let coordinator = PipelineCoordinator::new(config, collaborators);

    let (handle, mut cancellation) = Cancellation::channel();
    if let Some(secs) = deadline_secs {
        cancellation = cancellation.with_timeout(Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            handle.cancel();
        }
    });

    let run = coordinator
        .execute(locator, branch, options, &cancellation)
        .await;
    let report = aggregate(&run);

    {
        let _span = RunSpan::enter(&report.run_id.to_string());
        match write_report_artifact(&report, &report_dir) {
            Ok(path) => info!(path = %path.display(), "report persisted"),
            Err(e) => warn!(error = %e, "failed to persist report"),
        }
    }

    let rendered = render(&report, format)?;
    println!("{rendered}");
    if let Some(path) = output {
        std::fs::write(path, &rendered)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
    }

    if report.status == PipelineStatus::Failed {
        anyhow::bail!("pipeline failed for {}@{}", locator, branch);
    }
    Ok(())
}

fn render(report: &Report, format: ReportFormat) -> Result<String> {
    Ok(match format {
        ReportFormat::Text => report.render_text(),
        ReportFormat::Markdown => report.render_markdown(),
        ReportFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize report")?
        }
    })
}

fn cmd_analyze(path: &Path, pattern: &str) -> Result<()> {
    let inventory = inspect_tree(path, pattern)
        .with_context(|| format!("Failed to inspect {:?}", path))?;

    println!("Inventory for {:?} ({} file(s) matching {})", path, inventory.len(), pattern);
    for file in &inventory {
        println!(
            "  {} (functions: {}, classes: {}, complexity: {})",
            file.file.display(),
            file.functions.len(),
            file.classes.len(),
            file.complexity
        );
    }

    let targets = select_test_targets(&inventory, None);
    println!();
    println!("Test targets ({}):", targets.len());
    for (rank, target) in targets.iter().enumerate() {
        println!(
            "  {}. {} (score {})",
            rank + 1,
            target.file.display(),
            testability_score(target)
        );
    }
    Ok(())
}

fn cmd_repair(file: &Path) -> Result<()> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read test results {:?}", file))?;
    let summary = parse_repair_input(&bytes)
        .with_context(|| format!("Unrecognised test results in {:?}", file))?;

    let payload = plan_fixes(&summary);
    println!(
        "Classified {} failure(s) into {} fix(es)",
        payload.failures_classified,
        payload.fixes.len()
    );
    for (priority, count) in count_by_priority(&payload.fixes).iter().rev() {
        println!("  {:?}: {}", priority, count);
    }
    println!();

    for fix in &payload.fixes {
        println!(
            "[{:?}/{:?}] {} ({})",
            fix.priority,
            fix.effort,
            fix.suggestion,
            fix.target_file.as_deref().unwrap_or("<unknown>")
        );
        for test in &fix.tests {
            println!("    - {}", test);
        }
    }
    Ok(())
}

/// Accept either a full [`TestRunSummary`] or a bare list of failure records.
fn parse_repair_input(bytes: &[u8]) -> Result<TestRunSummary> {
    if let Ok(summary) = serde_json::from_slice::<TestRunSummary>(bytes) {
        return Ok(summary);
    }
    let failures: Vec<FailureRecord> = serde_json::from_slice(bytes)?;
    Ok(TestRunSummary {
        failed: failures.len() as u32,
        failures,
        ..TestRunSummary::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "qa-council",
            "run",
            "https://github.com/acme/app",
            "--branch",
            "develop",
            "--dispatch",
            "--deadline-secs",
            "600",
            "--format",
            "markdown",
        ])
        .expect("parse run");

        match cli.command {
            Commands::Run {
                locator,
                branch,
                dispatch,
                deadline_secs,
                format,
                target_file,
                ..
            } => {
                assert_eq!(locator, "https://github.com/acme/app");
                assert_eq!(branch, "develop");
                assert!(dispatch);
                assert_eq!(deadline_secs, Some(600));
                assert_eq!(format, ReportFormat::Markdown);
                assert!(target_file.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["qa-council", "analyze", "src", "--json", "-v"])
            .expect("parse analyze");
        assert!(cli.json);
        assert!(cli.verbose);
        match cli.command {
            Commands::Analyze { path, pattern } => {
                assert_eq!(path, PathBuf::from("src"));
                assert_eq!(pattern, "*.py");
            }
            _ => panic!("expected analyze command"),
        }
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = Cli::try_parse_from(["qa-council", "run", "repo", "--format", "html"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_repair_input_accepts_summary() {
        let summary = TestRunSummary {
            runner: "pytest".to_string(),
            passed: 4,
            failed: 1,
            failures: vec![FailureRecord::new("test_a", "AssertionError: 1 != 2")],
            ..TestRunSummary::default()
        };
        let bytes = serde_json::to_vec(&summary).expect("serialize");

        let parsed = parse_repair_input(&bytes).expect("parse summary");
        assert_eq!(parsed, summary);
    }

    #[test]
    fn test_parse_repair_input_accepts_bare_failures() {
        let bytes = serde_json::to_vec(&json!([
            {"name": "test_a", "file": "tests/test_a.py", "message": "KeyError: 'id'"},
            {"name": "test_b", "message": "ImportError: No module named 'x'"}
        ]))
        .expect("serialize");

        let parsed = parse_repair_input(&bytes).expect("parse failures");
        assert_eq!(parsed.failed, 2);
        assert_eq!(parsed.failures[0].file.as_deref(), Some("tests/test_a.py"));
        assert_eq!(parsed.failures[1].line, None);
    }

    #[test]
    fn test_parse_repair_input_rejects_garbage() {
        assert!(parse_repair_input(b"{\"not\": \"results\"}").is_err());
    }

    #[test]
    fn test_cmd_repair_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.json");
        std::fs::write(
            &path,
            r#"[{"name": "test_a", "message": "AssertionError: boom"}]"#,
        )
        .expect("write");

        cmd_repair(&path).expect("repair");
        assert!(cmd_repair(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_cmd_analyze_on_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("app")).expect("mkdir");
        std::fs::write(
            dir.path().join("app/service.py"),
            "def handle(x):\n    if x:\n        return 1\n    return 0\n",
        )
        .expect("write");

        cmd_analyze(dir.path(), "*.py").expect("analyze");
        assert!(cmd_analyze(&dir.path().join("missing"), "*.py").is_err());
    }
}
