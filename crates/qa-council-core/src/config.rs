//! Runtime configuration.
//!
//! Defaults are overridable through environment variables; see
//! [`QaConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::{QaError, Result};
use crate::execution::AUTO_TEST_COMMAND;

/// Default wall-clock budget for the Run stage.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_DISPATCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QaConfig {
    /// Parent directory for all checkouts.
    pub workspace_dir: PathBuf,
    /// Where report artifacts are persisted.
    pub report_dir: PathBuf,
    /// Glob-like filter handed to the analyzer.
    pub file_pattern: String,
    /// Test runner command, also rendered into the CI workflow. `auto`
    /// discovers the runner in each checkout.
    pub test_command: String,
    pub run_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub dispatch_timeout_secs: u64,
    /// Upper bound on source files selected for generation.
    pub max_targets: Option<usize>,
    /// Base URL for the end-to-end smoke test; no e2e artifact when unset.
    pub e2e_base_url: Option<String>,
    pub workflow_branches: Vec<String>,
    /// Used for private clones and workflow dispatch. Never serialised.
    #[serde(skip)]
    pub github_token: Option<String>,
    pub github_api_url: String,
}

impl Default for QaConfig {
    fn default() -> Self {
        QaConfig {
            workspace_dir: PathBuf::from(".qa-council/workspaces"),
            report_dir: PathBuf::from(".qa-council/reports"),
            file_pattern: "*.py".to_string(),
            test_command: AUTO_TEST_COMMAND.to_string(),
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            dispatch_timeout_secs: DEFAULT_DISPATCH_TIMEOUT_SECS,
            max_targets: None,
            e2e_base_url: None,
            workflow_branches: vec!["main".to_string(), "develop".to_string()],
            github_token: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
        }
    }
}

impl QaConfig {
    /// Build a config from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, then validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = QaConfig::default();
        if let Some(v) = get("QA_WORKSPACE_DIR") {
            config.workspace_dir = PathBuf::from(v);
        }
        if let Some(v) = get("QA_REPORT_DIR") {
            config.report_dir = PathBuf::from(v);
        }
        if let Some(v) = get("QA_FILE_PATTERN") {
            config.file_pattern = v;
        }
        if let Some(v) = get("QA_TEST_COMMAND") {
            config.test_command = v;
        }
        if let Some(v) = get("QA_RUN_TIMEOUT_SECS") {
            config.run_timeout_secs = parse_number("QA_RUN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("QA_ACQUIRE_TIMEOUT_SECS") {
            config.acquire_timeout_secs = parse_number("QA_ACQUIRE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("QA_DISPATCH_TIMEOUT_SECS") {
            config.dispatch_timeout_secs = parse_number("QA_DISPATCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("QA_MAX_TARGETS") {
            config.max_targets = Some(parse_number("QA_MAX_TARGETS", &v)?);
        }
        config.e2e_base_url = get("QA_E2E_BASE_URL");
        if let Some(v) = get("QA_WORKFLOW_BRANCHES") {
            config.workflow_branches = v
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(String::from)
                .collect();
        }
        config.github_token = get("GITHUB_TOKEN");
        if let Some(v) = get("GITHUB_API_URL") {
            config.github_api_url = v.trim_end_matches('/').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject zero timeouts and empty required fields.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("run_timeout_secs", self.run_timeout_secs),
            ("acquire_timeout_secs", self.acquire_timeout_secs),
            ("dispatch_timeout_secs", self.dispatch_timeout_secs),
        ] {
            if value == 0 {
                return Err(QaError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.max_targets == Some(0) {
            return Err(QaError::Config(
                "max_targets must be greater than zero".to_string(),
            ));
        }
        if self.test_command.trim().is_empty() {
            return Err(QaError::Config("test_command is empty".to_string()));
        }
        if self.file_pattern.trim().is_empty() {
            return Err(QaError::Config("file_pattern is empty".to_string()));
        }
        if self.workflow_branches.is_empty() {
            return Err(QaError::Config(
                "workflow_branches must name at least one branch".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| QaError::Config(format!("{key}: '{value}' is not a valid number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = QaConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, QaConfig::default());
        assert_eq!(config.run_timeout_secs, 300);
        assert_eq!(config.workflow_branches, vec!["main", "develop"]);
        assert_eq!(config.test_command, "auto");
        assert!(config.github_token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = QaConfig::from_lookup(lookup(&[
            ("QA_RUN_TIMEOUT_SECS", "45"),
            ("QA_MAX_TARGETS", "3"),
            ("QA_WORKFLOW_BRANCHES", "main, release ,"),
            ("GITHUB_TOKEN", "ghp_secret"),
            ("GITHUB_API_URL", "http://127.0.0.1:9000/"),
            ("QA_E2E_BASE_URL", "  "),
            ("QA_TEST_COMMAND", "npm test"),
        ]))
        .unwrap();
        assert_eq!(config.run_timeout_secs, 45);
        assert_eq!(config.max_targets, Some(3));
        assert_eq!(config.workflow_branches, vec!["main", "release"]);
        assert_eq!(config.github_token.as_deref(), Some("ghp_secret"));
        assert_eq!(config.github_api_url, "http://127.0.0.1:9000");
        assert!(config.e2e_base_url.is_none());
        assert_eq!(config.test_command, "npm test");
    }

    #[test]
    fn test_rejects_invalid_numbers() {
        let err = QaConfig::from_lookup(lookup(&[("QA_RUN_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, QaError::Config(msg) if msg.contains("QA_RUN_TIMEOUT_SECS")));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = QaConfig::from_lookup(lookup(&[("QA_DISPATCH_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, QaError::Config(msg) if msg.contains("dispatch_timeout_secs")));
    }

    #[test]
    fn test_token_not_serialized() {
        let config = QaConfig {
            github_token: Some("ghp_secret".to_string()),
            ..QaConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("ghp_secret"));
    }
}
