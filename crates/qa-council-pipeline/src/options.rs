//! Per-invocation pipeline options.

use qa_council_core::config::DEFAULT_RUN_TIMEOUT_SECS;
use qa_council_core::{QaConfig, TargetSelector};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Options recognised by [`crate::PipelineCoordinator::run_pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Restrict Generate to one source file.
    pub target_file: Option<PathBuf>,

    /// Restrict Run to a test path or node id.
    pub test_selector: Option<String>,

    /// Trigger the rendered workflow after Publish writes it.
    pub dispatch_enabled: bool,

    /// Wall-clock budget for the Run stage.
    pub run_timeout_secs: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            target_file: None,
            test_selector: None,
            dispatch_enabled: false,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
        }
    }
}

impl PipelineOptions {
    /// Defaults taken from a loaded config.
    pub fn from_config(config: &QaConfig) -> Self {
        Self {
            run_timeout_secs: config.run_timeout_secs,
            ..Self::default()
        }
    }

    pub fn with_target_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.target_file = Some(file.into());
        self
    }

    pub fn with_test_selector(mut self, selector: impl Into<String>) -> Self {
        self.test_selector = Some(selector.into());
        self
    }

    pub fn with_dispatch(mut self, enabled: bool) -> Self {
        self.dispatch_enabled = enabled;
        self
    }

    pub fn with_run_timeout_secs(mut self, secs: u64) -> Self {
        self.run_timeout_secs = secs;
        self
    }

    /// Generate's scope.
    pub fn target_selector(&self) -> TargetSelector {
        match &self.target_file {
            Some(file) => TargetSelector::File(file.clone()),
            None => TargetSelector::All,
        }
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
