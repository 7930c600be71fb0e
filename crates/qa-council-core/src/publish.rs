//! CI-config rendering and workflow dispatch collaborators.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::collaborators::{
    CiRenderer, CollabResult, CollaboratorError, DispatchRequest, Dispatcher, TriggerConfig,
};
use crate::execution::TestRunner;

pub const WORKFLOW_FILE: &str = "qa_testing.yml";

/// Conventional location of the rendered workflow, relative to the workspace root.
pub fn workflow_path() -> PathBuf {
    PathBuf::from(".github").join("workflows").join(WORKFLOW_FILE)
}

/// Render the fixed-shape GitHub Actions workflow. Coverage flags are only
/// added to pytest commands.
pub fn render_workflow(test_command: &str, trigger: &TriggerConfig) -> String {
    let words: Vec<String> = test_command.split_whitespace().map(String::from).collect();
    let run = if TestRunner::classify(&words) == TestRunner::Pytest {
        format!("{test_command} --cov=. --cov-report=xml --cov-report=term")
    } else {
        test_command.to_string()
    };
    let branches = trigger.branches.join(", ");
    let dispatch = if trigger.manual_dispatch {
        "  workflow_dispatch:\n"
    } else {
        ""
    };
    format!(
        r#"name: Autonomous QA Testing

on:
  push:
    branches: [ {branches} ]
  pull_request:
    branches: [ {branches} ]
{dispatch}
jobs:
  test:
    runs-on: ubuntu-latest

    steps:
    - uses: actions/checkout@v4

    - name: Set up Python
      uses: actions/setup-python@v5
      with:
        python-version: '3.11'

    - name: Install dependencies
      run: |
        python -m pip install --upgrade pip
        pip install pytest pytest-cov playwright httpx
        if [ -f requirements.txt ]; then pip install -r requirements.txt; fi
        playwright install --with-deps chromium

    - name: Run tests with coverage
      run: |
        {run}
"#
    )
}

/// Writes the workflow to [`workflow_path`] under the workspace root.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRenderer;

impl WorkflowRenderer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CiRenderer for WorkflowRenderer {
    async fn render(
        &self,
        root: &Path,
        test_command: &str,
        trigger: &TriggerConfig,
    ) -> CollabResult<PathBuf> {
        if !root.is_dir() {
            return Err(CollaboratorError::NotFound(format!(
                "workspace root {} does not exist",
                root.display()
            )));
        }
        let relative = workflow_path();
        let path = root.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CollaboratorError::StorageUnwritable(format!("{}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&path, render_workflow(test_command, trigger))
            .await
            .map_err(|e| CollaboratorError::StorageUnwritable(format!("{}: {e}", path.display())))?;
        info!(path = %relative.display(), "workflow rendered");
        Ok(relative)
    }
}

/// Triggers the rendered workflow through the GitHub REST API. Never retries.
#[derive(Debug, Clone)]
pub struct GithubDispatcher {
    http_client: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl GithubDispatcher {
    pub fn new(api_base: &str, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("qa-council/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn dispatch_url(&self, request: &DispatchRequest) -> String {
        format!(
            "{}/repos/{}/{}/actions/workflows/{}/dispatches",
            self.api_base, request.owner, request.repo, WORKFLOW_FILE
        )
    }
}

/// `message` field of a GitHub error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl Dispatcher for GithubDispatcher {
    async fn dispatch(&self, request: &DispatchRequest, credential: &str) -> CollabResult<()> {
        let url = self.dispatch_url(request);
        debug!(%url, git_ref = %request.git_ref, "dispatching workflow");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(credential)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&json!({ "ref": request.git_ref }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    CollaboratorError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            info!(owner = %request.owner, repo = %request.repo, "workflow dispatch accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(status = status.as_u16(), %message, "workflow dispatch rejected");
        Err(match status.as_u16() {
            401 | 403 => CollaboratorError::Unauthorized(message),
            404 => CollaboratorError::NotFound(message),
            code => CollaboratorError::Rejected(format!("HTTP {code}: {message}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn request() -> DispatchRequest {
        DispatchRequest {
            owner: "acme".to_string(),
            repo: "app".to_string(),
            git_ref: "main".to_string(),
        }
    }

    /// Serve one canned response and return the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .and_then(|v| v.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn render_workflow_shape() {
        let trigger = TriggerConfig::new(vec!["main".into(), "develop".into()]);
        let yaml = render_workflow("pytest -q", &trigger);
        assert!(yaml.contains("branches: [ main, develop ]"));
        assert!(yaml.contains("workflow_dispatch:"));
        assert!(yaml.contains("actions/checkout@v4"));
        assert!(yaml.contains("pytest -q --cov=."));

        let manual_off = TriggerConfig {
            manual_dispatch: false,
            ..trigger
        };
        assert!(!render_workflow("pytest", &manual_off).contains("workflow_dispatch"));
        let npm = render_workflow("npm test -- --runInBand", &manual_off);
        assert!(npm.contains("npm test -- --runInBand\n"));
        assert!(!npm.contains("--cov"));
    }

    #[tokio::test]
    async fn renderer_writes_conventional_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = WorkflowRenderer::new()
            .render(dir.path(), "pytest", &TriggerConfig::new(vec!["main".into()]))
            .await
            .unwrap();
        assert_eq!(path, PathBuf::from(".github/workflows/qa_testing.yml"));
        assert!(dir.path().join(&path).is_file());
    }

    #[tokio::test]
    async fn renderer_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkflowRenderer::new()
            .render(&dir.path().join("gone"), "pytest", &TriggerConfig::new(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFound(_)));
    }

    #[tokio::test]
    async fn dispatch_accepted() {
        let (base, server) = serve_once("204 No Content", "").await;
        GithubDispatcher::new(&base, Duration::from_secs(5))
            .dispatch(&request(), "tok123")
            .await
            .unwrap();
        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /repos/acme/app/actions/workflows/qa_testing.yml/dispatches"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer tok123"));
        assert!(raw.contains(r#"{"ref":"main"}"#));
    }

    #[tokio::test]
    async fn dispatch_unauthorized() {
        let (base, _server) =
            serve_once("401 Unauthorized", r#"{"message":"Bad credentials"}"#).await;
        let err = GithubDispatcher::new(&base, Duration::from_secs(5))
            .dispatch(&request(), "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Unauthorized(ref m) if m == "Bad credentials"));
    }

    #[tokio::test]
    async fn dispatch_not_found_and_rejected() {
        let (base, _server) = serve_once("404 Not Found", r#"{"message":"Not Found"}"#).await;
        let err = GithubDispatcher::new(&base, Duration::from_secs(5))
            .dispatch(&request(), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::NotFound(_)));

        let (base, _server) = serve_once("422 Unprocessable Entity", "nope").await;
        let err = GithubDispatcher::new(&base, Duration::from_secs(5))
            .dispatch(&request(), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(ref m) if m.contains("422")));
    }

    #[tokio::test]
    async fn dispatch_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        let err = GithubDispatcher::new(&format!("http://{addr}"), Duration::from_millis(200))
            .dispatch(&request(), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn dispatch_connection_refused_is_network() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = GithubDispatcher::new(&format!("http://{addr}"), Duration::from_secs(5))
            .dispatch(&request(), "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Network(_)));
    }
}
