//! Workspace identity and record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Stable workspace key: SHA-256 hex of the normalised `(locator, branch)` pair.
///
/// The inner field is private so an id can only come from [`WorkspaceId::derive`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Derive the identity for a source locator and branch.
    pub fn derive(locator: &str, branch: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_locator(locator).as_bytes());
        hasher.update(b"\0");
        hasher.update(branch.trim().as_bytes());
        WorkspaceId(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim whitespace, trailing slashes and a `.git` suffix so equivalent URLs share an id.
pub fn normalize_locator(locator: &str) -> String {
    let trimmed = locator.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(".git")
        .unwrap_or(trimmed)
        .to_string()
}

/// A materialised checkout of `(locator, branch)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub locator: String,
    pub branch: String,
    /// Local checkout root.
    pub root: PathBuf,
    /// Current revision (commit SHA for git).
    pub revision: String,
    pub acquired_at: DateTime<Utc>,
}

impl Workspace {
    /// Whether the checkout still exists on disk.
    pub fn is_valid(&self) -> bool {
        self.root.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_id_deterministic() {
        let a = WorkspaceId::derive("https://github.com/acme/app", "main");
        let b = WorkspaceId::derive("https://github.com/acme/app", "main");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_workspace_id_normalises_locator() {
        let plain = WorkspaceId::derive("https://github.com/acme/app", "main");
        let suffixed = WorkspaceId::derive("https://github.com/acme/app.git", "main");
        let slashed = WorkspaceId::derive(" https://github.com/acme/app/ ", "main");
        assert_eq!(plain, suffixed);
        assert_eq!(plain, slashed);
    }

    #[test]
    fn test_workspace_id_branch_sensitive() {
        let main = WorkspaceId::derive("https://github.com/acme/app", "main");
        let dev = WorkspaceId::derive("https://github.com/acme/app", "develop");
        assert_ne!(main, dev);
    }

    #[test]
    fn test_workspace_validity_tracks_disk() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace {
            id: WorkspaceId::derive("repo", "main"),
            locator: "repo".to_string(),
            branch: "main".to_string(),
            root: dir.path().to_path_buf(),
            revision: "abc".to_string(),
            acquired_at: Utc::now(),
        };
        assert!(ws.is_valid());
        drop(dir);
        assert!(!ws.is_valid());
    }
}
