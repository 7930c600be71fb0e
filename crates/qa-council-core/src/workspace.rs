//! Workspace Manager: owns checkouts keyed by `(locator, branch)`.
//!
//! Every identity has its own async lock. A pipeline run holds a
//! [`WorkspaceLease`] for its whole duration, so two runs against the same
//! identity are serialised while disjoint identities proceed in parallel.

use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::collaborators::{CollaboratorError, VcsCollaborator};
use crate::domain::{AcquisitionKind, QaError, Result, Workspace, WorkspaceId};
use crate::git::sanitize_repo_name;

/// Per-identity locks. Entries live only while a lease or waiter holds them.
type LockTable = Arc<std::sync::Mutex<HashMap<WorkspaceId, Arc<Mutex<()>>>>>;

fn lock_table(
    table: &LockTable,
) -> std::sync::MutexGuard<'_, HashMap<WorkspaceId, Arc<Mutex<()>>>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive hold on one workspace identity.
///
/// Dropping the lease releases the identity for the next waiter.
#[derive(Debug)]
pub struct WorkspaceLease {
    id: WorkspaceId,
    table: LockTable,
    _guard: OwnedMutexGuard<()>,
}

impl WorkspaceLease {
    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        let mut locks = lock_table(&self.table);
        // The table and our guard are the only holders: nobody is waiting.
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.id);
        }
    }
}

/// A workspace returned by a successful acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired {
    pub workspace: Workspace,
    /// `true` when an existing checkout was updated in place.
    pub refreshed: bool,
}

pub struct WorkspaceManager {
    root: PathBuf,
    vcs: Arc<dyn VcsCollaborator>,
    acquire_timeout: Duration,
    registry: RwLock<HashMap<WorkspaceId, Workspace>>,
    locks: LockTable,
}

impl WorkspaceManager {
    pub fn new(
        root: impl Into<PathBuf>,
        vcs: Arc<dyn VcsCollaborator>,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            vcs,
            acquire_timeout,
            registry: RwLock::new(HashMap::new()),
            locks: LockTable::default(),
        }
    }

    /// Directory under which all checkouts live.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic checkout location for `(locator, branch)`.
    pub fn checkout_path(&self, locator: &str, branch: &str) -> PathBuf {
        let id = WorkspaceId::derive(locator, branch);
        self.root
            .join(format!("{}-{}", sanitize_repo_name(locator), id.short()))
    }

    /// Wait for exclusive access to `id`.
    pub async fn lease(&self, id: &WorkspaceId) -> WorkspaceLease {
        let lock = {
            let mut locks = lock_table(&self.locks);
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        debug!(workspace = %id.short(), "workspace lease taken");
        WorkspaceLease {
            id: id.clone(),
            table: self.locks.clone(),
            _guard: guard,
        }
    }

    /// Identities with a live lease or waiter.
    pub fn lock_count(&self) -> usize {
        lock_table(&self.locks).len()
    }

    /// Clone or refresh `(locator, branch)`, taking the identity lease for the call.
    pub async fn acquire(&self, locator: &str, branch: &str) -> Result<Acquired> {
        let id = WorkspaceId::derive(locator, branch);
        let lease = self.lease(&id).await;
        self.acquire_with(&lease, locator, branch).await
    }

    /// Clone or refresh under a lease the caller already holds.
    ///
    /// Calling twice with the same pair updates the same checkout in place.
    pub async fn acquire_with(
        &self,
        lease: &WorkspaceLease,
        locator: &str,
        branch: &str,
    ) -> Result<Acquired> {
        if locator.trim().is_empty() {
            return Err(QaError::acquisition(
                AcquisitionKind::NotFound,
                "source locator is empty",
            ));
        }
        if branch.trim().is_empty() {
            return Err(QaError::acquisition(
                AcquisitionKind::NotFound,
                "branch is empty",
            ));
        }

        let id = WorkspaceId::derive(locator, branch);
        if lease.id() != &id {
            return Err(QaError::LeaseMismatch {
                held: lease.id().short().to_string(),
                requested: id.short().to_string(),
            });
        }

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            QaError::acquisition(
                AcquisitionKind::StorageUnwritable,
                format!("{}: {e}", self.root.display()),
            )
        })?;

        let dest = self.checkout_path(locator, branch);
        info!(workspace = %id.short(), dest = %dest.display(), "acquiring workspace");

        let checkout = match tokio::time::timeout(
            self.acquire_timeout,
            self.vcs.clone_or_update(locator, branch.trim(), &dest),
        )
        .await
        {
            Ok(Ok(checkout)) => checkout,
            Ok(Err(e)) => {
                warn!(workspace = %id.short(), error = %e, "acquisition failed");
                return Err(QaError::acquisition(acquisition_kind(&e), e.to_string()));
            }
            Err(_) => {
                warn!(workspace = %id.short(), "acquisition timed out");
                return Err(QaError::acquisition(
                    AcquisitionKind::Network,
                    format!(
                        "checkout timed out after {}s",
                        self.acquire_timeout.as_secs()
                    ),
                ));
            }
        };

        let workspace = Workspace {
            id: id.clone(),
            locator: locator.trim().to_string(),
            branch: branch.trim().to_string(),
            root: checkout.path,
            revision: checkout.revision,
            acquired_at: Utc::now(),
        };
        self.registry.write().await.insert(id, workspace.clone());

        Ok(Acquired {
            workspace,
            refreshed: checkout.refreshed,
        })
    }

    /// Look up a previously acquired workspace, re-checking that it still exists.
    pub async fn resolve(&self, id: &WorkspaceId) -> Result<Workspace> {
        let found = self.registry.read().await.get(id).cloned();
        match found {
            Some(ws) if ws.is_valid() => Ok(ws),
            Some(ws) => {
                warn!(
                    workspace = %id.short(),
                    root = %ws.root.display(),
                    "workspace removed externally"
                );
                self.registry.write().await.remove(id);
                Err(QaError::WorkspaceNotFound(format!(
                    "{} (checkout at {} no longer exists)",
                    id.short(),
                    ws.root.display()
                )))
            }
            None => Err(QaError::WorkspaceNotFound(id.short().to_string())),
        }
    }

    /// Number of workspaces currently registered.
    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("root", &self.root)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

/// Classify a VCS error into an acquisition kind.
fn acquisition_kind(err: &CollaboratorError) -> AcquisitionKind {
    match err {
        CollaboratorError::Auth(_) | CollaboratorError::Unauthorized(_) => AcquisitionKind::Auth,
        CollaboratorError::NotFound(_) => AcquisitionKind::NotFound,
        CollaboratorError::StorageUnwritable(_) | CollaboratorError::Io(_) => {
            AcquisitionKind::StorageUnwritable
        }
        CollaboratorError::Network(_)
        | CollaboratorError::Timeout { .. }
        | CollaboratorError::Unreadable(_)
        | CollaboratorError::Crashed(_)
        | CollaboratorError::Rejected(_) => AcquisitionKind::Network,
    }
}
