use std::sync::Arc;
use std::time::Duration;

use qa_council_core::fakes::FakeVcs;
use qa_council_core::{AcquisitionKind, CollaboratorError, QaError, WorkspaceId, WorkspaceManager};

fn manager(root: &std::path::Path, vcs: Arc<FakeVcs>) -> WorkspaceManager {
    WorkspaceManager::new(root, vcs, Duration::from_secs(5))
}

// ── acquisition ───────────────────────────────────────────────────────────

#[tokio::test]
async fn acquire_twice_reuses_the_same_checkout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vcs = Arc::new(FakeVcs::new());
    let mgr = manager(dir.path(), vcs.clone());

    let first = mgr
        .acquire("https://github.com/acme/app", "main")
        .await
        .expect("first acquire");
    let second = mgr
        .acquire("https://github.com/acme/app.git/", "main")
        .await
        .expect("second acquire");

    assert_eq!(first.workspace.id, second.workspace.id);
    assert_eq!(first.workspace.root, second.workspace.root);
    assert!(!first.refreshed);
    assert!(second.refreshed);
    assert_eq!(mgr.len().await, 1);
    assert_eq!(vcs.calls(), 2);
}

#[tokio::test]
async fn different_branches_get_different_workspaces() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mgr = manager(dir.path(), Arc::new(FakeVcs::new()));

    let main = mgr.acquire("repo", "main").await.expect("main");
    let dev = mgr.acquire("repo", "develop").await.expect("develop");

    assert_ne!(main.workspace.id, dev.workspace.id);
    assert_ne!(main.workspace.root, dev.workspace.root);
    assert_eq!(mgr.len().await, 2);
}

#[tokio::test]
async fn empty_locator_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vcs = Arc::new(FakeVcs::new());
    let mgr = manager(dir.path(), vcs.clone());

    let err = mgr.acquire("  ", "main").await.unwrap_err();
    assert!(matches!(
        err,
        QaError::Acquisition {
            kind: AcquisitionKind::NotFound,
            ..
        }
    ));
    assert_eq!(vcs.calls(), 0);
    assert!(mgr.is_empty().await);
}

#[tokio::test]
async fn vcs_auth_failure_maps_to_auth_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vcs = Arc::new(
        FakeVcs::new().failing_with(|| CollaboratorError::Auth("bad credentials".into())),
    );
    let mgr = manager(dir.path(), vcs);

    let err = mgr.acquire("repo", "main").await.unwrap_err();
    assert!(matches!(
        err,
        QaError::Acquisition {
            kind: AcquisitionKind::Auth,
            ..
        }
    ));
    assert!(mgr.is_empty().await);
}

#[tokio::test]
async fn slow_checkout_times_out_as_network() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vcs = Arc::new(FakeVcs::new().with_delay(Duration::from_secs(2)));
    let mgr = WorkspaceManager::new(dir.path(), vcs, Duration::from_millis(50));

    let err = mgr.acquire("repo", "main").await.unwrap_err();
    assert!(matches!(
        err,
        QaError::Acquisition {
            kind: AcquisitionKind::Network,
            ..
        }
    ));
}

// ── resolution ────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_fails_after_external_removal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mgr = manager(dir.path(), Arc::new(FakeVcs::new()));

    let acquired = mgr.acquire("repo", "main").await.expect("acquire");
    let id = acquired.workspace.id.clone();
    assert!(mgr.resolve(&id).await.is_ok());

    std::fs::remove_dir_all(&acquired.workspace.root).expect("remove checkout");

    let err = mgr.resolve(&id).await.unwrap_err();
    assert!(matches!(err, QaError::WorkspaceNotFound(_)));
    assert!(mgr.is_empty().await);
}

#[tokio::test]
async fn resolve_unknown_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mgr = manager(dir.path(), Arc::new(FakeVcs::new()));
    let err = mgr
        .resolve(&WorkspaceId::derive("never", "main"))
        .await
        .unwrap_err();
    assert!(matches!(err, QaError::WorkspaceNotFound(_)));
}

// ── leases ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn same_identity_is_serialised() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vcs = Arc::new(FakeVcs::new().with_delay(Duration::from_millis(50)));
    let mgr = Arc::new(manager(dir.path(), vcs.clone()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.acquire("repo", "main").await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("acquire");
    }

    assert_eq!(vcs.calls(), 4);
    assert_eq!(vcs.max_concurrent(), 1);
}

#[tokio::test]
async fn disjoint_identities_run_in_parallel() {
    let dir = tempfile::tempdir().expect("tempdir");
    let vcs = Arc::new(FakeVcs::new().with_delay(Duration::from_millis(100)));
    let mgr = Arc::new(manager(dir.path(), vcs.clone()));

    let handles: Vec<_> = ["main", "develop", "release"]
        .into_iter()
        .map(|branch| {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.acquire("repo", branch).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("acquire");
    }

    assert!(vcs.max_concurrent() > 1);
}

#[tokio::test]
async fn lease_for_other_identity_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mgr = manager(dir.path(), Arc::new(FakeVcs::new()));

    let lease = mgr.lease(&WorkspaceId::derive("repo", "main")).await;
    let err = mgr.acquire_with(&lease, "repo", "develop").await.unwrap_err();
    assert!(matches!(err, QaError::LeaseMismatch { .. }));

    let ok = mgr.acquire_with(&lease, "repo", "main").await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn lease_release_unblocks_waiter() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mgr = Arc::new(manager(dir.path(), Arc::new(FakeVcs::new())));
    let id = WorkspaceId::derive("repo", "main");

    let held = mgr.lease(&id).await;
    let waiter = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.acquire("repo", "main").await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(held);
    let acquired = waiter.await.expect("join").expect("acquire");
    assert_eq!(acquired.workspace.id, id);
}

#[tokio::test]
async fn released_identities_leave_no_lock_behind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mgr = Arc::new(manager(dir.path(), Arc::new(FakeVcs::new())));

    for branch in ["main", "develop", "feature/x"] {
        mgr.acquire("repo", branch).await.expect("acquire");
    }
    assert_eq!(mgr.lock_count(), 0);

    let id = WorkspaceId::derive("repo", "main");
    let held = mgr.lease(&id).await;
    let waiter = {
        let mgr = mgr.clone();
        tokio::spawn(async move { mgr.acquire("repo", "main").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mgr.lock_count(), 1);

    // The waiter still holds the lock, so releasing must keep the entry.
    drop(held);
    waiter.await.expect("join").expect("acquire");
    assert_eq!(mgr.lock_count(), 0);
    assert_eq!(mgr.len().await, 3);
}
