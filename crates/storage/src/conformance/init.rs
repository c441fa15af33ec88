use std::future::Future;

use assetflow_model::WorkflowState;

use super::{commit_state, make_asset, seed_asset, TestResult};
use crate::{AssetFilter, AssetStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "insert_assigns_version_0",
        insert_assigns_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_assigns_distinct_ids",
        insert_assigns_distinct_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_asset_starts_pending_verification",
        inserted_asset_starts_pending_verification(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_asset_readable_by_reference",
        inserted_asset_readable_by_reference(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_invisible_until_commit",
        insert_invisible_until_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "aborted_insert_not_visible",
        aborted_insert_not_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "duplicate_reference_rejected",
        duplicate_reference_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "duplicate_reference_in_same_snapshot_rejected",
        duplicate_reference_in_same_snapshot_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "list_assets_applies_filter",
        list_assets_applies_filter(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// After insert + commit, the asset version must be 0 regardless of the draft.
async fn insert_assigns_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut draft = make_asset("EQ-0001");
    draft.version = 41;
    let inserted = s
        .insert_asset(&mut snap, draft)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_asset(inserted.id).await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    Ok(())
}

async fn insert_assigns_distinct_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    let b = seed_asset(&s, "EQ-0002").await?;
    if a.id == b.id {
        return Err(format!("both assets got id {}", a.id));
    }
    Ok(())
}

async fn inserted_asset_starts_pending_verification<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    let rec = s.get_asset(a.id).await.map_err(|e| e.to_string())?;
    if rec.workflow_state != WorkflowState::PendingVerification {
        return Err(format!(
            "expected pending_verification, got {}",
            rec.workflow_state
        ));
    }
    if rec.tag.qr_code.is_some() {
        return Err("new asset must have an empty tag record".to_string());
    }
    Ok(())
}

async fn inserted_asset_readable_by_reference<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    let rec = s
        .find_asset_by_reference("EQ-0001")
        .await
        .map_err(|e| e.to_string())?;
    if rec.id != a.id {
        return Err(format!("expected id {}, got {}", a.id, rec.id));
    }
    Ok(())
}

/// Uncommitted inserts are invisible to reads outside the snapshot.
async fn insert_invisible_until_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let a = s
        .insert_asset(&mut snap, make_asset("EQ-0001"))
        .await
        .map_err(|e| e.to_string())?;

    match s.get_asset(a.id).await {
        Err(StorageError::AssetNotFound { .. }) => {}
        other => return Err(format!("expected AssetNotFound before commit, got {:?}", other)),
    }
    // The inserting snapshot itself sees the asset.
    s.get_asset_for_update(&mut snap, a.id)
        .await
        .map_err(|e| format!("own snapshot read: {e}"))?;

    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    s.get_asset(a.id)
        .await
        .map_err(|e| format!("after commit: {e}"))?;
    Ok(())
}

async fn aborted_insert_not_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_asset(&mut snap, make_asset("EQ-0001"))
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let all = s
        .list_assets(&AssetFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    if !all.is_empty() {
        return Err(format!("expected no assets after abort, got {}", all.len()));
    }
    // The reference is free again.
    seed_asset(&s, "EQ-0001").await?;
    Ok(())
}

async fn duplicate_reference_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_asset(&s, "EQ-0001").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.insert_asset(&mut snap, make_asset("EQ-0001")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DuplicateReference { reference }) if reference == "EQ-0001" => Ok(()),
        other => Err(format!("expected DuplicateReference, got {:?}", other)),
    }
}

async fn duplicate_reference_in_same_snapshot_rejected<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_asset(&mut snap, make_asset("EQ-0001"))
        .await
        .map_err(|e| e.to_string())?;
    let result = s.insert_asset(&mut snap, make_asset("EQ-0001")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DuplicateReference { .. }) => Ok(()),
        other => Err(format!("expected DuplicateReference, got {:?}", other)),
    }
}

async fn list_assets_applies_filter<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    seed_asset(&s, "EQ-0002").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut other = make_asset("EQ-0003");
    other.project = Some("other-project".to_string());
    s.insert_asset(&mut snap, other)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    commit_state(&s, &a, WorkflowState::PendingAuthorization).await?;

    let in_project = s
        .list_assets(&AssetFilter::project("test-project"))
        .await
        .map_err(|e| e.to_string())?;
    if in_project.len() != 2 {
        return Err(format!("expected 2 in test-project, got {}", in_project.len()));
    }
    let pending = s
        .list_assets(&AssetFilter::state(WorkflowState::PendingAuthorization))
        .await
        .map_err(|e| e.to_string())?;
    if pending.len() != 1 || pending[0].id != a.id {
        return Err(format!(
            "expected only asset {} pending authorization, got {:?}",
            a.id,
            pending.iter().map(|r| r.id).collect::<Vec<_>>()
        ));
    }
    Ok(())
}
