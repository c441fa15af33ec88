use std::future::Future;

use assetflow_model::WorkflowState;

use super::{commit_state, seed_asset, TestResult};
use crate::{AssetStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "update_increments_version",
        update_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_with_wrong_version_returns_conflict",
        update_with_wrong_version_returns_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_version_after_intervening_commit",
        stale_version_after_intervening_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_detected_at_commit",
        conflict_detected_at_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_does_not_change_state",
        conflict_does_not_change_state(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "second_update_same_snapshot_uses_new_version",
        second_update_same_snapshot_uses_new_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_rejects_reference_change",
        update_rejects_reference_change(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "version_per_asset_independent",
        version_per_asset_independent(factory).await,
    ));

    results
}

async fn update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    let v = commit_state(&s, &a, WorkflowState::PendingAuthorization).await?;
    if v != 1 {
        return Err(format!("update returned version {v}, expected 1"));
    }
    let rec = s.get_asset(a.id).await.map_err(|e| e.to_string())?;
    if rec.version != 1 {
        return Err(format!("stored version {}, expected 1", rec.version));
    }
    let v = commit_state(&s, &a, WorkflowState::Approved).await?;
    if v != 2 {
        return Err(format!("second update returned version {v}, expected 2"));
    }
    Ok(())
}

async fn update_with_wrong_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut next = s
        .get_asset_for_update(&mut snap, a.id)
        .await
        .map_err(|e| e.to_string())?;
    next.workflow_state = WorkflowState::PendingAuthorization;
    let result = s.update_asset(&mut snap, &next, 5).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            asset_id,
            expected_version: 5,
        }) if asset_id == a.id => Ok(()),
        other => Err(format!("expected ConcurrentConflict(v5), got {:?}", other)),
    }
}

/// Two snapshots read version 0; the first commits; the second's update
/// must see the conflict.
async fn stale_version_after_intervening_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;

    let mut loser = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut stale = s
        .get_asset_for_update(&mut loser, a.id)
        .await
        .map_err(|e| e.to_string())?;

    commit_state(&s, &a, WorkflowState::PendingAuthorization).await?;

    stale.workflow_state = WorkflowState::RejectedAtVerification;
    let update = s.update_asset(&mut loser, &stale, stale.version).await;
    let outcome = match update {
        Ok(_) => s.commit_snapshot(loser).await,
        Err(e) => {
            let _ = s.abort_snapshot(loser).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
}

/// Both snapshots stage their update before either commits. The second
/// commit must fail as a whole.
async fn conflict_detected_at_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;

    let mut first = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut second = s.begin_snapshot().await.map_err(|e| e.to_string())?;

    let mut r1 = s
        .get_asset_for_update(&mut first, a.id)
        .await
        .map_err(|e| e.to_string())?;
    let mut r2 = s
        .get_asset_for_update(&mut second, a.id)
        .await
        .map_err(|e| e.to_string())?;
    r1.workflow_state = WorkflowState::PendingAuthorization;
    r2.workflow_state = WorkflowState::RejectedAtVerification;

    let staged_second = s.update_asset(&mut second, &r2, 0).await;
    s.update_asset(&mut first, &r1, 0)
        .await
        .map_err(|e| format!("first update: {e}"))?;
    s.commit_snapshot(first)
        .await
        .map_err(|e| format!("first commit: {e}"))?;

    let outcome = match staged_second {
        Ok(_) => s.commit_snapshot(second).await,
        Err(e) => {
            let _ = s.abort_snapshot(second).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }

    let rec = s.get_asset(a.id).await.map_err(|e| e.to_string())?;
    if rec.workflow_state != WorkflowState::PendingAuthorization {
        return Err(format!("winner's state lost: {}", rec.workflow_state));
    }
    Ok(())
}

async fn conflict_does_not_change_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut next = a.clone();
    next.workflow_state = WorkflowState::Approved;
    let _ = s.update_asset(&mut snap, &next, 3).await;
    let _ = s.abort_snapshot(snap).await;

    let rec = s.get_asset(a.id).await.map_err(|e| e.to_string())?;
    if rec.workflow_state != WorkflowState::PendingVerification || rec.version != 0 {
        return Err(format!(
            "expected pending_verification v0, got {} v{}",
            rec.workflow_state, rec.version
        ));
    }
    Ok(())
}

async fn second_update_same_snapshot_uses_new_version<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut next = a.clone();
    next.workflow_state = WorkflowState::PendingAuthorization;
    let v1 = s
        .update_asset(&mut snap, &next, 0)
        .await
        .map_err(|e| format!("first: {e}"))?;
    let mut after = s
        .get_asset_for_update(&mut snap, a.id)
        .await
        .map_err(|e| e.to_string())?;
    if after.version != v1 {
        return Err(format!(
            "snapshot read version {}, expected {v1}",
            after.version
        ));
    }
    after.workflow_state = WorkflowState::Approved;
    let v2 = s
        .update_asset(&mut snap, &after, v1)
        .await
        .map_err(|e| format!("second: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_asset(a.id).await.map_err(|e| e.to_string())?;
    if rec.version != v2 || v2 != 2 {
        return Err(format!("expected version 2, got {} (returned {v2})", rec.version));
    }
    Ok(())
}

async fn update_rejects_reference_change<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut next = a.clone();
    next.reference = "EQ-9999".to_string();
    let result = s.update_asset(&mut snap, &next, 0).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ImmutableField {
            field: "reference", ..
        }) => Ok(()),
        other => Err(format!("expected ImmutableField(reference), got {:?}", other)),
    }
}

async fn version_per_asset_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    let b = seed_asset(&s, "EQ-0002").await?;
    commit_state(&s, &a, WorkflowState::PendingAuthorization).await?;
    commit_state(&s, &a, WorkflowState::Approved).await?;

    let rec = s.get_asset(b.id).await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("untouched asset at version {}", rec.version));
    }
    Ok(())
}
