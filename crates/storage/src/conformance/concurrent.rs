use std::future::Future;
use std::sync::Arc;

use assetflow_model::WorkflowState;

use super::{make_asset, make_event, seed_asset, TestResult};
use crate::{AssetStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_exactly_one_wins",
        concurrent_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_inserts_same_reference_exactly_one_wins",
        concurrent_inserts_same_reference_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_assets_all_succeed",
        concurrent_updates_different_assets_all_succeed(factory).await,
    ));

    results
}

/// Stage an update from version 0 plus its event and try to commit.
///
/// `Ok(true)` if this task won, `Ok(false)` if it lost the OCC race at
/// update time or at commit time.
async fn race_update<S: AssetStorage>(
    s: Arc<S>,
    asset_id: u64,
    to: WorkflowState,
) -> Result<bool, StorageError> {
    let mut snap = s.begin_snapshot().await?;
    let mut next = s.get_asset_for_update(&mut snap, asset_id).await?;
    next.workflow_state = to;
    match s.update_asset(&mut snap, &next, 0).await {
        Ok(_) => {}
        Err(StorageError::ConcurrentConflict { .. }) => {
            s.abort_snapshot(snap).await?;
            return Ok(false);
        }
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            return Err(e);
        }
    }
    s.append_event(
        &mut snap,
        make_event(asset_id, Some(WorkflowState::PendingVerification), to),
    )
    .await?;
    match s.commit_snapshot(snap).await {
        Ok(()) => Ok(true),
        Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks each open a snapshot and attempt to move the same asset out of
/// version 0. Exactly one commit succeeds; the rest must see ConcurrentConflict,
/// and exactly one event is recorded.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let asset = seed_asset(storage.as_ref(), "EQ-0001").await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(race_update(
            s,
            asset.id,
            WorkflowState::PendingAuthorization,
        )));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let rec = storage
        .get_asset(asset.id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if rec.version != 1 {
        return Err(format!("expected version 1, got {}", rec.version));
    }
    let events = storage
        .list_events(Some(asset.id))
        .await
        .map_err(|e| format!("events: {e}"))?;
    if events.len() != 1 {
        return Err(format!("expected exactly 1 event, got {}", events.len()));
    }
    Ok(())
}

// ── Concurrent insert: exactly one wins per reference ───────────────────────

async fn concurrent_inserts_same_reference_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s.insert_asset(&mut snap, make_asset("EQ-SHARED")).await {
                Ok(_) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::DuplicateReference { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::DuplicateReference { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Concurrent updates to different assets: all succeed ─────────────────────

/// N tasks each update a different asset. All should succeed; no false
/// conflicts when there is no contention.
async fn concurrent_updates_different_assets_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut ids = Vec::new();
    for i in 0..N {
        let asset = seed_asset(storage.as_ref(), &format!("EQ-{i:04}")).await?;
        ids.push(asset.id);
    }

    let mut handles = Vec::new();
    for id in ids.iter().copied() {
        let s = storage.clone();
        handles.push(tokio::spawn(race_update(
            s,
            id,
            WorkflowState::RejectedAtVerification,
        )));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let won = handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
        if !won {
            return Err(format!("task {i} reported a false conflict"));
        }
    }

    for id in ids {
        let record = storage
            .get_asset(id)
            .await
            .map_err(|e| format!("get {id}: {e}"))?;
        if record.workflow_state != WorkflowState::RejectedAtVerification || record.version != 1 {
            return Err(format!(
                "asset {id}: expected rejected_at_verification v1, got {} v{}",
                record.workflow_state, record.version
            ));
        }
    }

    Ok(())
}
