use std::future::Future;

use assetflow_model::WorkflowState;

use super::{commit_state, make_asset, make_event, seed_asset, TestResult};
use crate::{AssetStorage, StorageError};

pub(super) async fn run_event_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "events",
        "events_listed_in_sequence_order",
        events_listed_in_sequence_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "events_filtered_by_asset",
        events_filtered_by_asset(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "event_for_asset_inserted_in_same_snapshot",
        event_for_asset_inserted_in_same_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "aborted_snapshot_discards_events",
        aborted_snapshot_discards_events(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "conflicting_commit_discards_events",
        conflicting_commit_discards_events(factory).await,
    ));
    results.push(TestResult::from_result(
        "events",
        "event_for_unknown_asset_rejected",
        event_for_unknown_asset_rejected(factory).await,
    ));

    results
}

async fn events_listed_in_sequence_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    commit_state(&s, &a, WorkflowState::PendingAuthorization).await?;
    commit_state(&s, &a, WorkflowState::RejectedAtAuthorization).await?;
    commit_state(&s, &a, WorkflowState::PendingVerification).await?;

    let events = s.list_events(Some(a.id)).await.map_err(|e| e.to_string())?;
    let states: Vec<&str> = events.iter().map(|e| e.to_state.as_str()).collect();
    let expected = [
        "pending_authorization",
        "rejected_at_authorization",
        "pending_verification",
    ];
    if states != expected {
        return Err(format!("expected {:?}, got {:?}", expected, states));
    }
    if !events.windows(2).all(|w| w[0].seq < w[1].seq) {
        return Err("event sequence numbers not strictly increasing".to_string());
    }
    Ok(())
}

async fn events_filtered_by_asset<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;
    let b = seed_asset(&s, "EQ-0002").await?;
    commit_state(&s, &a, WorkflowState::PendingAuthorization).await?;
    commit_state(&s, &b, WorkflowState::RejectedAtVerification).await?;

    let for_b = s.list_events(Some(b.id)).await.map_err(|e| e.to_string())?;
    if for_b.len() != 1 || for_b[0].asset_id != b.id {
        return Err(format!("expected one event for asset {}, got {:?}", b.id, for_b));
    }
    let all = s.list_events(None).await.map_err(|e| e.to_string())?;
    if all.len() != 2 {
        return Err(format!("expected 2 events in total, got {}", all.len()));
    }
    Ok(())
}

/// The creation event is appended before the inserting snapshot commits.
async fn event_for_asset_inserted_in_same_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.append_event(
        &mut snap,
        make_event(a.id, None, WorkflowState::PendingVerification),
    )
    .await
    .map_err(|e| format!("append: {e}"))?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let events = s.list_events(Some(a.id)).await.map_err(|e| e.to_string())?;
    if events.len() != 1 || events[0].from_state.is_some() {
        return Err(format!("expected one creation event, got {:?}", events));
    }
    Ok(())
}

async fn aborted_snapshot_discards_events<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let a = seed_asset(&s, "EQ-0001").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.append_event(
        &mut snap,
        make_event(
            a.id,
            Some(WorkflowState::PendingVerification),
            WorkflowState::PendingAuthorization,
        ),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let events = s.list_events(Some(a.id)).await.map_err(|e| e.to_string())?;
    if !events.is_empty() {
        return Err(format!("expected no events after abort, got {}", events.len()));
    }
    Ok(())
}

/// A snapshot that loses the OCC race must not leak its event.
async fn conflicting_commit_discards_events<S, F, Fut>(factory: &F) -> Result<(), String>
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
    stale.workflow_state = WorkflowState::RejectedAtVerification;
    s.update_asset(&mut loser, &stale, 0)
        .await
        .map_err(|e| format!("stage: {e}"))?;
    s.append_event(
        &mut loser,
        make_event(
            a.id,
            Some(WorkflowState::PendingVerification),
            WorkflowState::RejectedAtVerification,
        ),
    )
    .await
    .map_err(|e| e.to_string())?;

    commit_state(&s, &a, WorkflowState::PendingAuthorization).await?;

    match s.commit_snapshot(loser).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
    let events = s.list_events(Some(a.id)).await.map_err(|e| e.to_string())?;
    if events.len() != 1 || events[0].to_state != "pending_authorization" {
        return Err(format!("expected only the winner's event, got {:?}", events));
    }
    Ok(())
}

async fn event_for_unknown_asset_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .append_event(
            &mut snap,
            make_event(404, None, WorkflowState::PendingVerification),
        )
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AssetNotFound { asset_id: 404 }) => Ok(()),
        other => Err(format!("expected AssetNotFound(404), got {:?}", other)),
    }
}
