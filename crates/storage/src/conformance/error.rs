use std::future::Future;

use super::{make_asset, TestResult};
use crate::{AssetFilter, AssetStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_asset_nonexistent",
        get_asset_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_asset_for_update_nonexistent",
        get_asset_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_asset_nonexistent",
        update_asset_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "find_by_reference_nonexistent",
        find_by_reference_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_assets_empty",
        list_assets_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_events_empty",
        list_events_empty(factory).await,
    ));

    results
}

async fn get_asset_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_asset(99999).await {
        Err(StorageError::AssetNotFound { asset_id: 99999 }) => Ok(()),
        other => Err(format!("expected AssetNotFound(99999), got {:?}", other)),
    }
}

async fn get_asset_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_asset_for_update(&mut snap, 7).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AssetNotFound { asset_id: 7 }) => Ok(()),
        other => Err(format!("expected AssetNotFound(7), got {:?}", other)),
    }
}

async fn update_asset_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut ghost = make_asset("EQ-GHOST");
    ghost.id = 12;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.update_asset(&mut snap, &ghost, 0).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AssetNotFound { asset_id: 12 }) => Ok(()),
        other => Err(format!("expected AssetNotFound(12), got {:?}", other)),
    }
}

async fn find_by_reference_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.find_asset_by_reference("NOPE-1").await {
        Err(StorageError::ReferenceNotFound { reference }) if reference == "NOPE-1" => Ok(()),
        other => Err(format!("expected ReferenceNotFound, got {:?}", other)),
    }
}

async fn list_assets_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let all = s
        .list_assets(&AssetFilter::default())
        .await
        .map_err(|e| e.to_string())?;
    if !all.is_empty() {
        return Err(format!("expected empty list, got {}", all.len()));
    }
    Ok(())
}

async fn list_events_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let events = s.list_events(None).await.map_err(|e| e.to_string())?;
    if !events.is_empty() {
        return Err(format!("expected no events, got {}", events.len()));
    }
    Ok(())
}
