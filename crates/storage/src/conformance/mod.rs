//! Conformance test suite for `AssetStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `AssetStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Initialization**: asset insertion, id assignment, duplicate references
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Events**: append-only log coupled to the snapshot that wrote it
//! - **Concurrency**: racing snapshots on the same and on different assets
//! - **Error handling**: correct error variants for invalid operations
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use assetflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod error;
mod events;
mod init;
mod version;

use std::fmt;
use std::future::Future;

use assetflow_model::{AssetRecord, EventKind, WorkflowEventRecord, WorkflowState};

use crate::AssetStorage;

/// Outcome of one conformance check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Group the check belongs to: init, error, version, events or concurrent.
    pub category: &'static str,
    pub name: &'static str,
    /// `None` when the check passed.
    pub failure: Option<String>,
}

impl TestResult {
    fn from_result(category: &'static str, name: &'static str, result: Result<(), String>) -> Self {
        TestResult {
            category,
            name,
            failure: result.err(),
        }
    }

    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// All results of one suite run.
#[derive(Debug, Clone, Default)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl ConformanceReport {
    fn new(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed()).count();
        ConformanceReport {
            total: results.len(),
            failed: results.len() - passed,
            passed,
            results,
        }
    }

    /// (category, passed, total) in suite order.
    pub fn by_category(&self) -> Vec<(&'static str, usize, usize)> {
        let mut rows: Vec<(&'static str, usize, usize)> = Vec::new();
        for r in &self.results {
            let idx = match rows.iter().position(|(c, _, _)| *c == r.category) {
                Some(idx) => idx,
                None => {
                    rows.push((r.category, 0, 0));
                    rows.len() - 1
                }
            };
            rows[idx].2 += 1;
            if r.passed() {
                rows[idx].1 += 1;
            }
        }
        rows
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed())
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "storage conformance: {}/{} passed", self.passed, self.total)?;
        for (category, passed, total) in self.by_category() {
            writeln!(f, "  {category:<11} {passed}/{total}")?;
        }
        for r in self.failures() {
            let reason = r.failure.as_deref().unwrap_or_default();
            writeln!(f, "  FAIL {}::{}: {}", r.category, r.name, reason)?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: AssetStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(events::run_event_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    ConformanceReport::new(results)
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_asset(reference: &str) -> AssetRecord {
    let mut asset = AssetRecord::draft(reference, "maker", "2025-01-01T00:00:00Z");
    asset.quantity = 1;
    asset.project = Some("test-project".to_string());
    asset
}

fn make_event(asset_id: u64, from: Option<WorkflowState>, to: WorkflowState) -> WorkflowEventRecord {
    WorkflowEventRecord::pending(
        asset_id,
        EventKind::Workflow,
        from.map(|s| s.as_str()),
        to.as_str(),
        "test-actor",
        "2025-01-01T00:00:30Z",
    )
}

/// Insert and commit one asset, returning the stored record.
async fn seed_asset<S: AssetStorage>(s: &S, reference: &str) -> Result<AssetRecord, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let asset = s
        .insert_asset(&mut snap, make_asset(reference))
        .await
        .map_err(|e| format!("insert {reference}: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit insert: {e}"))?;
    Ok(asset)
}

/// Move a committed asset to `state` in its own snapshot.
async fn commit_state<S: AssetStorage>(
    s: &S,
    asset: &AssetRecord,
    state: WorkflowState,
) -> Result<i64, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut next = s
        .get_asset_for_update(&mut snap, asset.id)
        .await
        .map_err(|e| format!("read: {e}"))?;
    let from = next.workflow_state;
    next.workflow_state = state;
    let version = s
        .update_asset(&mut snap, &next, next.version)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.append_event(&mut snap, make_event(asset.id, Some(from), state))
        .await
        .map_err(|e| format!("event: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(version)
}
