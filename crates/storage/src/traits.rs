use async_trait::async_trait;

use assetflow_model::{AssetId, AssetRecord, WorkflowEventRecord};

use crate::error::StorageError;
use crate::filter::AssetFilter;

/// The storage trait for assetflow record stores.
///
/// An `AssetStorage` implementation provides durable, transactional storage
/// for asset records (including their owned tag record) and the append-only
/// workflow event log.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, nothing it staged may
/// become visible.
///
/// ## OCC Conflict Detection
///
/// `update_asset` performs an optimistic concurrency check against the
/// asset's `version`: `UPDATE ... WHERE version = expected_version`. A
/// mismatch, whether detected at update time or at commit time, returns
/// `Err(StorageError::ConcurrentConflict { .. })` and nothing from the
/// snapshot is applied.
///
/// ## Event Coupling
///
/// A workflow event appended in the same snapshot as an asset update commits
/// or rolls back together with it. No state change without its event.
#[async_trait]
pub trait AssetStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Asset operations (within snapshot) ───────────────────────────────────

    /// Insert a new asset. The store assigns `id` and sets `version` to 0;
    /// the values carried in `record` for those fields are ignored.
    ///
    /// Returns `Err(StorageError::DuplicateReference)` if the reference is taken.
    async fn insert_asset(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AssetRecord,
    ) -> Result<AssetRecord, StorageError>;

    /// Read an asset as seen by this snapshot, including its own staged writes.
    ///
    /// Returns `Err(StorageError::AssetNotFound)` if the asset does not exist.
    async fn get_asset_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        asset_id: AssetId,
    ) -> Result<AssetRecord, StorageError>;

    /// Apply a version-validated update to an asset (OCC).
    ///
    /// `record.id` selects the asset. The reference code and creation fields
    /// must match the stored record (`StorageError::ImmutableField`).
    ///
    /// Returns the new version number on success.
    async fn update_asset(
        &self,
        snapshot: &mut Self::Snapshot,
        record: &AssetRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    /// Append a workflow event. The store assigns `seq` on commit.
    ///
    /// The event's asset must exist, either committed or inserted in this snapshot.
    async fn append_event(
        &self,
        snapshot: &mut Self::Snapshot,
        event: WorkflowEventRecord,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    /// Read an asset's committed state.
    async fn get_asset(&self, asset_id: AssetId) -> Result<AssetRecord, StorageError>;

    /// Look an asset up by its reference code.
    async fn find_asset_by_reference(&self, reference: &str)
        -> Result<AssetRecord, StorageError>;

    /// List committed assets matching `filter`, ordered by id.
    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>, StorageError>;

    /// List committed events in sequence order, optionally for one asset.
    async fn list_events(
        &self,
        asset_id: Option<AssetId>,
    ) -> Result<Vec<WorkflowEventRecord>, StorageError>;
}
