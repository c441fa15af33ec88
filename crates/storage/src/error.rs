use assetflow_model::AssetId;

/// All errors that can be returned by an AssetStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another snapshot committed a
    /// change to the asset after it was read. The expected version was not found.
    #[error("concurrent conflict on asset {asset_id}: expected version {expected_version}")]
    ConcurrentConflict {
        asset_id: AssetId,
        expected_version: i64,
    },

    /// No asset with the given id.
    #[error("asset not found: {asset_id}")]
    AssetNotFound { asset_id: AssetId },

    /// No asset with the given reference code.
    #[error("asset reference not found: {reference}")]
    ReferenceNotFound { reference: String },

    /// Another asset already carries this reference code.
    #[error("duplicate asset reference: {reference}")]
    DuplicateReference { reference: String },

    /// An update tried to change a field that is fixed at creation.
    #[error("asset {asset_id}: field '{field}' is immutable")]
    ImmutableField {
        asset_id: AssetId,
        field: &'static str,
    },

    /// A backend-specific storage error (I/O, serialization, poisoned lock, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
