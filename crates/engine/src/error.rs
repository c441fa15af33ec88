use serde::{Deserialize, Serialize};

use assetflow_model::AssetId;
use assetflow_storage::StorageError;

use crate::role::Action;

/// Coarse error category reported per item in batch outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    InvalidState,
    Validation,
    ConcurrentModification,
    NotFound,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Permission => "permission",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::Validation => "validation",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage",
        }
    }

    /// Whether re-issuing the same request after re-reading state can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ConcurrentModification | ErrorKind::InvalidState
        )
    }
}

/// Errors returned by workflow and tag lifecycle operations.
///
/// None of these are fatal; all are reported at the request boundary.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The caller's role lacks the capability for the requested action.
    #[error("role '{role}' is not allowed to {action}")]
    Permission { action: Action, role: String },

    /// The asset is not in a state the transition starts from.
    #[error("cannot {action} asset {asset_id}: state is {actual}, expected {expected}")]
    InvalidState {
        asset_id: AssetId,
        action: Action,
        expected: String,
        actual: String,
    },

    /// Missing or malformed input. Raised before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Another request changed the asset between read and write.
    #[error("asset {asset_id} was modified concurrently; re-read and retry")]
    ConcurrentModification { asset_id: AssetId },

    #[error("{0} not found")]
    NotFound(String),

    /// Backend fault unrelated to the request itself.
    #[error(transparent)]
    Storage(StorageError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Permission { .. } => ErrorKind::Permission,
            WorkflowError::InvalidState { .. } => ErrorKind::InvalidState,
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            WorkflowError::NotFound(_) => ErrorKind::NotFound,
            WorkflowError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(asset_id: AssetId) -> Self {
        WorkflowError::NotFound(format!("asset {asset_id}"))
    }
}

impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::ConcurrentConflict { asset_id, .. } => {
                WorkflowError::ConcurrentModification { asset_id }
            }
            StorageError::AssetNotFound { asset_id } => WorkflowError::not_found(asset_id),
            StorageError::ReferenceNotFound { reference } => {
                WorkflowError::NotFound(format!("asset reference '{reference}'"))
            }
            StorageError::DuplicateReference { reference } => {
                WorkflowError::Validation(format!("reference '{reference}' is already in use"))
            }
            other => WorkflowError::Storage(other),
        }
    }
}
