//! assetflow-model: shared record types for the asset approval pipeline.
//!
//! Provides the workflow state machine edges (Make → Verify → Authorize),
//! the QR tag record with its derived status, the asset record and the
//! append-only workflow event record. The storage backend persists these
//! types as-is; the engine layers role checks and transition rules on top.

pub mod asset;
pub mod event;
pub mod tag;
pub mod workflow;

pub use asset::{AssetId, AssetRecord};
pub use event::{EventKind, WorkflowEventRecord};
pub use tag::{TagRecord, TagStatus};
pub use workflow::{ParseStateError, RejectionStage, WorkflowState};
