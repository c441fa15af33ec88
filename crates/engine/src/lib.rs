//! assetflow engine: role-gated asset approval and QR tag lifecycle.
//!
//! Two independent state machines share one asset record:
//!
//! - the Make → Verify → Authorize pipeline ([`workflow`]), with rejection
//!   side-exits that re-enter at `pending_verification`;
//! - the QR tag lifecycle ([`tag`]), Generate → Print → Apply → Verify,
//!   whose status is always derived from the tag record's fields.
//!
//! Every transition is authorized by the [`RoleGate`] capability table,
//! applied inside one store snapshot with an optimistic version check, and
//! recorded as exactly one append-only workflow event. [`AssetService`]
//! ties these together over any [`assetflow_storage::AssetStorage`].

pub mod batch;
pub mod clock;
pub mod error;
pub mod role;
pub mod service;
pub mod stats;
pub mod tag;
pub mod timeline;
pub mod workflow;

pub use batch::{dedup_ids, BatchOutcome, ItemOutcome, Transition};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ErrorKind, WorkflowError};
pub use role::{Action, Caller, RoleGate};
pub use service::{AssetService, NewAsset};
pub use stats::WorkflowStats;
pub use tag::{qr_code_for, QrRenderRequest, QrSize, TagStep};
pub use timeline::Timeline;
pub use workflow::{VerificationPolicy, VerifyInput};
