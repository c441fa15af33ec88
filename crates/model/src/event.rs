use serde::{Deserialize, Serialize};

use crate::asset::AssetId;

/// Which lifecycle an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Make / Verify / Authorize pipeline transition.
    Workflow,
    /// QR tag lifecycle step.
    Tag,
}

/// A single entry of the append-only audit log.
///
/// Records are never mutated or deleted once committed. `seq` is assigned
/// by the store on commit and is strictly increasing across all assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEventRecord {
    pub seq: u64,
    pub asset_id: AssetId,
    pub kind: EventKind,
    /// `None` for the creation event.
    pub from_state: Option<String>,
    pub to_state: String,
    pub actor: String,
    /// RFC 3339 timestamp string.
    pub at: String,
    /// Notes for approvals, the reason for rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl WorkflowEventRecord {
    /// Build an event awaiting a store-assigned sequence number.
    pub fn pending(
        asset_id: AssetId,
        kind: EventKind,
        from_state: Option<&str>,
        to_state: &str,
        actor: &str,
        at: &str,
    ) -> Self {
        WorkflowEventRecord {
            seq: 0,
            asset_id,
            kind,
            from_state: from_state.map(str::to_string),
            to_state: to_state.to_string(),
            actor: actor.to_string(),
            at: at.to_string(),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }
}
