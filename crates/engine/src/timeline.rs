//! Reconstruct an asset's history from its event log.

use serde::{Deserialize, Serialize};

use assetflow_model::{AssetId, EventKind, TagStatus, WorkflowEventRecord, WorkflowState};
use assetflow_storage::StorageError;

use crate::error::WorkflowError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub asset_id: AssetId,
    /// The asset's events in commit order.
    pub entries: Vec<WorkflowEventRecord>,
    pub current_state: WorkflowState,
    /// Tag status after the last tag event.
    pub tag_status: String,
    /// Times the asset entered `pending_verification`, creation included.
    pub submission_cycles: u32,
}

fn inconsistent(asset_id: AssetId, event: &WorkflowEventRecord, detail: &str) -> WorkflowError {
    WorkflowError::Storage(StorageError::Backend(format!(
        "event log for asset {asset_id} is inconsistent at seq {}: {detail}",
        event.seq
    )))
}

fn parse_state(asset_id: AssetId, event: &WorkflowEventRecord, raw: &str) -> Result<WorkflowState, WorkflowError> {
    raw.parse()
        .map_err(|e| inconsistent(asset_id, event, &format!("{e}")))
}

impl Timeline {
    /// Fold `events` (any order, other assets ignored) into a timeline.
    ///
    /// Every workflow event must start where the previous one ended and
    /// follow a valid edge; otherwise the log is reported as a storage fault.
    pub fn fold(asset_id: AssetId, events: &[WorkflowEventRecord]) -> Result<Self, WorkflowError> {
        let mut entries: Vec<WorkflowEventRecord> = events
            .iter()
            .filter(|e| e.asset_id == asset_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.seq);

        let mut current: Option<WorkflowState> = None;
        let mut tag_status = TagStatus::NeedsQr.as_str().to_string();
        let mut submission_cycles = 0;

        for event in &entries {
            match event.kind {
                EventKind::Tag => tag_status = event.to_state.clone(),
                EventKind::Workflow => {
                    let to = parse_state(asset_id, event, &event.to_state)?;
                    let from = event
                        .from_state
                        .as_deref()
                        .map(|raw| parse_state(asset_id, event, raw))
                        .transpose()?;
                    match (current, from) {
                        (None, None) if to == WorkflowState::PendingVerification => {}
                        (None, _) => {
                            return Err(inconsistent(
                                asset_id,
                                event,
                                "first event is not a creation event",
                            ))
                        }
                        (Some(_), None) => {
                            return Err(inconsistent(asset_id, event, "duplicate creation event"))
                        }
                        (Some(cur), Some(from)) if cur != from => {
                            return Err(inconsistent(
                                asset_id,
                                event,
                                &format!("starts at {from} but asset was {cur}"),
                            ))
                        }
                        (Some(cur), Some(_)) if !cur.can_transition_to(to) => {
                            return Err(inconsistent(
                                asset_id,
                                event,
                                &format!("{cur} cannot move to {to}"),
                            ))
                        }
                        _ => {}
                    }
                    if to == WorkflowState::PendingVerification {
                        submission_cycles += 1;
                    }
                    current = Some(to);
                }
            }
        }

        let current_state = current.ok_or_else(|| WorkflowError::not_found(asset_id))?;
        Ok(Timeline {
            asset_id,
            entries,
            current_state,
            tag_status,
            submission_cycles,
        })
    }
}
