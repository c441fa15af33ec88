//! Bulk transitions over many assets with independent per-item outcomes.
//!
//! Each id runs in its own snapshot. A failure on one asset is recorded on
//! its item and the batch moves on; nothing is rolled back across items.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use assetflow_model::{AssetId, RejectionStage};

use crate::error::{ErrorKind, WorkflowError};
use crate::role::Action;
use crate::tag::TagStep;
use crate::workflow::VerifyInput;

/// One transition applied to every asset of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Verify(VerifyInput),
    Authorize { notes: Option<String> },
    Reject { stage: RejectionStage, reason: String },
    Resubmit,
    GenerateQr,
    MarkPrinted,
    MarkApplied,
    MarkVerified,
}

impl Transition {
    /// Capability required to apply this transition.
    pub fn action(&self) -> Action {
        match self {
            Transition::Verify(_) => Action::Verify,
            Transition::Authorize { .. } => Action::Authorize,
            Transition::Reject { stage, .. } => Action::for_rejection(*stage),
            Transition::Resubmit => Action::Resubmit,
            Transition::GenerateQr => Action::GenerateQr,
            Transition::MarkPrinted => Action::PrintTag,
            Transition::MarkApplied => Action::ApplyTag,
            Transition::MarkVerified => Action::VerifyTag,
        }
    }

    pub(crate) fn tag_step(&self) -> Option<TagStep> {
        match self {
            Transition::MarkPrinted => Some(TagStep::Print),
            Transition::MarkApplied => Some(TagStep::Apply),
            Transition::MarkVerified => Some(TagStep::Verify),
            _ => None,
        }
    }

    /// Input checks that do not depend on any asset.
    pub(crate) fn validate(&self) -> Result<(), WorkflowError> {
        match self {
            Transition::Verify(input) => input.validate(),
            Transition::Reject { reason, .. } if reason.trim().is_empty() => Err(
                WorkflowError::Validation("a rejection reason is required".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Result of one asset in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub asset_id: AssetId,
    pub success: bool,
    /// False when the item succeeded as a no-op (already marked, QR already present).
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn ok(asset_id: AssetId, changed: bool) -> Self {
        ItemOutcome {
            asset_id,
            success: true,
            changed,
            error_kind: None,
            error: None,
        }
    }

    pub fn failed(asset_id: AssetId, error: &WorkflowError) -> Self {
        ItemOutcome {
            asset_id,
            success: false,
            changed: false,
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
        }
    }

    pub fn from_result(asset_id: AssetId, result: Result<bool, WorkflowError>) -> Self {
        match result {
            Ok(changed) => ItemOutcome::ok(asset_id, changed),
            Err(e) => ItemOutcome::failed(asset_id, &e),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub items: Vec<ItemOutcome>,
}

impl BatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.items.iter().all(|item| item.success)
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.success).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn item(&self, asset_id: AssetId) -> Option<&ItemOutcome> {
        self.items.iter().find(|item| item.asset_id == asset_id)
    }
}

/// Drop repeated ids, keeping the first occurrence of each.
pub fn dedup_ids(ids: &[AssetId]) -> Vec<AssetId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        assert_eq!(dedup_ids(&[5, 5, 7, 99999, 7, 5]), vec![5, 7, 99999]);
        assert!(dedup_ids(&[]).is_empty());
    }

    #[test]
    fn outcome_counts() {
        let err = WorkflowError::NotFound("asset 99999".to_string());
        let outcome = BatchOutcome {
            items: vec![
                ItemOutcome::ok(5, true),
                ItemOutcome::ok(7, false),
                ItemOutcome::failed(99999, &err),
            ],
        };
        assert!(!outcome.all_succeeded());
        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(outcome.failed(), 1);
        let missing = outcome.item(99999).unwrap();
        assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));
        assert_eq!(missing.error.as_deref(), Some("asset 99999 not found"));
    }

    #[test]
    fn empty_batch_succeeds() {
        assert!(BatchOutcome::default().all_succeeded());
    }

    #[test]
    fn successful_item_omits_error_fields() {
        let json = serde_json::to_value(ItemOutcome::ok(5, true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "asset_id": 5, "success": true, "changed": true })
        );
    }

    #[test]
    fn reject_capability_follows_stage() {
        let reject = Transition::Reject {
            stage: RejectionStage::Authorization,
            reason: "over budget".to_string(),
        };
        assert_eq!(reject.action(), Action::Authorize);
        assert_eq!(Transition::MarkApplied.action(), Action::ApplyTag);
        assert_eq!(Transition::MarkApplied.tag_step(), Some(TagStep::Apply));
        assert!(Transition::Resubmit.tag_step().is_none());
    }

    #[test]
    fn blank_reason_fails_before_any_asset_is_read() {
        let reject = Transition::Reject {
            stage: RejectionStage::Verification,
            reason: " ".to_string(),
        };
        assert!(matches!(reject.validate(), Err(WorkflowError::Validation(_))));
    }
}
