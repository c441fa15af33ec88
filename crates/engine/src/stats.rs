use serde::{Deserialize, Serialize};

use assetflow_model::{AssetRecord, TagStatus, WorkflowState};

/// Summary counts per workflow state and per derived tag status.
///
/// Recomputed from the records on every call; nothing is cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total: usize,
    pub pending_verification: usize,
    pub pending_authorization: usize,
    pub approved: usize,
    pub rejected: usize,
    pub needs_qr: usize,
    pub needs_printing: usize,
    pub needs_application: usize,
    pub needs_verification: usize,
    pub fully_tagged: usize,
}

impl WorkflowStats {
    pub fn compute(assets: &[AssetRecord]) -> Self {
        assets.iter().fold(WorkflowStats::default(), |mut stats, asset| {
            stats.total += 1;
            match asset.workflow_state {
                WorkflowState::PendingVerification => stats.pending_verification += 1,
                WorkflowState::PendingAuthorization => stats.pending_authorization += 1,
                WorkflowState::Approved => stats.approved += 1,
                WorkflowState::RejectedAtVerification | WorkflowState::RejectedAtAuthorization => {
                    stats.rejected += 1
                }
            }
            match asset.tag.status() {
                TagStatus::NeedsQr => stats.needs_qr += 1,
                TagStatus::NeedsPrinting => stats.needs_printing += 1,
                TagStatus::NeedsApplication => stats.needs_application += 1,
                TagStatus::NeedsTagVerification => stats.needs_verification += 1,
                TagStatus::FullyTagged => stats.fully_tagged += 1,
            }
            stats
        })
    }
}
