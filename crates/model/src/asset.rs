use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tag::TagRecord;
use crate::workflow::WorkflowState;

/// Store-assigned numeric asset identifier.
pub type AssetId = u64;

/// A tracked physical asset as held in the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: AssetId,
    /// Immutable, unique, human-scannable reference code.
    pub reference: String,
    pub workflow_state: WorkflowState,
    #[serde(default)]
    pub is_consumable: bool,
    #[serde(default)]
    pub is_client_supplied: bool,
    /// Recorded quantity. Only meaningful for consumables.
    #[serde(default)]
    pub quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_cost: Option<Decimal>,
    /// Project scope used to filter dashboard counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub created_by: String,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    pub verified_by: Option<String>,
    pub verification_date: Option<String>,
    pub verification_notes: Option<String>,
    pub authorized_by: Option<String>,
    pub authorization_date: Option<String>,
    pub authorization_notes: Option<String>,
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub tag: TagRecord,
    /// Optimistic concurrency counter, incremented on every committed update.
    pub version: i64,
}

impl AssetRecord {
    /// A freshly made asset at `PendingVerification` with an empty tag record.
    ///
    /// `id` and `version` are placeholders until the store assigns them.
    pub fn draft(reference: &str, created_by: &str, created_at: &str) -> Self {
        AssetRecord {
            id: 0,
            reference: reference.to_string(),
            workflow_state: WorkflowState::PendingVerification,
            is_consumable: false,
            is_client_supplied: false,
            quantity: 0,
            condition: None,
            acquisition_cost: None,
            project: None,
            created_by: created_by.to_string(),
            created_at: created_at.to_string(),
            verified_by: None,
            verification_date: None,
            verification_notes: None,
            authorized_by: None,
            authorization_date: None,
            authorization_notes: None,
            rejection_reason: None,
            tag: TagRecord::default(),
            version: 0,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified_by.is_some() && self.verification_date.is_some()
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized_by.is_some() && self.authorization_date.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_starts_pending_with_empty_tag() {
        let a = AssetRecord::draft("EQ-0001", "maker", "2025-01-01T00:00:00Z");
        assert_eq!(a.workflow_state, WorkflowState::PendingVerification);
        assert_eq!(a.tag, TagRecord::default());
        assert!(!a.is_verified());
        assert!(!a.is_authorized());
        assert!(a.rejection_reason.is_none());
    }

    #[test]
    fn cost_serializes_as_string() {
        let mut a = AssetRecord::draft("EQ-0002", "maker", "2025-01-01T00:00:00Z");
        a.acquisition_cost = Some(Decimal::new(125050, 2));
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["acquisition_cost"], "1250.50");
        let back: AssetRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.acquisition_cost, Some(Decimal::new(125050, 2)));
    }
}
