//! Workflow states of the Make → Verify → Authorize pipeline.
//!
//! Valid transitions:
//! - `PendingVerification` -> `PendingAuthorization` | `RejectedAtVerification`
//! - `PendingAuthorization` -> `Approved` | `RejectedAtAuthorization`
//! - `RejectedAtVerification` -> `PendingVerification` (resubmit)
//! - `RejectedAtAuthorization` -> `PendingVerification` (resubmit)
//! - `Approved` is a terminal state
//!
//! Resubmission always re-enters at `PendingVerification`; there is no
//! direct edge back into `PendingAuthorization`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Created by a Make actor, waiting for a physical check.
    PendingVerification,
    /// Verified, waiting for an authorizer.
    PendingAuthorization,
    /// Authorized and deployed. Terminal.
    Approved,
    RejectedAtVerification,
    RejectedAtAuthorization,
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 5] = [
        WorkflowState::PendingVerification,
        WorkflowState::PendingAuthorization,
        WorkflowState::Approved,
        WorkflowState::RejectedAtVerification,
        WorkflowState::RejectedAtAuthorization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::PendingVerification => "pending_verification",
            WorkflowState::PendingAuthorization => "pending_authorization",
            WorkflowState::Approved => "approved",
            WorkflowState::RejectedAtVerification => "rejected_at_verification",
            WorkflowState::RejectedAtAuthorization => "rejected_at_authorization",
        }
    }

    /// Check whether moving from this state to `next` follows a pipeline edge.
    ///
    /// Unlike a status field, a self-transition is never valid: every
    /// accepted transition appends a workflow event, so a no-op edge would
    /// produce an event with no state change.
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        match self {
            WorkflowState::PendingVerification => matches!(
                next,
                WorkflowState::PendingAuthorization | WorkflowState::RejectedAtVerification
            ),
            WorkflowState::PendingAuthorization => matches!(
                next,
                WorkflowState::Approved | WorkflowState::RejectedAtAuthorization
            ),
            WorkflowState::RejectedAtVerification | WorkflowState::RejectedAtAuthorization => {
                next == WorkflowState::PendingVerification
            }
            WorkflowState::Approved => false, // Terminal state
        }
    }

    /// Returns the states reachable in one step from this state.
    pub fn valid_transitions(&self) -> Vec<WorkflowState> {
        match self {
            WorkflowState::PendingVerification => vec![
                WorkflowState::PendingAuthorization,
                WorkflowState::RejectedAtVerification,
            ],
            WorkflowState::PendingAuthorization => vec![
                WorkflowState::Approved,
                WorkflowState::RejectedAtAuthorization,
            ],
            WorkflowState::RejectedAtVerification | WorkflowState::RejectedAtAuthorization => {
                vec![WorkflowState::PendingVerification]
            }
            WorkflowState::Approved => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            WorkflowState::RejectedAtVerification | WorkflowState::RejectedAtAuthorization
        )
    }

    /// True once the asset has cleared the verification gate in the current cycle.
    pub fn is_past_verification(&self) -> bool {
        matches!(
            self,
            WorkflowState::PendingAuthorization
                | WorkflowState::Approved
                | WorkflowState::RejectedAtAuthorization
        )
    }

    /// True once the asset has cleared the authorization gate.
    pub fn is_past_authorization(&self) -> bool {
        *self == WorkflowState::Approved
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a state or stage name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseStateError {}

impl FromStr for WorkflowState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ParseStateError {
                kind: "workflow state",
                value: s.to_string(),
            })
    }
}

/// The decision gate at which an asset is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    Verification,
    Authorization,
}

impl RejectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionStage::Verification => "verification",
            RejectionStage::Authorization => "authorization",
        }
    }

    /// The state an asset must be in to be rejected at this stage.
    pub fn pending_state(&self) -> WorkflowState {
        match self {
            RejectionStage::Verification => WorkflowState::PendingVerification,
            RejectionStage::Authorization => WorkflowState::PendingAuthorization,
        }
    }

    /// The side-exit state a rejection at this stage leads to.
    pub fn rejected_state(&self) -> WorkflowState {
        match self {
            RejectionStage::Verification => WorkflowState::RejectedAtVerification,
            RejectionStage::Authorization => WorkflowState::RejectedAtAuthorization,
        }
    }
}

impl fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectionStage {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verification" => Ok(RejectionStage::Verification),
            "authorization" => Ok(RejectionStage::Authorization),
            other => Err(ParseStateError {
                kind: "rejection stage",
                value: other.to_string(),
            }),
        }
    }
}
