//! Make → Verify → Authorize transitions.
//!
//! These functions are pure: each takes the current asset record and
//! returns the updated record plus the one event that records the change.
//! Role checks and persistence happen in [`crate::service`].

use assetflow_model::{
    AssetRecord, EventKind, RejectionStage, WorkflowEventRecord, WorkflowState,
};

use crate::error::WorkflowError;
use crate::role::{Action, Caller};

/// A validated change to one asset, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct Transitioned {
    pub asset: AssetRecord,
    pub event: WorkflowEventRecord,
}

/// Physical check results supplied at verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyInput {
    pub notes: Option<String>,
    /// Counted quantity. Negative counts are rejected as invalid input.
    pub actual_quantity: Option<i64>,
    pub actual_condition: Option<String>,
}

impl VerifyInput {
    pub fn notes(notes: &str) -> Self {
        VerifyInput {
            notes: Some(notes.to_string()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), WorkflowError> {
        match self.actual_quantity {
            Some(q) if q < 0 => Err(WorkflowError::Validation(format!(
                "actual quantity must be non-negative, got {q}"
            ))),
            _ => Ok(()),
        }
    }
}

/// How quantity discrepancies are annotated at verification.
///
/// Discrepancies never block verification; above the threshold the note
/// only gains a review marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Share of the recorded quantity, in percent, above which a
    /// difference is marked for review. `None` disables the marker.
    pub review_threshold_percent: Option<u32>,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        VerificationPolicy {
            review_threshold_percent: Some(50),
        }
    }
}

/// Difference between what was recorded at Make time and what was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub quantity: Option<(u64, u64)>,
    pub condition: Option<(Option<String>, String)>,
    pub review_suggested: bool,
}

impl Discrepancy {
    fn detect(asset: &AssetRecord, input: &VerifyInput, policy: &VerificationPolicy) -> Option<Self> {
        // recorded quantity only means something for consumables
        let quantity = input
            .actual_quantity
            .filter(|_| asset.is_consumable)
            .map(|q| q.unsigned_abs())
            .filter(|found| *found != asset.quantity)
            .map(|found| (asset.quantity, found));
        let condition = input
            .actual_condition
            .as_deref()
            .map(str::trim)
            .filter(|found| {
                !asset
                    .condition
                    .as_deref()
                    .is_some_and(|recorded| recorded.trim().eq_ignore_ascii_case(found))
            })
            .map(|found| (asset.condition.clone(), found.to_string()));

        if quantity.is_none() && condition.is_none() {
            return None;
        }

        let review_suggested = match (quantity, policy.review_threshold_percent) {
            (Some((recorded, found)), Some(threshold)) => {
                let diff = recorded.abs_diff(found);
                // diff / recorded > threshold / 100, without division
                recorded == 0 || diff.saturating_mul(100) > recorded.saturating_mul(threshold as u64)
            }
            _ => false,
        };

        Some(Discrepancy {
            quantity,
            condition,
            review_suggested,
        })
    }

    /// Structured addendum appended to the verification notes.
    pub fn addendum(&self) -> String {
        let mut lines = vec!["[discrepancy]".to_string()];
        if let Some((recorded, found)) = self.quantity {
            lines.push(format!("quantity: found {found}, recorded {recorded}"));
        }
        if let Some((recorded, found)) = &self.condition {
            let recorded = recorded.as_deref().unwrap_or("(none)");
            lines.push(format!("condition: found \"{found}\", recorded \"{recorded}\""));
        }
        if self.review_suggested {
            lines.push("review: suggested".to_string());
        }
        lines.join("\n")
    }
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Check the precondition state and build the moved record and its event.
fn advance(
    asset: &AssetRecord,
    action: Action,
    expected: &[WorkflowState],
    to: WorkflowState,
    actor: &str,
    at: &str,
) -> Result<(AssetRecord, WorkflowEventRecord), WorkflowError> {
    let from = asset.workflow_state;
    if !expected.contains(&from) || !from.can_transition_to(to) {
        return Err(WorkflowError::InvalidState {
            asset_id: asset.id,
            action,
            expected: expected
                .iter()
                .map(WorkflowState::as_str)
                .collect::<Vec<_>>()
                .join(" or "),
            actual: from.to_string(),
        });
    }
    let mut next = asset.clone();
    next.workflow_state = to;
    let event = WorkflowEventRecord::pending(
        asset.id,
        EventKind::Workflow,
        Some(from.as_str()),
        to.as_str(),
        actor,
        at,
    );
    Ok((next, event))
}

/// Record a successful physical verification.
///
/// A recount or condition that disagrees with the stored values is noted,
/// never written back: the stored quantity and condition stay as made.
pub fn verify(
    asset: &AssetRecord,
    caller: &Caller,
    input: &VerifyInput,
    policy: &VerificationPolicy,
    at: &str,
) -> Result<(Transitioned, Option<Discrepancy>), WorkflowError> {
    input.validate()?;
    let (mut next, event) = advance(
        asset,
        Action::Verify,
        &[WorkflowState::PendingVerification],
        WorkflowState::PendingAuthorization,
        &caller.actor,
        at,
    )?;

    let discrepancy = Discrepancy::detect(asset, input, policy);
    let notes = non_empty(input.notes.as_deref());
    let notes = match (&discrepancy, notes) {
        (Some(d), Some(n)) => Some(format!("{n}\n{}", d.addendum())),
        (Some(d), None) => Some(d.addendum()),
        (None, n) => n,
    };

    next.verified_by = Some(caller.actor.clone());
    next.verification_date = Some(at.to_string());
    next.verification_notes = notes.clone();

    Ok((
        Transitioned {
            asset: next,
            event: event.with_notes(notes),
        },
        discrepancy,
    ))
}

/// Reject at the given stage. The reason is mandatory.
pub fn reject(
    asset: &AssetRecord,
    caller: &Caller,
    stage: RejectionStage,
    reason: &str,
    at: &str,
) -> Result<Transitioned, WorkflowError> {
    let reason = non_empty(Some(reason))
        .ok_or_else(|| WorkflowError::Validation("a rejection reason is required".to_string()))?;
    let (mut next, event) = advance(
        asset,
        Action::for_rejection(stage),
        &[stage.pending_state()],
        stage.rejected_state(),
        &caller.actor,
        at,
    )?;
    next.rejection_reason = Some(reason.clone());
    Ok(Transitioned {
        asset: next,
        event: event.with_notes(Some(reason)),
    })
}

/// Send a rejected asset back to the start of the pipeline.
///
/// Only the rejection reason is cleared. Verification and authorization
/// fields from earlier cycles stay on the record as history.
pub fn resubmit(asset: &AssetRecord, caller: &Caller, at: &str) -> Result<Transitioned, WorkflowError> {
    let (mut next, event) = advance(
        asset,
        Action::Resubmit,
        &[
            WorkflowState::RejectedAtVerification,
            WorkflowState::RejectedAtAuthorization,
        ],
        WorkflowState::PendingVerification,
        &caller.actor,
        at,
    )?;
    next.rejection_reason = None;
    Ok(Transitioned { asset: next, event })
}

pub fn authorize(
    asset: &AssetRecord,
    caller: &Caller,
    notes: Option<&str>,
    at: &str,
) -> Result<Transitioned, WorkflowError> {
    let (mut next, event) = advance(
        asset,
        Action::Authorize,
        &[WorkflowState::PendingAuthorization],
        WorkflowState::Approved,
        &caller.actor,
        at,
    )?;
    let notes = non_empty(notes);
    next.authorized_by = Some(caller.actor.clone());
    next.authorization_date = Some(at.to_string());
    next.authorization_notes = notes.clone();
    Ok(Transitioned {
        asset: next,
        event: event.with_notes(notes),
    })
}
