//! QR tag lifecycle: Generate → Print → Apply → Verify.
//!
//! Tag steps are monotonic and idempotent. Marking a step that is already
//! marked is a successful no-op, so a bulk request can be retried after a
//! partial failure without moving any timestamp twice.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use assetflow_model::{AssetRecord, EventKind, TagRecord, WorkflowEventRecord};

use crate::error::WorkflowError;
use crate::role::Action;
use crate::workflow::Transitioned;

/// Deterministic QR payload for an asset reference.
///
/// The same reference always encodes to the same code; the hash suffix lets
/// a scanner detect a mistyped or truncated reference.
pub fn qr_code_for(reference: &str) -> String {
    let digest = Sha256::digest(reference.as_bytes());
    let check: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("ASSET:{reference}:{check}")
}

/// A timestamped step after QR generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStep {
    Print,
    Apply,
    Verify,
}

impl TagStep {
    pub fn action(&self) -> Action {
        match self {
            TagStep::Print => Action::PrintTag,
            TagStep::Apply => Action::ApplyTag,
            TagStep::Verify => Action::VerifyTag,
        }
    }

    fn is_done(&self, tag: &TagRecord) -> bool {
        match self {
            TagStep::Print => tag.printed_at.is_some(),
            TagStep::Apply => tag.applied_at.is_some(),
            TagStep::Verify => tag.tag_verified_at.is_some(),
        }
    }

    /// Whether the immediately preceding stage is already marked.
    fn is_ready(&self, tag: &TagRecord) -> bool {
        match self {
            TagStep::Print => tag.qr_code.is_some(),
            TagStep::Apply => tag.printed_at.is_some(),
            TagStep::Verify => tag.applied_at.is_some(),
        }
    }

    fn prerequisite(&self) -> &'static str {
        match self {
            TagStep::Print => "a generated QR code",
            TagStep::Apply => "a printed tag",
            TagStep::Verify => "an applied tag",
        }
    }

    fn mark(&self, tag: &mut TagRecord, at: &str) {
        let slot = match self {
            TagStep::Print => &mut tag.printed_at,
            TagStep::Apply => &mut tag.applied_at,
            TagStep::Verify => &mut tag.tag_verified_at,
        };
        *slot = Some(at.to_string());
    }
}

fn tag_event(asset: &AssetRecord, next: &TagRecord, actor: &str, at: &str) -> WorkflowEventRecord {
    WorkflowEventRecord::pending(
        asset.id,
        EventKind::Tag,
        Some(asset.tag.status().as_str()),
        next.status().as_str(),
        actor,
        at,
    )
}

/// Mark one tag step. `Ok(None)` means the step was already marked.
pub fn mark(
    asset: &AssetRecord,
    step: TagStep,
    actor: &str,
    at: &str,
) -> Result<Option<Transitioned>, WorkflowError> {
    if step.is_done(&asset.tag) {
        return Ok(None);
    }
    if !step.is_ready(&asset.tag) {
        return Err(WorkflowError::InvalidState {
            asset_id: asset.id,
            action: step.action(),
            expected: step.prerequisite().to_string(),
            actual: asset.tag.status().to_string(),
        });
    }
    let mut next = asset.clone();
    step.mark(&mut next.tag, at);
    let event = tag_event(asset, &next.tag, actor, at);
    Ok(Some(Transitioned { asset: next, event }))
}

/// Assign the asset's QR code unless it already has one.
///
/// Returns the code and, when it was newly assigned, the change to write.
/// An existing code is never replaced: tags printed from it would stop
/// matching the record.
pub fn assign_qr(asset: &AssetRecord, actor: &str, at: &str) -> (String, Option<Transitioned>) {
    if let Some(code) = &asset.tag.qr_code {
        return (code.clone(), None);
    }
    let code = qr_code_for(&asset.reference);
    let mut next = asset.clone();
    next.tag.qr_code = Some(code.clone());
    let event = tag_event(asset, &next.tag, actor, at);
    (code, Some(Transitioned { asset: next, event }))
}

/// Label size categories understood by the external QR renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrSize {
    Micro,
    Compact,
    Standard,
    Industrial,
    Materials,
    Infrastructure,
}

impl QrSize {
    pub const ALL: [QrSize; 6] = [
        QrSize::Micro,
        QrSize::Compact,
        QrSize::Standard,
        QrSize::Industrial,
        QrSize::Materials,
        QrSize::Infrastructure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QrSize::Micro => "micro",
            QrSize::Compact => "compact",
            QrSize::Standard => "standard",
            QrSize::Industrial => "industrial",
            QrSize::Materials => "materials",
            QrSize::Infrastructure => "infrastructure",
        }
    }

    /// Rendered edge length in pixels.
    pub fn pixels(&self) -> u32 {
        match self {
            QrSize::Micro => 100,
            QrSize::Compact => 150,
            QrSize::Standard => 200,
            QrSize::Materials => 250,
            QrSize::Industrial => 300,
            QrSize::Infrastructure => 400,
        }
    }
}

impl Default for QrSize {
    fn default() -> Self {
        QrSize::Standard
    }
}

impl fmt::Display for QrSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QrSize {
    type Err = WorkflowError;

    /// Accepts the current names and the legacy small/medium/large/consumable aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let legacy = match name.as_str() {
            "small" => Some(QrSize::Compact),
            "medium" => Some(QrSize::Standard),
            "large" => Some(QrSize::Industrial),
            "consumable" => Some(QrSize::Materials),
            _ => None,
        };
        legacy
            .or_else(|| QrSize::ALL.into_iter().find(|size| size.as_str() == name))
            .ok_or_else(|| WorkflowError::Validation(format!("unknown QR size '{s}'")))
    }
}

/// What the core hands to the external QR image renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrRenderRequest {
    pub reference: String,
    pub size: QrSize,
    pub pixels: u32,
}

impl QrRenderRequest {
    pub fn new(reference: &str, size: QrSize) -> Self {
        QrRenderRequest {
            reference: reference.to_string(),
            size,
            pixels: size.pixels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetflow_model::TagStatus;

    const T1: &str = "2025-01-02T00:00:00Z";
    const T2: &str = "2025-01-03T00:00:00Z";

    fn asset() -> AssetRecord {
        let mut a = AssetRecord::draft("EQ-0042", "maker", "2025-01-01T00:00:00Z");
        a.id = 42;
        a
    }

    #[test]
    fn qr_code_is_deterministic_per_reference() {
        assert_eq!(qr_code_for("EQ-0042"), qr_code_for("EQ-0042"));
        assert_ne!(qr_code_for("EQ-0042"), qr_code_for("EQ-0043"));
        let code = qr_code_for("EQ-0042");
        assert!(code.starts_with("ASSET:EQ-0042:"));
        assert_eq!(code.len(), "ASSET:EQ-0042:".len() + 8);
    }

    #[test]
    fn assign_qr_keeps_existing_code() {
        let (code, change) = assign_qr(&asset(), "wendy", T1);
        let change = change.unwrap();
        assert_eq!(change.event.from_state.as_deref(), Some("needs_qr"));
        assert_eq!(change.event.to_state, "needs_printing");

        let mut tagged = change.asset;
        tagged.tag.qr_code = Some("ASSET:LEGACY".to_string());
        let (again, none) = assign_qr(&tagged, "wendy", T2);
        assert_eq!(again, "ASSET:LEGACY");
        assert!(none.is_none());
        assert_ne!(code, again);
    }

    #[test]
    fn apply_before_print_is_invalid_state() {
        let (_, with_qr) = assign_qr(&asset(), "wendy", T1);
        let err = mark(&with_qr.unwrap().asset, TagStep::Apply, "wendy", T1).unwrap_err();
        match err {
            WorkflowError::InvalidState {
                action, actual, ..
            } => {
                assert_eq!(action, Action::ApplyTag);
                assert_eq!(actual, "needs_printing");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn print_without_qr_is_invalid_state() {
        let err = mark(&asset(), TagStep::Print, "wendy", T1).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
    }

    #[test]
    fn marking_twice_is_a_no_op() {
        let (_, with_qr) = assign_qr(&asset(), "wendy", T1);
        let printed = mark(&with_qr.unwrap().asset, TagStep::Print, "wendy", T1)
            .unwrap()
            .unwrap();
        assert_eq!(printed.asset.tag.printed_at.as_deref(), Some(T1));
        assert!(mark(&printed.asset, TagStep::Print, "wendy", T2)
            .unwrap()
            .is_none());
    }

    #[test]
    fn full_sequence_reaches_fully_tagged() {
        let (_, change) = assign_qr(&asset(), "wendy", T1);
        let mut a = change.unwrap().asset;
        for step in [TagStep::Print, TagStep::Apply, TagStep::Verify] {
            a = mark(&a, step, "wendy", T2).unwrap().unwrap().asset;
            assert!(a.tag.is_consistent());
        }
        assert_eq!(a.tag.status(), TagStatus::FullyTagged);
    }

    #[test]
    fn sizes_accept_legacy_aliases() {
        let cases = [
            ("small", QrSize::Compact),
            ("medium", QrSize::Standard),
            ("large", QrSize::Industrial),
            ("consumable", QrSize::Materials),
            ("Infrastructure", QrSize::Infrastructure),
            ("micro", QrSize::Micro),
        ];
        for (name, size) in cases {
            assert_eq!(name.parse::<QrSize>().unwrap(), size, "{name}");
        }
        assert!("huge".parse::<QrSize>().is_err());
    }

    #[test]
    fn render_request_carries_pixel_size() {
        let req = QrRenderRequest::new("EQ-0042", QrSize::Industrial);
        assert_eq!(req.pixels, 300);
        assert_eq!(QrRenderRequest::new("EQ-0042", QrSize::default()).pixels, 200);
    }
}
