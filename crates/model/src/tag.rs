//! QR tag record and its derived lifecycle status.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical labeling state of an asset, owned 1:1 by the asset.
///
/// Fields only ever move from `None` to `Some`. `applied_at` requires
/// `printed_at`, and `tag_verified_at` requires `applied_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub qr_code: Option<String>,
    /// RFC 3339 timestamp string.
    pub printed_at: Option<String>,
    /// RFC 3339 timestamp string.
    pub applied_at: Option<String>,
    /// RFC 3339 timestamp string.
    pub tag_verified_at: Option<String>,
}

impl TagRecord {
    /// Derive the tag status from the four fields.
    ///
    /// Checked in priority order; the status is never stored.
    pub fn status(&self) -> TagStatus {
        if self.qr_code.is_some()
            && self.printed_at.is_some()
            && self.applied_at.is_some()
            && self.tag_verified_at.is_some()
        {
            TagStatus::FullyTagged
        } else if self.applied_at.is_some() && self.tag_verified_at.is_none() {
            TagStatus::NeedsTagVerification
        } else if self.printed_at.is_some() && self.applied_at.is_none() {
            TagStatus::NeedsApplication
        } else if self.qr_code.is_some() && self.printed_at.is_none() {
            TagStatus::NeedsPrinting
        } else {
            TagStatus::NeedsQr
        }
    }

    /// Whether the ordering constraints between the timestamps hold.
    pub fn is_consistent(&self) -> bool {
        (self.printed_at.is_none() || self.qr_code.is_some())
            && (self.applied_at.is_none() || self.printed_at.is_some())
            && (self.tag_verified_at.is_none() || self.applied_at.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagStatus {
    NeedsQr,
    NeedsPrinting,
    NeedsApplication,
    NeedsTagVerification,
    FullyTagged,
}

impl TagStatus {
    pub const ALL: [TagStatus; 5] = [
        TagStatus::NeedsQr,
        TagStatus::NeedsPrinting,
        TagStatus::NeedsApplication,
        TagStatus::NeedsTagVerification,
        TagStatus::FullyTagged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TagStatus::NeedsQr => "needs_qr",
            TagStatus::NeedsPrinting => "needs_printing",
            TagStatus::NeedsApplication => "needs_application",
            TagStatus::NeedsTagVerification => "needs_tag_verification",
            TagStatus::FullyTagged => "fully_tagged",
        }
    }
}

impl fmt::Display for TagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(qr: bool, printed: bool, applied: bool, verified: bool) -> TagRecord {
        let ts = || Some("2025-01-01T00:00:00Z".to_string());
        TagRecord {
            qr_code: qr.then(|| "ASSET:A-1:00000000".to_string()),
            printed_at: if printed { ts() } else { None },
            applied_at: if applied { ts() } else { None },
            tag_verified_at: if verified { ts() } else { None },
        }
    }

    #[test]
    fn status_follows_derivation_table() {
        // (qr, printed, applied, verified) -> status, for every consistent record.
        let table = [
            ((false, false, false, false), TagStatus::NeedsQr),
            ((true, false, false, false), TagStatus::NeedsPrinting),
            ((true, true, false, false), TagStatus::NeedsApplication),
            ((true, true, true, false), TagStatus::NeedsTagVerification),
            ((true, true, true, true), TagStatus::FullyTagged),
        ];
        for ((q, p, a, v), expected) in table {
            let record = tag(q, p, a, v);
            assert!(record.is_consistent());
            assert_eq!(record.status(), expected, "for {:?}", (q, p, a, v));
        }
    }

    #[test]
    fn status_is_total_over_all_field_combinations() {
        for bits in 0u8..16 {
            let record = tag(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0);
            let status = record.status();
            if record.is_consistent() {
                let marked = [
                    record.qr_code.is_some(),
                    record.printed_at.is_some(),
                    record.applied_at.is_some(),
                    record.tag_verified_at.is_some(),
                ]
                .iter()
                .filter(|b| **b)
                .count();
                assert_eq!(TagStatus::ALL[marked], status);
            }
        }
    }

    #[test]
    fn consistency_rejects_skipped_stages() {
        assert!(!tag(true, false, true, false).is_consistent());
        assert!(!tag(true, true, false, true).is_consistent());
        assert!(!tag(false, true, false, false).is_consistent());
    }

    #[test]
    fn empty_record_needs_qr() {
        assert_eq!(TagRecord::default().status(), TagStatus::NeedsQr);
    }
}
