use ctide_core::ControllerHash;
use ctide_state::{ConsentRecord, ConsentStatus};
use serde::{Deserialize, Serialize};

/// Weight of the revocation rate in the score.
pub const REVOKED_WEIGHT: f64 = 0.5;
/// Weight of the expiry rate in the score.
pub const EXPIRED_WEIGHT: f64 = 0.3;

/// Record counts per status for one controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: u64,
    pub granted: u64,
    pub revoked: u64,
    pub expired: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: ConsentStatus) {
        self.total += 1;
        match status {
            ConsentStatus::Granted => self.granted += 1,
            ConsentStatus::Revoked => self.revoked += 1,
            ConsentStatus::Expired => self.expired += 1,
        }
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ConsentRecord>) -> Self {
        let mut counts = Self::default();
        for r in records {
            counts.add(r.status);
        }
        counts
    }

    /// Share of `part` in `total`, in percent. Zero when there are no records.
    fn rate(&self, part: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            part as f64 / self.total as f64 * 100.0
        }
    }

    pub fn revoked_rate(&self) -> f64 {
        self.rate(self.revoked)
    }

    pub fn expired_rate(&self) -> f64 {
        self.rate(self.expired)
    }
}

/// Score in `[0, 100]`.
pub fn compliance_score(counts: &StatusCounts) -> f64 {
    if counts.total == 0 {
        return 100.0;
    }
    let raw = 100.0
        - REVOKED_WEIGHT * counts.revoked_rate()
        - EXPIRED_WEIGHT * counts.expired_rate();
    raw.clamp(0.0, 100.0)
}

/// Counts, rates and score for one controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceMetrics {
    pub controller_hash: ControllerHash,
    pub total_consents: u64,
    pub active_consents: u64,
    pub revoked_consents: u64,
    pub expired_consents: u64,
    pub revocation_rate: f64,
    pub expiry_rate: f64,
    pub compliance_score: f64,
    /// `compliance_score` rounded to the nearest integer, as shown in reports.
    pub compliance_score_rounded: u8,
}

impl ComplianceMetrics {
    pub fn from_counts(controller_hash: ControllerHash, counts: StatusCounts) -> Self {
        let score = compliance_score(&counts);
        Self {
            controller_hash,
            total_consents: counts.total,
            active_consents: counts.granted,
            revoked_consents: counts.revoked,
            expired_consents: counts.expired,
            revocation_rate: counts.revoked_rate(),
            expiry_rate: counts.expired_rate(),
            compliance_score: score,
            // In [0, 100] after clamping.
            compliance_score_rounded: score.round() as u8,
        }
    }
}
