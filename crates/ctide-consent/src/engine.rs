//! # Consent Engine
//!
//! Orchestrates the consent lifecycle over a [`ConsentStore`], a
//! [`LedgerClient`] and an [`AuditSink`].
//!
//! ## Ordering
//!
//! A grant is persisted before it is anchored. If anchoring fails, times out
//! or the future is dropped, the record stays `Granted` with an empty
//! `ledger_tx_ref`, and [`ConsentEngine::unanchored_consents`] reports it.
//! Revocations work the same way with `status_tx_ref`. Neither change is
//! rolled back for a ledger failure.
//!
//! ## Expiry
//!
//! Expiry is lazy: `verify`, `revoke` and a re-`grant` observe a passed
//! deadline and apply `Granted → Expired` before doing anything else.
//! [`ConsentEngine::spawn_expiry_sweeper`] applies the same transition on a
//! timer for records nobody looks at.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ctide_compliance::ComplianceMetrics;
use ctide_core::{
    derive, Clock, ConsentId, ControllerHash, PurposeHash, SystemClock, Timestamp, UserRef,
};
use ctide_crypto::{self_consistency_proof, verify_proof, MerkleProof, ProofSource};
use ctide_ledger::{AnchoringReceipt, LedgerClient, LedgerError, LedgerMode, NetworkStatus};
use ctide_state::{ConsentRecord, ConsentStatus, LawfulBasis, NewConsent};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::audit::{self, AuditAction, AuditEntry, AuditSink};
use crate::error::{validation, ConsentError, StoreError};
use crate::store::{ConsentStore, ConsentUpdate};

/// Number of consents listed in a compliance report.
pub const REPORT_RECENT_LIMIT: usize = 25;

/// Re-derivations tried when a new grant's id is already taken.
const MAX_ID_ATTEMPTS: usize = 64;

/// Reason recorded on a subject-initiated revocation.
pub const REVOKE_REASON_USER_REQUEST: &str = "user_request";

/// Input for [`ConsentEngine::grant`].
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub user_ref: UserRef,
    /// Raw controller identifier. Hashed before storage.
    pub controller_id: String,
    /// Raw purpose string. Hashed before storage.
    pub purpose: String,
    pub data_categories: Vec<String>,
    pub lawful_basis: LawfulBasis,
    pub expires_at: Option<Timestamp>,
}

/// Whether the ledger confirmed a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnchoringOutcome {
    /// Confirmed by the ledger; the transaction hash is stored on the record.
    Anchored { receipt: AnchoringReceipt },
    /// Pseudo-receipt from a degraded client. Not stored as a ledger
    /// reference, so the record stays in the unanchored list.
    Local { receipt: AnchoringReceipt },
    /// The change is persisted but has no ledger transaction yet.
    Unanchored { error: String },
}

impl AnchoringOutcome {
    pub fn receipt(&self) -> Option<&AnchoringReceipt> {
        match self {
            Self::Anchored { receipt } | Self::Local { receipt } => Some(receipt),
            Self::Unanchored { .. } => None,
        }
    }

    /// Whether the ledger itself confirmed the change.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Anchored { .. })
    }
}

/// Result of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutcome {
    pub consent_id: ConsentId,
    pub status: ConsentStatus,
    pub ledger_tx_ref: Option<String>,
    pub granted_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub anchoring: AnchoringOutcome,
    pub ledger_mode: LedgerMode,
}

/// Result of a revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeOutcome {
    pub consent_id: ConsentId,
    pub status: ConsentStatus,
    pub revoked_at: Timestamp,
    pub ledger_tx_ref: Option<String>,
    pub anchoring: AnchoringOutcome,
    pub ledger_mode: LedgerMode,
}

/// How much a `Valid` verification is backed by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Ledger-attested inclusion proof.
    Full,
    /// Self-consistency proof only, or the proof fetch failed.
    Reduced,
}

/// Why a verification came back invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    Revoked,
    Expired,
}

/// Attestation returned for a valid consent. Hashes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidConsent {
    pub consent_id: ConsentId,
    pub controller_hash: ControllerHash,
    pub purpose_hash: PurposeHash,
    pub lawful_basis: LawfulBasis,
    pub data_categories: Vec<String>,
    pub granted_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub ledger_tx_ref: Option<String>,
    pub proof: MerkleProof,
    pub confidence: Confidence,
    pub verified_at: Timestamp,
}

/// Outcome of [`ConsentEngine::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verification {
    Valid(ValidConsent),
    Invalid {
        reason: InvalidReason,
        consent_id: Option<ConsentId>,
    },
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn invalid_reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid { reason, .. } => Some(*reason),
        }
    }
}

/// One line of a compliance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentSummary {
    pub consent_id: ConsentId,
    pub purpose_hash: PurposeHash,
    pub lawful_basis: LawfulBasis,
    pub status: ConsentStatus,
    pub granted_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
    pub anchored: bool,
}

impl From<&ConsentRecord> for ConsentSummary {
    fn from(r: &ConsentRecord) -> Self {
        Self {
            consent_id: r.consent_id.clone(),
            purpose_hash: r.purpose_hash.clone(),
            lawful_basis: r.lawful_basis,
            status: r.status,
            granted_at: r.granted_at,
            expires_at: r.expires_at,
            revoked_at: r.revoked_at,
            anchored: r.is_anchored(),
        }
    }
}

/// Compliance report for one controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub metrics: ComplianceMetrics,
    pub recent_consents: Vec<ConsentSummary>,
    /// Records of this controller still waiting for a ledger transaction.
    pub unanchored_count: usize,
    pub network: NetworkStatus,
    pub generated_at: Timestamp,
}

/// The consent lifecycle service.
pub struct ConsentEngine {
    store: Arc<dyn ConsentStore>,
    ledger: Arc<LedgerClient>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    anchor_timeout: Option<Duration>,
}

impl std::fmt::Debug for ConsentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentEngine")
            .field("ledger", &self.ledger)
            .field("anchor_timeout", &self.anchor_timeout)
            .finish_non_exhaustive()
    }
}

impl ConsentEngine {
    pub fn new(
        store: Arc<dyn ConsentStore>,
        ledger: Arc<LedgerClient>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            ledger,
            audit,
            clock: Arc::new(SystemClock),
            anchor_timeout: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Overall bound on one anchoring or proof call, on top of the ledger
    /// client's per-request timeouts.
    pub fn with_anchor_timeout(mut self, timeout: Duration) -> Self {
        self.anchor_timeout = Some(timeout);
        self
    }

    pub fn ledger(&self) -> &LedgerClient {
        &self.ledger
    }

    // ── grant ────────────────────────────────────────────────────────

    /// Record a new consent and anchor it.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `DuplicateActiveConsent` when the tuple
    /// already has an active consent, `Store` for persistence failures.
    /// Ledger failures are not errors; they show up in `anchoring`.
    pub async fn grant(&self, req: GrantRequest) -> Result<GrantOutcome, ConsentError> {
        let now = self.clock.now();
        validate_grant(&req, now)?;

        let controller_hash = derive::controller_hash(&req.controller_id);
        let purpose_hash = derive::purpose_hash(&req.purpose);

        if let Some(existing) =
            self.store
                .find_by_tuple(&req.user_ref, &controller_hash, &purpose_hash)?
        {
            self.expire_if_due(existing, now)?;
        }

        let record = ConsentRecord::granted(NewConsent {
            consent_id: derive::consent_id(&req.user_ref, &req.controller_id, &req.purpose, now),
            user_ref: req.user_ref,
            controller_hash,
            purpose_hash,
            data_categories: req.data_categories,
            lawful_basis: req.lawful_basis,
            granted_at: now,
            expires_at: req.expires_at,
        });
        let record = self.insert_grant(record, &req.controller_id, &req.purpose)?;
        tracing::info!(consent_id = %record.consent_id, "consent granted");

        let anchoring = self
            .bounded(self.ledger.anchor_consent(&record))
            .await;
        let (record, anchoring) =
            self.persist_anchor(record, anchoring, |tx_ref| ConsentUpdate::Anchor { tx_ref });

        audit::record(
            &*self.audit,
            AuditEntry::new(AuditAction::ConsentGranted, &record, now).with_details(
                serde_json::json!({ "dataCategories": record.data_categories }),
            ),
        );

        Ok(GrantOutcome {
            consent_id: record.consent_id,
            status: record.status,
            ledger_tx_ref: record.ledger_tx_ref,
            granted_at: record.granted_at,
            expires_at: record.expires_at,
            anchoring,
            ledger_mode: self.ledger.mode(),
        })
    }

    // ── verify ───────────────────────────────────────────────────────

    /// Check whether a consent is currently valid and attach a proof.
    pub async fn verify(
        &self,
        user_ref: &UserRef,
        controller_id: &str,
        purpose: &str,
    ) -> Result<Verification, ConsentError> {
        let now = self.clock.now();
        let controller_hash = derive::controller_hash(controller_id);
        let purpose_hash = derive::purpose_hash(purpose);

        let Some(record) = self
            .store
            .find_by_tuple(user_ref, &controller_hash, &purpose_hash)?
        else {
            return Ok(Verification::Invalid {
                reason: InvalidReason::NotFound,
                consent_id: None,
            });
        };
        let record = self.expire_if_due(record, now)?;

        let reason = match record.status {
            ConsentStatus::Granted => None,
            ConsentStatus::Revoked => Some(InvalidReason::Revoked),
            ConsentStatus::Expired => Some(InvalidReason::Expired),
        };
        if let Some(reason) = reason {
            return Ok(Verification::Invalid {
                reason,
                consent_id: Some(record.consent_id),
            });
        }

        let (proof, confidence) = self.proof_for(&record.consent_id).await;
        audit::record(
            &*self.audit,
            AuditEntry::new(AuditAction::ConsentVerified, &record, now)
                .with_details(serde_json::json!({ "confidence": confidence })),
        );
        tracing::debug!(consent_id = %record.consent_id, ?confidence, "consent verified");

        Ok(Verification::Valid(ValidConsent {
            consent_id: record.consent_id,
            controller_hash: record.controller_hash,
            purpose_hash: record.purpose_hash,
            lawful_basis: record.lawful_basis,
            data_categories: record.data_categories,
            granted_at: record.granted_at,
            expires_at: record.expires_at,
            ledger_tx_ref: record.ledger_tx_ref,
            proof,
            confidence,
            verified_at: now,
        }))
    }

    async fn proof_for(&self, consent_id: &ConsentId) -> (MerkleProof, Confidence) {
        match self.bounded(self.ledger.get_merkle_proof(consent_id)).await {
            Ok(proof) => {
                let confidence = if proof.source == ProofSource::LedgerAttested
                    && verify_proof(&proof)
                {
                    Confidence::Full
                } else {
                    Confidence::Reduced
                };
                (proof, confidence)
            }
            Err(e) => {
                tracing::warn!(
                    consent_id = %consent_id,
                    error = %e,
                    "ledger proof unavailable, using self-consistency proof"
                );
                let depth = self.ledger.config().merkle_depth;
                (self_consistency_proof(consent_id, depth), Confidence::Reduced)
            }
        }
    }

    /// Insert a new grant. A re-grant in the same millisecond as an earlier
    /// record of the tuple derives the same id; the id is then re-derived
    /// from the next free millisecond while `granted_at` stays unchanged.
    fn insert_grant(
        &self,
        mut record: ConsentRecord,
        controller_id: &str,
        purpose: &str,
    ) -> Result<ConsentRecord, ConsentError> {
        let mut id_at = record.granted_at;
        for _ in 0..MAX_ID_ATTEMPTS {
            match self.store.insert_if_absent(record.clone()) {
                Ok(()) => return Ok(record),
                Err(StoreError::IdTaken(taken)) => {
                    tracing::debug!(consent_id = %taken, "consent id taken, deriving next");
                    id_at = id_at.plus_millis(1);
                    record.consent_id =
                        derive::consent_id(&record.user_ref, controller_id, purpose, id_at);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ConsentError::Store(StoreError::Backend(
            "no free consent id for grant".into(),
        )))
    }

    // ── revoke ───────────────────────────────────────────────────────

    /// Revoke a consent on behalf of its subject.
    ///
    /// # Errors
    ///
    /// `NotFound`, `AccessDenied` when `user_ref` does not own the consent
    /// (the record is untouched), `InvalidStateTransition` when it is no
    /// longer granted.
    pub async fn revoke(
        &self,
        consent_id: &ConsentId,
        user_ref: &UserRef,
    ) -> Result<RevokeOutcome, ConsentError> {
        let now = self.clock.now();
        let record = self
            .store
            .find_by_id(consent_id)?
            .ok_or_else(|| ConsentError::NotFound(consent_id.clone()))?;

        if &record.user_ref != user_ref {
            tracing::warn!(consent_id = %consent_id, "revocation denied: requester does not own consent");
            return Err(ConsentError::AccessDenied {
                consent_id: consent_id.clone(),
            });
        }

        let record = self.expire_if_due(record, now)?;
        if record.status != ConsentStatus::Granted {
            return Err(ConsentError::InvalidStateTransition {
                consent_id: consent_id.clone(),
                from: record.status,
            });
        }

        let record = self.store.update(
            consent_id,
            ConsentUpdate::Revoke {
                at: now,
                reason: REVOKE_REASON_USER_REQUEST.to_string(),
            },
        )?;
        tracing::info!(consent_id = %consent_id, "consent revoked");

        let anchoring = self
            .bounded(
                self.ledger
                    .update_consent_status(consent_id, ConsentStatus::Revoked, now),
            )
            .await;
        let (record, anchoring) = self.persist_anchor(record, anchoring, |tx_ref| {
            ConsentUpdate::AnchorStatus { tx_ref }
        });

        audit::record(
            &*self.audit,
            AuditEntry::new(AuditAction::ConsentRevoked, &record, now)
                .with_details(serde_json::json!({ "reason": REVOKE_REASON_USER_REQUEST })),
        );

        Ok(RevokeOutcome {
            consent_id: record.consent_id,
            status: record.status,
            revoked_at: record.revoked_at.unwrap_or(now),
            ledger_tx_ref: match &anchoring {
                AnchoringOutcome::Anchored { receipt } => Some(receipt.transaction_hash.clone()),
                _ => None,
            },
            anchoring,
            ledger_mode: self.ledger.mode(),
        })
    }

    // ── expiry ───────────────────────────────────────────────────────

    /// Apply `Granted → Expired` if the deadline has passed. Returns the
    /// current record either way.
    fn expire_if_due(
        &self,
        record: ConsentRecord,
        now: Timestamp,
    ) -> Result<ConsentRecord, ConsentError> {
        if record.status != ConsentStatus::Granted || !record.is_expired_at(now) {
            return Ok(record);
        }
        match self
            .store
            .update(&record.consent_id, ConsentUpdate::Expire { at: now })
        {
            Ok(expired) => {
                tracing::info!(consent_id = %expired.consent_id, "consent expired");
                audit::record(
                    &*self.audit,
                    AuditEntry::new(AuditAction::ConsentExpired, &expired, now),
                );
                Ok(expired)
            }
            // A concurrent caller moved it first; report what is stored now.
            Err(StoreError::Transition { .. }) => self
                .store
                .find_by_id(&record.consent_id)?
                .ok_or_else(|| ConsentError::NotFound(record.consent_id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Expire every granted record whose deadline has passed. Returns how
    /// many were expired.
    pub fn sweep_expired(&self) -> Result<usize, ConsentError> {
        let now = self.clock.now();
        let mut expired = 0;
        for record in self.store.list_granted()? {
            if record.is_expired_at(now) {
                let after = self.expire_if_due(record, now)?;
                if after.status == ConsentStatus::Expired {
                    expired += 1;
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "expiry sweep complete");
        }
        Ok(expired)
    }

    /// Run [`Self::sweep_expired`] every `interval` until the handle is aborted.
    pub fn spawn_expiry_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.sweep_expired() {
                    tracing::warn!(error = %e, "expiry sweep failed");
                }
            }
        })
    }

    // ── queries ──────────────────────────────────────────────────────

    /// Consents of `user_ref` that are granted and not past their deadline.
    pub fn active_consents(&self, user_ref: &UserRef) -> Result<Vec<ConsentRecord>, ConsentError> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_by_user(user_ref)?
            .into_iter()
            .filter(|r| r.is_active_at(now))
            .collect())
    }

    /// Records with no confirmed ledger transaction: grants whose anchoring
    /// failed, timed out or was cancelled.
    // TODO: re-submit these after `LedgerClient::recheck_connection` reports
    // the ledger reachable again.
    pub fn unanchored_consents(&self) -> Result<Vec<ConsentRecord>, ConsentError> {
        Ok(self.store.list_unanchored()?)
    }

    pub fn compliance_metrics(
        &self,
        controller_hash: &ControllerHash,
    ) -> Result<ComplianceMetrics, ConsentError> {
        let counts = self.store.counts_by_controller(controller_hash)?;
        Ok(ComplianceMetrics::from_counts(controller_hash.clone(), counts))
    }

    /// Metrics, the most recent consents and ledger status for one controller.
    pub async fn compliance_report(
        &self,
        controller_hash: &ControllerHash,
    ) -> Result<ComplianceReport, ConsentError> {
        let metrics = self.compliance_metrics(controller_hash)?;
        let records = self.store.list_by_controller(controller_hash)?;
        let unanchored_count = records.iter().filter(|r| !r.is_anchored()).count();
        let recent_consents = records
            .iter()
            .take(REPORT_RECENT_LIMIT)
            .map(ConsentSummary::from)
            .collect();
        Ok(ComplianceReport {
            metrics,
            recent_consents,
            unanchored_count,
            network: self.ledger.get_network_status().await,
            generated_at: self.clock.now(),
        })
    }

    // ── helpers ──────────────────────────────────────────────────────

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        match self.anchor_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| LedgerError::Timeout {
                    endpoint: "consent anchoring".into(),
                })?,
            None => fut.await,
        }
    }

    /// Store the transaction hash of a ledger-confirmed anchor. Failures and
    /// degraded pseudo-receipts leave the record unanchored.
    fn persist_anchor(
        &self,
        record: ConsentRecord,
        result: Result<AnchoringReceipt, LedgerError>,
        update: impl FnOnce(String) -> ConsentUpdate,
    ) -> (ConsentRecord, AnchoringOutcome) {
        let receipt = match result {
            Ok(receipt) if receipt.mode != LedgerMode::Connected => {
                tracing::warn!(
                    consent_id = %record.consent_id,
                    mode = %receipt.mode,
                    "ledger degraded, consent persisted unanchored"
                );
                return (record, AnchoringOutcome::Local { receipt });
            }
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(
                    consent_id = %record.consent_id,
                    error = %e,
                    "anchoring failed, consent persisted unanchored"
                );
                return (
                    record,
                    AnchoringOutcome::Unanchored {
                        error: e.to_string(),
                    },
                );
            }
        };

        match self.store.update(
            &record.consent_id,
            update(receipt.transaction_hash.clone()),
        ) {
            Ok(updated) => (updated, AnchoringOutcome::Anchored { receipt }),
            Err(e) => {
                tracing::error!(
                    consent_id = %record.consent_id,
                    tx = %receipt.transaction_hash,
                    error = %e,
                    "anchored but failed to store transaction reference"
                );
                (
                    record,
                    AnchoringOutcome::Unanchored {
                        error: format!("transaction reference not stored: {e}"),
                    },
                )
            }
        }
    }
}

fn validate_grant(req: &GrantRequest, now: Timestamp) -> Result<(), ConsentError> {
    if req.controller_id.trim().is_empty() {
        return Err(validation("controller_id", "must not be empty"));
    }
    if req.purpose.trim().is_empty() {
        return Err(validation("purpose", "must not be empty"));
    }
    if req.data_categories.is_empty() {
        return Err(validation("data_categories", "at least one category is required"));
    }
    if req.data_categories.iter().any(|c| c.trim().is_empty()) {
        return Err(validation("data_categories", "categories must not be blank"));
    }
    if let Some(deadline) = req.expires_at {
        if deadline <= now {
            return Err(validation("expires_at", "must be in the future"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::store::InMemoryConsentStore;
    use ctide_core::ManualClock;
    use ctide_ledger::LedgerConfig;

    const T0: i64 = 1_700_000_000_000;

    struct Harness {
        engine: ConsentEngine,
        store: Arc<InMemoryConsentStore>,
        audit: Arc<InMemoryAuditLog>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let config = LedgerConfig::local("http://127.0.0.1:1").unwrap();
        let ledger = Arc::new(LedgerClient::degraded(config, None).unwrap());
        let store = Arc::new(InMemoryConsentStore::new());
        let audit = Arc::new(InMemoryAuditLog::default());
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(T0)));
        let engine = ConsentEngine::new(store.clone(), ledger, audit.clone())
            .with_clock(clock.clone());
        Harness {
            engine,
            store,
            audit,
            clock,
        }
    }

    fn request(user: &str, expires_at: Option<Timestamp>) -> GrantRequest {
        GrantRequest {
            user_ref: UserRef::new(user).unwrap(),
            controller_id: "acme".into(),
            purpose: "marketing".into(),
            data_categories: vec!["email".into()],
            lawful_basis: LawfulBasis::Consent,
            expires_at,
        }
    }

    #[tokio::test]
    async fn grant_in_degraded_mode_stays_unanchored() {
        let h = harness();
        let out = h.engine.grant(request("u1", None)).await.unwrap();
        assert_eq!(out.status, ConsentStatus::Granted);
        assert_eq!(out.ledger_mode, LedgerMode::Degraded);
        assert!(out.ledger_tx_ref.is_none());
        assert!(!out.anchoring.is_confirmed());
        let receipt = out.anchoring.receipt().unwrap();
        assert_eq!(receipt.mode, LedgerMode::Degraded);
        assert_eq!(h.engine.unanchored_consents().unwrap().len(), 1);
        assert_eq!(h.audit.entries_by_action(AuditAction::ConsentGranted).len(), 1);
    }

    #[tokio::test]
    async fn grant_rejects_bad_input() {
        let h = harness();
        let mut req = request("u1", None);
        req.data_categories.clear();
        assert!(matches!(h.engine.grant(req).await, Err(ConsentError::Validation(_))));

        let mut req = request("u1", None);
        req.purpose = "  ".into();
        assert!(matches!(h.engine.grant(req).await, Err(ConsentError::Validation(_))));

        let req = request("u1", Some(Timestamp::from_millis(T0)));
        assert!(matches!(h.engine.grant(req).await, Err(ConsentError::Validation(_))));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_grant_is_rejected() {
        let h = harness();
        let first = h.engine.grant(request("u1", None)).await.unwrap();
        h.clock.advance(10);
        match h.engine.grant(request("u1", None)).await {
            Err(ConsentError::DuplicateActiveConsent { existing }) => {
                assert_eq!(existing, first.consent_id)
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_unknown_tuple_is_not_found() {
        let h = harness();
        let v = h
            .engine
            .verify(&UserRef::new("u1").unwrap(), "acme", "marketing")
            .await
            .unwrap();
        assert_eq!(v.invalid_reason(), Some(InvalidReason::NotFound));
    }

    #[tokio::test]
    async fn verify_valid_has_reduced_confidence_when_degraded() {
        let h = harness();
        h.engine.grant(request("u1", None)).await.unwrap();
        let v = h
            .engine
            .verify(&UserRef::new("u1").unwrap(), "acme", "marketing")
            .await
            .unwrap();
        match v {
            Verification::Valid(valid) => {
                assert_eq!(valid.confidence, Confidence::Reduced);
                assert_eq!(valid.proof.source, ProofSource::SelfConsistency);
                assert!(ctide_crypto::verify_proof_for(&valid.consent_id, &valid.proof));
            }
            other => panic!("expected valid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_applies_lazy_expiry() {
        let h = harness();
        let out = h
            .engine
            .grant(request("u1", Some(Timestamp::from_millis(T0 + 1_000))))
            .await
            .unwrap();
        let user = UserRef::new("u1").unwrap();

        h.clock.advance(1_000);
        assert!(h.engine.verify(&user, "acme", "marketing").await.unwrap().is_valid());

        h.clock.advance(1);
        let v = h.engine.verify(&user, "acme", "marketing").await.unwrap();
        assert_eq!(v.invalid_reason(), Some(InvalidReason::Expired));
        let stored = h.store.find_by_id(&out.consent_id).unwrap().unwrap();
        assert_eq!(stored.status, ConsentStatus::Expired);
        assert_eq!(h.audit.entries_by_action(AuditAction::ConsentExpired).len(), 1);
    }

    #[tokio::test]
    async fn revoke_by_non_owner_is_denied() {
        let h = harness();
        let out = h.engine.grant(request("u1", None)).await.unwrap();
        let err = h
            .engine
            .revoke(&out.consent_id, &UserRef::new("u2").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ConsentError::AccessDenied { .. }));
        let stored = h.store.find_by_id(&out.consent_id).unwrap().unwrap();
        assert_eq!(stored.status, ConsentStatus::Granted);
    }

    #[tokio::test]
    async fn revoke_twice_is_invalid_transition() {
        let h = harness();
        let user = UserRef::new("u1").unwrap();
        let out = h.engine.grant(request("u1", None)).await.unwrap();
        let revoked = h.engine.revoke(&out.consent_id, &user).await.unwrap();
        assert_eq!(revoked.status, ConsentStatus::Revoked);
        assert_eq!(revoked.revoked_at, Timestamp::from_millis(T0));

        let err = h.engine.revoke(&out.consent_id, &user).await.unwrap_err();
        assert!(matches!(
            err,
            ConsentError::InvalidStateTransition {
                from: ConsentStatus::Revoked,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn revoke_after_deadline_reports_expired() {
        let h = harness();
        let user = UserRef::new("u1").unwrap();
        let out = h
            .engine
            .grant(request("u1", Some(Timestamp::from_millis(T0 + 10))))
            .await
            .unwrap();
        h.clock.advance(11);
        let err = h.engine.revoke(&out.consent_id, &user).await.unwrap_err();
        assert!(matches!(
            err,
            ConsentError::InvalidStateTransition {
                from: ConsentStatus::Expired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn regrant_after_expiry_is_allowed() {
        let h = harness();
        let first = h
            .engine
            .grant(request("u1", Some(Timestamp::from_millis(T0 + 10))))
            .await
            .unwrap();
        h.clock.advance(11);
        let second = h.engine.grant(request("u1", None)).await.unwrap();
        assert_ne!(first.consent_id, second.consent_id);
    }

    #[tokio::test]
    async fn regrant_in_same_millisecond_after_revoke_gets_new_id() {
        let h = harness();
        let user = UserRef::new("u1").unwrap();
        let first = h.engine.grant(request("u1", None)).await.unwrap();
        h.engine.revoke(&first.consent_id, &user).await.unwrap();

        let second = h.engine.grant(request("u1", None)).await.unwrap();
        assert_ne!(second.consent_id, first.consent_id);
        assert_eq!(second.granted_at, Timestamp::from_millis(T0));
        assert_eq!(
            second.consent_id,
            derive::consent_id(&user, "acme", "marketing", Timestamp::from_millis(T0 + 1))
        );

        // The frozen clock keeps colliding; every re-grant still gets a fresh id.
        h.engine.revoke(&second.consent_id, &user).await.unwrap();
        let third = h.engine.grant(request("u1", None)).await.unwrap();
        assert_ne!(third.consent_id, first.consent_id);
        assert_ne!(third.consent_id, second.consent_id);
        assert_eq!(h.store.len(), 3);

        match h.engine.verify(&user, "acme", "marketing").await.unwrap() {
            Verification::Valid(valid) => assert_eq!(valid.consent_id, third.consent_id),
            other => panic!("expected valid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn regrant_in_same_millisecond_while_active_is_duplicate() {
        let h = harness();
        let first = h.engine.grant(request("u1", None)).await.unwrap();
        match h.engine.grant(request("u1", None)).await {
            Err(ConsentError::DuplicateActiveConsent { existing }) => {
                assert_eq!(existing, first.consent_id)
            }
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn sweep_expires_only_due_records() {
        let h = harness();
        h.engine
            .grant(request("u1", Some(Timestamp::from_millis(T0 + 10))))
            .await
            .unwrap();
        h.engine
            .grant(request("u2", Some(Timestamp::from_millis(T0 + 10_000))))
            .await
            .unwrap();
        h.engine.grant(request("u3", None)).await.unwrap();

        h.clock.advance(100);
        assert_eq!(h.engine.sweep_expired().unwrap(), 1);
        assert_eq!(h.engine.sweep_expired().unwrap(), 0);
        assert_eq!(
            h.engine.active_consents(&UserRef::new("u2").unwrap()).unwrap().len(),
            1
        );
        assert!(h.engine.active_consents(&UserRef::new("u1").unwrap()).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_expires_in_background() {
        let h = harness();
        h.engine
            .grant(request("u1", Some(Timestamp::from_millis(T0 + 10))))
            .await
            .unwrap();
        h.clock.advance(100);

        let engine = Arc::new(h.engine);
        let handle = engine.spawn_expiry_sweeper(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.abort();
        assert_eq!(h.audit.entries_by_action(AuditAction::ConsentExpired).len(), 1);
    }

    #[tokio::test]
    async fn compliance_report_lists_recent_consents() {
        let h = harness();
        for i in 0..30 {
            h.engine.grant(request(&format!("u{i}"), None)).await.unwrap();
            h.clock.advance(1);
        }
        let user = UserRef::new("u0").unwrap();
        let first = h.engine.active_consents(&user).unwrap()[0].consent_id.clone();
        h.engine.revoke(&first, &user).await.unwrap();

        let report = h
            .engine
            .compliance_report(&derive::controller_hash("acme"))
            .await
            .unwrap();
        assert_eq!(report.metrics.total_consents, 30);
        assert_eq!(report.metrics.revoked_consents, 1);
        assert_eq!(report.recent_consents.len(), REPORT_RECENT_LIMIT);
        assert!(report.recent_consents[0].granted_at >= report.recent_consents[1].granted_at);
        assert!(!report.network.connected);
        assert_eq!(report.unanchored_count, 30);
    }
}
