//! # Consent Persistence
//!
//! [`ConsentStore`] is the seam between the engine and whatever holds
//! consent records. Implementations must make `insert_if_absent` atomic per
//! `(user_ref, controller_hash, purpose_hash)` tuple: of N concurrent grants
//! for one tuple, exactly one succeeds. A SQL backend gets this from a
//! partial unique index on the tuple where `status = 'granted'`.
//!
//! [`InMemoryConsentStore`] keeps everything behind one `parking_lot::RwLock`,
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use ctide_compliance::StatusCounts;
use ctide_core::{ConsentId, ControllerHash, PurposeHash, Timestamp, UserRef};
use ctide_state::{ConsentRecord, ConsentStatus};
use parking_lot::RwLock;

use crate::error::StoreError;

/// A mutation applied atomically to one stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentUpdate {
    /// Record the grant's confirmed anchoring transaction hash.
    Anchor { tx_ref: String },
    /// Record the revocation's confirmed anchoring transaction hash.
    AnchorStatus { tx_ref: String },
    /// Granted → Revoked.
    Revoke { at: Timestamp, reason: String },
    /// Granted → Expired.
    Expire { at: Timestamp },
}

/// Persistence for consent records.
pub trait ConsentStore: Send + Sync {
    /// Insert `record` unless the tuple already has a granted record
    /// (`StoreError::Conflict`) or its id belongs to another record
    /// (`StoreError::IdTaken`). The tuple check comes first.
    fn insert_if_absent(&self, record: ConsentRecord) -> Result<(), StoreError>;

    /// Apply `update` under the store's write guard and return the result.
    fn update(&self, consent_id: &ConsentId, update: ConsentUpdate)
        -> Result<ConsentRecord, StoreError>;

    /// The granted record for the tuple if there is one, else the most
    /// recently granted record of any status.
    fn find_by_tuple(
        &self,
        user_ref: &UserRef,
        controller_hash: &ControllerHash,
        purpose_hash: &PurposeHash,
    ) -> Result<Option<ConsentRecord>, StoreError>;

    fn find_by_id(&self, consent_id: &ConsentId) -> Result<Option<ConsentRecord>, StoreError>;

    fn counts_by_controller(&self, controller_hash: &ControllerHash)
        -> Result<StatusCounts, StoreError>;

    /// All records of one subject, newest first.
    fn list_by_user(&self, user_ref: &UserRef) -> Result<Vec<ConsentRecord>, StoreError>;

    /// All records currently in `Granted`.
    fn list_granted(&self) -> Result<Vec<ConsentRecord>, StoreError>;

    /// Records with a lifecycle change still waiting for a confirmed
    /// anchoring transaction (see `ConsentRecord::is_anchored`), oldest first.
    fn list_unanchored(&self) -> Result<Vec<ConsentRecord>, StoreError>;

    /// All records of one controller, newest first.
    fn list_by_controller(
        &self,
        controller_hash: &ControllerHash,
    ) -> Result<Vec<ConsentRecord>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TupleKey {
    user_ref: UserRef,
    controller_hash: ControllerHash,
    purpose_hash: PurposeHash,
}

impl TupleKey {
    fn of(record: &ConsentRecord) -> Self {
        Self {
            user_ref: record.user_ref.clone(),
            controller_hash: record.controller_hash.clone(),
            purpose_hash: record.purpose_hash.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<ConsentId, ConsentRecord>,
    /// Tuple → id of its granted record.
    active: HashMap<TupleKey, ConsentId>,
    /// Tuple → every id ever granted, in insertion order.
    history: HashMap<TupleKey, Vec<ConsentId>>,
}

/// Thread-safe, cloneable in-memory consent store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConsentStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect_sorted(
        &self,
        filter: impl Fn(&ConsentRecord) -> bool,
        newest_first: bool,
    ) -> Vec<ConsentRecord> {
        let tables = self.tables.read();
        let mut out: Vec<ConsentRecord> = tables
            .records
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.granted_at
                .cmp(&b.granted_at)
                .then_with(|| a.consent_id.cmp(&b.consent_id))
        });
        if newest_first {
            out.reverse();
        }
        out
    }
}

impl ConsentStore for InMemoryConsentStore {
    fn insert_if_absent(&self, record: ConsentRecord) -> Result<(), StoreError> {
        let key = TupleKey::of(&record);
        let mut tables = self.tables.write();

        if let Some(existing) = tables.active.get(&key) {
            return Err(StoreError::Conflict {
                existing: existing.clone(),
            });
        }
        if tables.records.contains_key(&record.consent_id) {
            return Err(StoreError::IdTaken(record.consent_id));
        }

        let id = record.consent_id.clone();
        if record.status == ConsentStatus::Granted {
            tables.active.insert(key.clone(), id.clone());
        }
        tables.history.entry(key).or_default().push(id.clone());
        tables.records.insert(id, record);
        Ok(())
    }

    fn update(
        &self,
        consent_id: &ConsentId,
        update: ConsentUpdate,
    ) -> Result<ConsentRecord, StoreError> {
        let mut tables = self.tables.write();
        let record = tables
            .records
            .get_mut(consent_id)
            .ok_or_else(|| StoreError::NotFound(consent_id.clone()))?;

        let transition = match update {
            ConsentUpdate::Anchor { tx_ref } => {
                record.record_anchor(tx_ref);
                Ok(())
            }
            ConsentUpdate::AnchorStatus { tx_ref } => {
                record.record_status_anchor(tx_ref);
                Ok(())
            }
            ConsentUpdate::Revoke { at, reason } => record.revoke(at, &reason),
            ConsentUpdate::Expire { at } => record.expire(at),
        };
        transition.map_err(|source| StoreError::Transition {
            consent_id: consent_id.clone(),
            source,
        })?;

        let updated = record.clone();
        if updated.status != ConsentStatus::Granted {
            let key = TupleKey::of(&updated);
            if tables.active.get(&key) == Some(consent_id) {
                tables.active.remove(&key);
            }
        }
        Ok(updated)
    }

    fn find_by_tuple(
        &self,
        user_ref: &UserRef,
        controller_hash: &ControllerHash,
        purpose_hash: &PurposeHash,
    ) -> Result<Option<ConsentRecord>, StoreError> {
        let key = TupleKey {
            user_ref: user_ref.clone(),
            controller_hash: controller_hash.clone(),
            purpose_hash: purpose_hash.clone(),
        };
        let tables = self.tables.read();
        if let Some(id) = tables.active.get(&key) {
            return Ok(tables.records.get(id).cloned());
        }
        let latest = tables
            .history
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.records.get(id))
            .max_by_key(|r| r.granted_at);
        Ok(latest.cloned())
    }

    fn find_by_id(&self, consent_id: &ConsentId) -> Result<Option<ConsentRecord>, StoreError> {
        Ok(self.tables.read().records.get(consent_id).cloned())
    }

    fn counts_by_controller(
        &self,
        controller_hash: &ControllerHash,
    ) -> Result<StatusCounts, StoreError> {
        let tables = self.tables.read();
        Ok(StatusCounts::from_records(
            tables
                .records
                .values()
                .filter(|r| &r.controller_hash == controller_hash),
        ))
    }

    fn list_by_user(&self, user_ref: &UserRef) -> Result<Vec<ConsentRecord>, StoreError> {
        Ok(self.collect_sorted(|r| &r.user_ref == user_ref, true))
    }

    fn list_granted(&self) -> Result<Vec<ConsentRecord>, StoreError> {
        Ok(self.collect_sorted(|r| r.status == ConsentStatus::Granted, false))
    }

    fn list_unanchored(&self) -> Result<Vec<ConsentRecord>, StoreError> {
        Ok(self.collect_sorted(|r| !r.is_anchored(), false))
    }

    fn list_by_controller(
        &self,
        controller_hash: &ControllerHash,
    ) -> Result<Vec<ConsentRecord>, StoreError> {
        Ok(self.collect_sorted(|r| &r.controller_hash == controller_hash, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctide_core::derive;
    use ctide_state::{LawfulBasis, NewConsent};

    fn record(user: &str, purpose: &str, at: i64) -> ConsentRecord {
        let user_ref = UserRef::new(user).unwrap();
        let granted_at = Timestamp::from_millis(at);
        ConsentRecord::granted(NewConsent {
            consent_id: derive::consent_id(&user_ref, "acme", purpose, granted_at),
            user_ref,
            controller_hash: derive::controller_hash("acme"),
            purpose_hash: derive::purpose_hash(purpose),
            data_categories: vec!["email".into()],
            lawful_basis: LawfulBasis::Consent,
            granted_at,
            expires_at: None,
        })
    }

    fn lookup(store: &InMemoryConsentStore, r: &ConsentRecord) -> Option<ConsentRecord> {
        store
            .find_by_tuple(&r.user_ref, &r.controller_hash, &r.purpose_hash)
            .unwrap()
    }

    #[test]
    fn second_active_grant_conflicts() {
        let store = InMemoryConsentStore::new();
        let first = record("u1", "marketing", 1_000);
        store.insert_if_absent(first.clone()).unwrap();

        let second = record("u1", "marketing", 2_000);
        match store.insert_if_absent(second) {
            Err(StoreError::Conflict { existing }) => assert_eq!(existing, first.consent_id),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reused_id_of_terminal_record_is_id_taken() {
        let store = InMemoryConsentStore::new();
        let first = record("u1", "marketing", 1_000);
        store.insert_if_absent(first.clone()).unwrap();
        store
            .update(
                &first.consent_id,
                ConsentUpdate::Revoke {
                    at: Timestamp::from_millis(1_000),
                    reason: "user_request".into(),
                },
            )
            .unwrap();

        match store.insert_if_absent(record("u1", "marketing", 1_000)) {
            Err(StoreError::IdTaken(id)) => assert_eq!(id, first.consent_id),
            other => panic!("expected id taken, got {other:?}"),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unanchored_revocation_is_listed() {
        let store = InMemoryConsentStore::new();
        let r = record("u1", "marketing", 1_000);
        store.insert_if_absent(r.clone()).unwrap();
        store
            .update(&r.consent_id, ConsentUpdate::Anchor { tx_ref: "tx-grant".into() })
            .unwrap();
        store
            .update(
                &r.consent_id,
                ConsentUpdate::Revoke {
                    at: Timestamp::from_millis(2_000),
                    reason: "user_request".into(),
                },
            )
            .unwrap();
        assert_eq!(store.list_unanchored().unwrap().len(), 1);

        store
            .update(&r.consent_id, ConsentUpdate::AnchorStatus { tx_ref: "tx-revoke".into() })
            .unwrap();
        assert!(store.list_unanchored().unwrap().is_empty());
    }

    #[test]
    fn other_purpose_does_not_conflict() {
        let store = InMemoryConsentStore::new();
        store.insert_if_absent(record("u1", "marketing", 1_000)).unwrap();
        store.insert_if_absent(record("u1", "analytics", 1_000)).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn revoke_frees_tuple_for_regrant() {
        let store = InMemoryConsentStore::new();
        let first = record("u1", "marketing", 1_000);
        store.insert_if_absent(first.clone()).unwrap();
        store
            .update(
                &first.consent_id,
                ConsentUpdate::Revoke {
                    at: Timestamp::from_millis(1_500),
                    reason: "user_request".into(),
                },
            )
            .unwrap();

        let found = lookup(&store, &first).unwrap();
        assert_eq!(found.status, ConsentStatus::Revoked);

        let second = record("u1", "marketing", 2_000);
        store.insert_if_absent(second.clone()).unwrap();
        let found = lookup(&store, &first).unwrap();
        assert_eq!(found.consent_id, second.consent_id);
        assert_eq!(found.status, ConsentStatus::Granted);
    }

    #[test]
    fn illegal_update_leaves_record_untouched() {
        let store = InMemoryConsentStore::new();
        let r = record("u1", "marketing", 1_000);
        store.insert_if_absent(r.clone()).unwrap();
        store
            .update(&r.consent_id, ConsentUpdate::Expire { at: Timestamp::from_millis(2_000) })
            .unwrap();
        let err = store
            .update(
                &r.consent_id,
                ConsentUpdate::Revoke {
                    at: Timestamp::from_millis(3_000),
                    reason: "user_request".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition { .. }));
        let stored = store.find_by_id(&r.consent_id).unwrap().unwrap();
        assert_eq!(stored.status, ConsentStatus::Expired);
        assert!(stored.revoked_at.is_none());
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let store = InMemoryConsentStore::new();
        let r = record("u1", "marketing", 1_000);
        let err = store
            .update(&r.consent_id, ConsentUpdate::Anchor { tx_ref: "t".into() })
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn anchoring_removes_from_unanchored_list() {
        let store = InMemoryConsentStore::new();
        let a = record("u1", "marketing", 1_000);
        let b = record("u2", "marketing", 2_000);
        store.insert_if_absent(a.clone()).unwrap();
        store.insert_if_absent(b.clone()).unwrap();
        store
            .update(&a.consent_id, ConsentUpdate::Anchor { tx_ref: "tx-a".into() })
            .unwrap();
        let pending = store.list_unanchored().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].consent_id, b.consent_id);
    }

    #[test]
    fn counts_and_listing_by_controller() {
        let store = InMemoryConsentStore::new();
        let a = record("u1", "marketing", 1_000);
        store.insert_if_absent(a.clone()).unwrap();
        store.insert_if_absent(record("u2", "marketing", 3_000)).unwrap();
        store
            .update(
                &a.consent_id,
                ConsentUpdate::Revoke {
                    at: Timestamp::from_millis(2_000),
                    reason: "user_request".into(),
                },
            )
            .unwrap();

        let counts = store
            .counts_by_controller(&derive::controller_hash("acme"))
            .unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.revoked, 1);
        assert_eq!(counts.granted, 1);

        let listed = store
            .list_by_controller(&derive::controller_hash("acme"))
            .unwrap();
        assert_eq!(listed[0].granted_at, Timestamp::from_millis(3_000));
        assert!(store
            .list_by_controller(&derive::controller_hash("globex"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn concurrent_inserts_admit_exactly_one() {
        let store = InMemoryConsentStore::new();
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .insert_if_absent(record("u1", "marketing", 1_000 + i))
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(store.len(), 1);
    }
}
