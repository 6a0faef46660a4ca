//! # The AuditStore Trait
//!
//! The write surface of the audit store is three `append_*` methods. There
//! is no update and no delete, on this trait or on any engine:
//!
//! ```compile_fail
//! use cmate_audit::{AuditStore, MemoryAuditStore};
//!
//! let store = MemoryAuditStore::new();
//! store.delete_audit(1).unwrap();
//! ```
//!
//! ```compile_fail
//! use cmate_audit::{AuditRecord, AuditStore, MemoryAuditStore};
//!
//! let store = MemoryAuditStore::new();
//! store.update_audit(1, AuditRecord::new("view", "license")).unwrap();
//! ```
//!
//! Each append validates the record, stamps its time if absent, seals it to
//! the head of its table's chain and writes exactly one row. Failures
//! propagate unchanged; nothing is retried.

use cmate_core::{AggregateId, Principal, Timestamp};

use crate::chain::Sealed;
use crate::error::AuditError;
use crate::query::{AuditQuery, ChangeQuery, KeystrokeQuery};
use crate::record::{AuditRecord, ChangeEvent, KeystrokeLog};
use crate::snapshot::{ChainSet, IntegritySnapshot, StoreReport};

/// Append-only storage for audit records, change events and keystroke logs.
pub trait AuditStore: Send + Sync {
    /// Seal and write one audit record.
    fn append_audit(&self, record: AuditRecord) -> Result<Sealed<AuditRecord>, AuditError>;

    /// Seal and write one change event.
    ///
    /// Rejects a `(aggregate_type, aggregate_id, event_seq)` that already
    /// exists, and any `event_seq` not greater than the aggregate's last.
    fn append_change(&self, event: ChangeEvent) -> Result<Sealed<ChangeEvent>, AuditError>;

    /// Seal and write one keystroke capture.
    fn append_keystroke(&self, log: KeystrokeLog) -> Result<Sealed<KeystrokeLog>, AuditError>;

    /// Audit records matching `query`. Admin principals only.
    fn query_audit(
        &self,
        principal: &Principal,
        query: &AuditQuery,
    ) -> Result<Vec<Sealed<AuditRecord>>, AuditError>;

    /// Change events matching `query`, in chain order.
    fn query_changes(&self, query: &ChangeQuery) -> Result<Vec<Sealed<ChangeEvent>>, AuditError>;

    /// Keystroke captures matching `query`, in chain order.
    fn query_keystrokes(
        &self,
        query: &KeystrokeQuery,
    ) -> Result<Vec<Sealed<KeystrokeLog>>, AuditError>;

    /// Sequence number the next event of an aggregate must use.
    fn next_event_seq(&self, aggregate_type: &str, aggregate_id: AggregateId)
        -> Result<i64, AuditError>;

    /// Full `audit_logs` chain.
    fn audit_chain(&self) -> Result<Vec<Sealed<AuditRecord>>, AuditError>;

    /// Full `change_events` chain.
    fn change_chain(&self) -> Result<Vec<Sealed<ChangeEvent>>, AuditError>;

    /// Full `keystroke_logs` chain.
    fn keystroke_chain(&self) -> Result<Vec<Sealed<KeystrokeLog>>, AuditError>;

    /// Write one row to the immutable snapshot index.
    fn record_snapshot(&self, snapshot: IntegritySnapshot) -> Result<(), AuditError>;

    /// All snapshots, oldest first.
    fn snapshots(&self) -> Result<Vec<IntegritySnapshot>, AuditError>;

    /// Events of one aggregate in `event_seq` order.
    fn replay(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<Sealed<ChangeEvent>>, AuditError> {
        let mut events = self.query_changes(&ChangeQuery::for_aggregate(aggregate_type, aggregate_id))?;
        events.sort_by_key(|e| e.record().event_seq);
        Ok(events)
    }

    /// Read all three chains.
    fn chains(&self) -> Result<ChainSet, AuditError> {
        Ok(ChainSet {
            audit: self.audit_chain()?,
            changes: self.change_chain()?,
            keystrokes: self.keystroke_chain()?,
        })
    }

    /// Verify all three chains from genesis.
    fn verify(&self) -> Result<StoreReport, AuditError> {
        self.chains()?.verify()
    }

    /// Verify, commit to the current rows, and index the snapshot.
    fn take_snapshot(&self, storage_pointer: Option<String>) -> Result<IntegritySnapshot, AuditError> {
        let snapshot = self.chains()?.snapshot(Timestamp::now(), storage_pointer)?;
        self.record_snapshot(snapshot.clone())?;
        tracing::info!(
            snapshot_id = %snapshot.id,
            merkle_root = %snapshot.merkle_root,
            rows = snapshot.total_rows(),
            "integrity snapshot recorded"
        );
        Ok(snapshot)
    }

    /// Check a snapshot against the current rows.
    fn verify_snapshot(&self, snapshot: &IntegritySnapshot) -> Result<(), AuditError> {
        self.chains()?.verify_snapshot(snapshot)
    }
}

/// Refuse audit reads to non-admin principals.
pub(crate) fn require_admin(principal: &Principal) -> Result<(), AuditError> {
    if principal.is_admin() {
        return Ok(());
    }
    tracing::warn!(role = %principal.role, "audit query refused for non-admin principal");
    Err(AuditError::Forbidden(format!(
        "role {} may not read audit logs",
        principal.role
    )))
}
