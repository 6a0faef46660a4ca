//! In-memory [`AuditStore`] engine.
//!
//! Three chains behind one `parking_lot::RwLock`. Appends take the write
//! lock for the whole validate-seal-push step, so seq numbers and links are
//! assigned without races; queries take the read lock. Share between
//! threads with `Arc<MemoryAuditStore>`.

use std::collections::HashMap;

use cmate_core::{AggregateId, Principal, Timestamp};
use parking_lot::RwLock;

use crate::chain::{append_sealed, Sealed};
use crate::error::AuditError;
use crate::query::{AuditQuery, ChangeQuery, KeystrokeQuery};
use crate::record::{AuditRecord, ChangeEvent, KeystrokeLog};
use crate::snapshot::{ChainSet, IntegritySnapshot};
use crate::store::{require_admin, AuditStore};

#[derive(Default)]
struct Inner {
    chains: ChainSet,
    /// Highest event_seq per (aggregate_type, aggregate_id).
    last_seq: HashMap<(String, AggregateId), i64>,
    snapshots: Vec<IntegritySnapshot>,
}

/// Audit store held entirely in process memory.
#[derive(Default)]
pub struct MemoryAuditStore {
    inner: RwLock<Inner>,
}

impl MemoryAuditStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Row counts `(audit_logs, change_events, keystroke_logs)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        let inner = self.inner.read();
        (
            inner.chains.audit.len(),
            inner.chains.changes.len(),
            inner.chains.keystrokes.len(),
        )
    }
}

impl std::fmt::Debug for MemoryAuditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (audit, changes, keystrokes) = self.counts();
        f.debug_struct("MemoryAuditStore")
            .field("audit_logs", &audit)
            .field("change_events", &changes)
            .field("keystroke_logs", &keystrokes)
            .finish()
    }
}

impl AuditStore for MemoryAuditStore {
    fn append_audit(&self, record: AuditRecord) -> Result<Sealed<AuditRecord>, AuditError> {
        let mut inner = self.inner.write();
        let sealed = append_sealed(&mut inner.chains.audit, record, Timestamp::now())?;
        tracing::debug!(
            seq = sealed.seq(),
            action_type = %sealed.record().action_type,
            resource_type = %sealed.record().resource_type,
            phi_accessed = sealed.record().phi_accessed,
            "audit record appended"
        );
        Ok(sealed)
    }

    fn append_change(&self, event: ChangeEvent) -> Result<Sealed<ChangeEvent>, AuditError> {
        let mut inner = self.inner.write();
        let key = (event.aggregate_type.clone(), event.aggregate_id);
        if let Some(&last_seq) = inner.last_seq.get(&key) {
            check_next_seq(&inner.chains.changes, &event, last_seq)?;
        }
        let sealed = append_sealed(&mut inner.chains.changes, event, Timestamp::now())?;
        inner.last_seq.insert(key, sealed.record().event_seq);
        tracing::debug!(
            seq = sealed.seq(),
            aggregate_type = %sealed.record().aggregate_type,
            aggregate_id = %sealed.record().aggregate_id,
            event_seq = sealed.record().event_seq,
            "change event appended"
        );
        Ok(sealed)
    }

    fn append_keystroke(&self, log: KeystrokeLog) -> Result<Sealed<KeystrokeLog>, AuditError> {
        let mut inner = self.inner.write();
        let sealed = append_sealed(&mut inner.chains.keystrokes, log, Timestamp::now())?;
        tracing::debug!(seq = sealed.seq(), user_id = %sealed.record().user_id, "keystroke log appended");
        Ok(sealed)
    }

    fn query_audit(
        &self,
        principal: &Principal,
        query: &AuditQuery,
    ) -> Result<Vec<Sealed<AuditRecord>>, AuditError> {
        require_admin(principal)?;
        query.validate()?;
        let inner = self.inner.read();
        Ok(inner
            .chains
            .audit
            .iter()
            .filter(|e| query.matches(e))
            .skip(query.offset)
            .take(query.effective_limit())
            .cloned()
            .collect())
    }

    fn query_changes(&self, query: &ChangeQuery) -> Result<Vec<Sealed<ChangeEvent>>, AuditError> {
        query.validate()?;
        let inner = self.inner.read();
        Ok(inner
            .chains
            .changes
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    fn query_keystrokes(
        &self,
        query: &KeystrokeQuery,
    ) -> Result<Vec<Sealed<KeystrokeLog>>, AuditError> {
        query.validate()?;
        let inner = self.inner.read();
        Ok(inner
            .chains
            .keystrokes
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    fn next_event_seq(
        &self,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<i64, AuditError> {
        let inner = self.inner.read();
        let last = inner
            .last_seq
            .get(&(aggregate_type.to_string(), aggregate_id))
            .copied()
            .unwrap_or(0);
        Ok(last + 1)
    }

    fn audit_chain(&self) -> Result<Vec<Sealed<AuditRecord>>, AuditError> {
        Ok(self.inner.read().chains.audit.clone())
    }

    fn change_chain(&self) -> Result<Vec<Sealed<ChangeEvent>>, AuditError> {
        Ok(self.inner.read().chains.changes.clone())
    }

    fn keystroke_chain(&self) -> Result<Vec<Sealed<KeystrokeLog>>, AuditError> {
        Ok(self.inner.read().chains.keystrokes.clone())
    }

    fn chains(&self) -> Result<ChainSet, AuditError> {
        Ok(self.inner.read().chains.clone())
    }

    fn record_snapshot(&self, snapshot: IntegritySnapshot) -> Result<(), AuditError> {
        self.inner.write().snapshots.push(snapshot);
        Ok(())
    }

    fn snapshots(&self) -> Result<Vec<IntegritySnapshot>, AuditError> {
        Ok(self.inner.read().snapshots.clone())
    }
}

/// Reject an event whose seq does not exceed the aggregate's last seq.
fn check_next_seq(
    changes: &[Sealed<ChangeEvent>],
    event: &ChangeEvent,
    last_seq: i64,
) -> Result<(), AuditError> {
    if event.event_seq > last_seq {
        return Ok(());
    }
    let exists = changes.iter().any(|e| {
        let r = e.record();
        r.aggregate_id == event.aggregate_id
            && r.event_seq == event.event_seq
            && r.aggregate_type == event.aggregate_type
    });
    let aggregate_type = event.aggregate_type.clone();
    let aggregate_id = event.aggregate_id.to_string();
    tracing::warn!(
        %aggregate_type,
        %aggregate_id,
        event_seq = event.event_seq,
        last_seq,
        "change event sequence rejected"
    );
    if exists {
        Err(AuditError::DuplicateSequence {
            aggregate_type,
            aggregate_id,
            event_seq: event.event_seq,
        })
    } else {
        Err(AuditError::SequenceRegression {
            aggregate_type,
            aggregate_id,
            last_seq,
            attempted: event.event_seq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ChangeEventType;
    use cmate_core::{Role, SessionId, UserId};
    use serde_json::json;
    use std::sync::Arc;

    fn admin() -> Principal {
        Principal::user(UserId::new(), Role::Admin)
    }

    #[test]
    fn test_append_then_query_returns_sealed_record() {
        let store = MemoryAuditStore::new();
        let record = AuditRecord::new("view", "license")
            .on_resource("lic-1")
            .with_phi(&["license_number"])
            .with_request_id("req-42");
        let sealed = store.append_audit(record.clone()).unwrap();
        assert!(sealed.record().timestamp.is_some());

        let found = store
            .query_audit(
                &admin(),
                &AuditQuery {
                    request_id: Some("req-42".into()),
                    ..AuditQuery::default()
                },
            )
            .unwrap();
        assert_eq!(found, vec![sealed.clone()]);
        assert_eq!(found[0].record().resource_id, record.resource_id);
    }

    #[test]
    fn test_query_requires_admin() {
        let store = MemoryAuditStore::new();
        store.append_audit(AuditRecord::new("view", "license")).unwrap();
        let provider = Principal::user(UserId::new(), Role::Provider);
        let err = store
            .query_audit(&provider, &AuditQuery::default())
            .unwrap_err();
        assert!(matches!(err, AuditError::Forbidden(_)));
    }

    #[test]
    fn test_query_filters_and_pages() {
        let store = MemoryAuditStore::new();
        let user = UserId::new();
        for i in 0..5 {
            let mut r = AuditRecord::new("view", "license").on_resource(format!("lic-{i}"));
            if i % 2 == 0 {
                r = r.by_user(user).with_phi(&["dob"]);
            }
            store.append_audit(r).unwrap();
        }
        let phi = store
            .query_audit(
                &admin(),
                &AuditQuery {
                    phi_only: true,
                    ..AuditQuery::default()
                },
            )
            .unwrap();
        assert_eq!(phi.len(), 3);
        assert!(phi.iter().all(|e| e.record().user_id == Some(user)));

        let page = store
            .query_audit(
                &admin(),
                &AuditQuery {
                    limit: Some(2),
                    offset: 1,
                    ..AuditQuery::default()
                },
            )
            .unwrap();
        let seqs: Vec<u64> = page.iter().map(|e| e.seq()).collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[test]
    fn test_inverted_range_is_an_error() {
        let store = MemoryAuditStore::new();
        let query = AuditQuery {
            start: Some(Timestamp::parse("2025-11-17T00:00:00Z").unwrap()),
            end: Some(Timestamp::parse("2025-11-16T00:00:00Z").unwrap()),
            ..AuditQuery::default()
        };
        assert!(matches!(
            store.query_audit(&admin(), &query).unwrap_err(),
            AuditError::InvalidRange { .. }
        ));
    }

    #[test]
    fn test_duplicate_event_seq_rejected() {
        let store = MemoryAuditStore::new();
        let agg = AggregateId::new();
        store
            .append_change(ChangeEvent::new("license", agg, 1, ChangeEventType::Created, json!({})))
            .unwrap();
        let err = store
            .append_change(ChangeEvent::new("license", agg, 1, ChangeEventType::Updated, json!({})))
            .unwrap_err();
        assert!(matches!(err, AuditError::DuplicateSequence { event_seq: 1, .. }));
        assert_eq!(store.counts().1, 1);
    }

    #[test]
    fn test_non_increasing_event_seq_rejected() {
        let store = MemoryAuditStore::new();
        let agg = AggregateId::new();
        store
            .append_change(ChangeEvent::new("license", agg, 1, ChangeEventType::Created, json!({})))
            .unwrap();
        store
            .append_change(ChangeEvent::new("license", agg, 3, ChangeEventType::Updated, json!({})))
            .unwrap();
        let err = store
            .append_change(ChangeEvent::new("license", agg, 2, ChangeEventType::Updated, json!({})))
            .unwrap_err();
        assert!(matches!(
            err,
            AuditError::SequenceRegression { last_seq: 3, attempted: 2, .. }
        ));
    }

    #[test]
    fn test_sequences_are_per_aggregate() {
        let store = MemoryAuditStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append_change(ChangeEvent::new("license", a, 1, ChangeEventType::Created, json!({})))
            .unwrap();
        store
            .append_change(ChangeEvent::new("license", b, 1, ChangeEventType::Created, json!({})))
            .unwrap();
        store
            .append_change(ChangeEvent::new("cme", a, 1, ChangeEventType::Created, json!({})))
            .unwrap();
        assert_eq!(store.next_event_seq("license", a).unwrap(), 2);
        assert_eq!(store.next_event_seq("license", AggregateId::new()).unwrap(), 1);
    }

    #[test]
    fn test_replay_orders_by_event_seq() {
        let store = MemoryAuditStore::new();
        let agg = AggregateId::new();
        for seq in 1..=3 {
            store
                .append_change(ChangeEvent::new(
                    "license",
                    agg,
                    seq,
                    ChangeEventType::Updated,
                    json!({ "status": format!("s{seq}") }),
                ))
                .unwrap();
            store
                .append_change(ChangeEvent::new(
                    "license",
                    AggregateId::new(),
                    1,
                    ChangeEventType::Created,
                    json!({}),
                ))
                .unwrap();
        }
        let history = store.replay("license", agg).unwrap();
        let seqs: Vec<i64> = history.iter().map(|e| e.record().event_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_keystroke_query_by_session() {
        let store = MemoryAuditStore::new();
        let user = UserId::new();
        let session = SessionId::new();
        store
            .append_keystroke(KeystrokeLog::new(user, vec![1]).in_session(session))
            .unwrap();
        store.append_keystroke(KeystrokeLog::new(user, vec![2])).unwrap();
        let hits = store
            .query_keystrokes(&KeystrokeQuery {
                session_id: Some(session),
                ..KeystrokeQuery::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record().payload_encrypted, vec![1]);
    }

    #[test]
    fn test_verify_and_snapshot() {
        let store = MemoryAuditStore::new();
        store.append_audit(AuditRecord::new("login", "session")).unwrap();
        store
            .append_keystroke(KeystrokeLog::new(UserId::new(), vec![7]))
            .unwrap();
        let report = store.verify().unwrap();
        assert_eq!(report.audit_logs.length, 1);
        assert_eq!(report.change_events.length, 0);

        let snap = store.take_snapshot(None).unwrap();
        assert_eq!(store.snapshots().unwrap(), vec![snap.clone()]);
        store.append_audit(AuditRecord::new("logout", "session")).unwrap();
        store.verify_snapshot(&snap).unwrap();
    }

    #[test]
    fn test_concurrent_appends_keep_chain_intact() {
        let store = Arc::new(MemoryAuditStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store
                            .append_audit(
                                AuditRecord::new("view", "license").on_resource(format!("{t}-{i}")),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let report = store.verify().unwrap();
        assert_eq!(report.audit_logs.length, 200);
    }
}
