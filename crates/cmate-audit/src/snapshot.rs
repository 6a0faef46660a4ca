//! # Integrity Snapshots
//!
//! A snapshot commits to the exact row set of all three tables at a point
//! in time: per-table row counts plus one Merkle root over every row's
//! `integrity_hash`, in table order (`audit_logs`, `change_events`,
//! `keystroke_logs`) and chain order within each table.
//!
//! Because the tables only grow, a snapshot stays checkable forever: the
//! verifier recomputes the root over the counted prefix of each table.
//! Rows appended after the snapshot do not affect it; a removed or altered
//! row does.

use std::collections::BTreeMap;

use cmate_core::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::{verify_chain, ChainReport, Sealed};
use crate::error::AuditError;
use crate::merkle::{build_inclusion_proof, mmr_root, InclusionProof};
use crate::record::{AuditRecord, AuditTable, ChangeEvent, KeystrokeLog};

/// One row of the `audit_immutable_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySnapshot {
    /// Snapshot identity.
    pub id: Uuid,
    /// When the snapshot was taken.
    pub snapshot_time: Timestamp,
    /// Rows per table covered by the root.
    pub aggregate_counts: BTreeMap<AuditTable, u64>,
    /// Merkle root over the covered integrity hashes.
    pub merkle_root: String,
    /// Where an off-database copy of the snapshot was written, if anywhere.
    pub storage_pointer: Option<String>,
}

impl IntegritySnapshot {
    /// Rows covered in `table`.
    pub fn count(&self, table: AuditTable) -> u64 {
        self.aggregate_counts.get(&table).copied().unwrap_or(0)
    }

    /// Total rows covered.
    pub fn total_rows(&self) -> u64 {
        self.aggregate_counts.values().sum()
    }
}

/// Verification outcome for all three chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreReport {
    /// `audit_logs` chain.
    pub audit_logs: ChainReport,
    /// `change_events` chain.
    pub change_events: ChainReport,
    /// `keystroke_logs` chain.
    pub keystroke_logs: ChainReport,
}

/// Full contents of the three tables, in chain order.
#[derive(Debug, Clone, Default)]
pub struct ChainSet {
    /// `audit_logs` rows.
    pub audit: Vec<Sealed<AuditRecord>>,
    /// `change_events` rows.
    pub changes: Vec<Sealed<ChangeEvent>>,
    /// `keystroke_logs` rows.
    pub keystrokes: Vec<Sealed<KeystrokeLog>>,
}

impl ChainSet {
    /// Verify every chain from genesis.
    pub fn verify(&self) -> Result<StoreReport, AuditError> {
        Ok(StoreReport {
            audit_logs: verify_chain(&self.audit)?,
            change_events: verify_chain(&self.changes)?,
            keystroke_logs: verify_chain(&self.keystrokes)?,
        })
    }

    /// Current row count of `table`.
    pub fn len_of(&self, table: AuditTable) -> u64 {
        let n = match table {
            AuditTable::AuditLogs => self.audit.len(),
            AuditTable::ChangeEvents => self.changes.len(),
            AuditTable::KeystrokeLogs => self.keystrokes.len(),
        };
        n as u64
    }

    fn hashes_of(&self, table: AuditTable, count: u64) -> Vec<String> {
        fn prefix<T>(rows: &[Sealed<T>], count: u64) -> Vec<String>
        where
            T: crate::chain::ChainRecord,
        {
            rows.iter()
                .take(count as usize)
                .map(|r| r.integrity_hash().to_string())
                .collect()
        }
        match table {
            AuditTable::AuditLogs => prefix(&self.audit, count),
            AuditTable::ChangeEvents => prefix(&self.changes, count),
            AuditTable::KeystrokeLogs => prefix(&self.keystrokes, count),
        }
    }

    /// Leaves for the given per-table counts, failing if a table is short.
    fn leaves(&self, counts: &BTreeMap<AuditTable, u64>) -> Result<Vec<String>, AuditError> {
        let mut leaves = Vec::new();
        for table in AuditTable::ALL {
            let recorded = counts.get(&table).copied().unwrap_or(0);
            let present = self.len_of(table);
            if recorded > present {
                return Err(AuditError::SnapshotRowsMissing {
                    table,
                    recorded,
                    present,
                });
            }
            leaves.extend(self.hashes_of(table, recorded));
        }
        Ok(leaves)
    }

    /// Verify the chains, then commit to their current contents.
    pub fn snapshot(
        &self,
        snapshot_time: Timestamp,
        storage_pointer: Option<String>,
    ) -> Result<IntegritySnapshot, AuditError> {
        self.verify()?;
        let aggregate_counts: BTreeMap<AuditTable, u64> = AuditTable::ALL
            .iter()
            .map(|t| (*t, self.len_of(*t)))
            .collect();
        let merkle_root = mmr_root(&self.leaves(&aggregate_counts)?)?;
        Ok(IntegritySnapshot {
            id: Uuid::new_v4(),
            snapshot_time,
            aggregate_counts,
            merkle_root,
            storage_pointer,
        })
    }

    /// Check that the rows a snapshot covers are still exactly as they were.
    pub fn verify_snapshot(&self, snapshot: &IntegritySnapshot) -> Result<(), AuditError> {
        let computed = mmr_root(&self.leaves(&snapshot.aggregate_counts)?)?;
        if computed != snapshot.merkle_root {
            return Err(AuditError::SnapshotMismatch {
                recorded: snapshot.merkle_root.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Prove that row `seq` of `table` is covered by `snapshot`.
    pub fn prove(
        &self,
        snapshot: &IntegritySnapshot,
        table: AuditTable,
        seq: u64,
    ) -> Result<InclusionProof, AuditError> {
        let covered = snapshot.count(table);
        if seq == 0 || seq > covered {
            return Err(AuditError::InvalidField {
                table,
                field: "seq",
                reason: format!("seq {seq} not covered by snapshot ({covered} rows)"),
            });
        }
        let offset: u64 = AuditTable::ALL
            .iter()
            .take_while(|t| **t != table)
            .map(|t| snapshot.count(*t))
            .sum();
        let leaves = self.leaves(&snapshot.aggregate_counts)?;
        let proof = build_inclusion_proof(&leaves, (offset + seq - 1) as usize)?;
        if proof.root != snapshot.merkle_root {
            return Err(AuditError::SnapshotMismatch {
                recorded: snapshot.merkle_root.clone(),
                computed: proof.root,
            });
        }
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::append_sealed;
    use crate::merkle::{verify_inclusion_proof, EMPTY_ROOT};
    use crate::record::ChangeEventType;
    use cmate_core::{AggregateId, UserId};

    fn populated() -> ChainSet {
        let now = Timestamp::parse("2025-11-16T16:30:00Z").unwrap();
        let mut set = ChainSet::default();
        for i in 0..3 {
            append_sealed(
                &mut set.audit,
                AuditRecord::new("view", "license").on_resource(format!("lic-{i}")),
                now,
            )
            .unwrap();
        }
        let agg = AggregateId::new();
        for seq in 1..=2 {
            append_sealed(
                &mut set.changes,
                ChangeEvent::new("license", agg, seq, ChangeEventType::Updated, serde_json::json!({"seq": seq})),
                now,
            )
            .unwrap();
        }
        append_sealed(
            &mut set.keystrokes,
            KeystrokeLog::new(UserId::new(), vec![1, 2, 3]),
            now,
        )
        .unwrap();
        set
    }

    #[test]
    fn test_empty_store_snapshot() {
        let snap = ChainSet::default().snapshot(Timestamp::now(), None).unwrap();
        assert_eq!(snap.merkle_root, EMPTY_ROOT);
        assert_eq!(snap.total_rows(), 0);
    }

    #[test]
    fn test_snapshot_counts_and_verifies() {
        let set = populated();
        let snap = set
            .snapshot(Timestamp::now(), Some("s3://audit/snap-1.json".into()))
            .unwrap();
        assert_eq!(snap.count(AuditTable::AuditLogs), 3);
        assert_eq!(snap.count(AuditTable::ChangeEvents), 2);
        assert_eq!(snap.count(AuditTable::KeystrokeLogs), 1);
        set.verify_snapshot(&snap).unwrap();
    }

    #[test]
    fn test_snapshot_survives_later_appends() {
        let mut set = populated();
        let snap = set.snapshot(Timestamp::now(), None).unwrap();
        append_sealed(&mut set.audit, AuditRecord::new("export", "report"), Timestamp::now())
            .unwrap();
        set.verify_snapshot(&snap).unwrap();
    }

    #[test]
    fn test_snapshot_detects_removed_rows() {
        let mut set = populated();
        let snap = set.snapshot(Timestamp::now(), None).unwrap();
        set.changes.pop();
        assert!(matches!(
            set.verify_snapshot(&snap).unwrap_err(),
            AuditError::SnapshotRowsMissing {
                table: AuditTable::ChangeEvents,
                recorded: 2,
                present: 1
            }
        ));
    }

    #[test]
    fn test_snapshot_detects_replaced_rows() {
        let mut set = populated();
        let snap = set.snapshot(Timestamp::now(), None).unwrap();
        // Rebuild the keystroke chain with different content but the same length.
        set.keystrokes.clear();
        append_sealed(
            &mut set.keystrokes,
            KeystrokeLog::new(UserId::new(), vec![9]),
            Timestamp::now(),
        )
        .unwrap();
        assert!(matches!(
            set.verify_snapshot(&snap).unwrap_err(),
            AuditError::SnapshotMismatch { .. }
        ));
    }

    #[test]
    fn test_prove_rows_in_each_table() {
        let set = populated();
        let snap = set.snapshot(Timestamp::now(), None).unwrap();
        for (table, seq) in [
            (AuditTable::AuditLogs, 1),
            (AuditTable::AuditLogs, 3),
            (AuditTable::ChangeEvents, 2),
            (AuditTable::KeystrokeLogs, 1),
        ] {
            let proof = set.prove(&snap, table, seq).unwrap();
            assert!(verify_inclusion_proof(&proof));
        }
        let proof = set.prove(&snap, AuditTable::ChangeEvents, 1).unwrap();
        assert_eq!(proof.leaf_index, 3);
        assert_eq!(proof.integrity_hash, set.changes[0].integrity_hash());
    }

    #[test]
    fn test_prove_uncovered_row_rejected() {
        let set = populated();
        let snap = set.snapshot(Timestamp::now(), None).unwrap();
        assert!(set.prove(&snap, AuditTable::KeystrokeLogs, 2).is_err());
        assert!(set.prove(&snap, AuditTable::AuditLogs, 0).is_err());
    }

    #[test]
    fn test_snapshot_serde_uses_table_names() {
        let snap = populated().snapshot(Timestamp::now(), None).unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["aggregate_counts"]["audit_logs"], 3);
        let back: IntegritySnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }
}
