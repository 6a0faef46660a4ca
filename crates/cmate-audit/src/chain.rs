//! # Sealed Entries and Hash Chains
//!
//! Every row the store accepts is wrapped in a [`Sealed`] entry that links
//! it to the row before it:
//!
//! ```text
//! integrity_hash = SHA256(JCS({ seq, entry_id, previous_hash, record }))
//! ```
//!
//! The first entry of a table links to [`GENESIS_HASH`]. Changing any byte
//! of any sealed field, reordering rows, or dropping a row breaks either a
//! recomputed hash or a link, and [`verify_chain`] names the first entry
//! where that happens.
//!
//! `Sealed` exposes read accessors only. The only constructor outside this
//! module is deserialization, which is exactly what verification exists to
//! check.

use cmate_core::{sha256_hex, CanonicalBytes, EventId, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AuditError;
use crate::record::{AuditRecord, AuditTable, ChangeEvent, KeystrokeLog};

/// `previous_hash` of the first entry in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A record type that can be sealed into one of the store's chains.
pub trait ChainRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The table this record type is written to.
    const TABLE: AuditTable;

    /// Check required fields before sealing.
    fn validate(&self) -> Result<(), AuditError>;

    /// The record's own time, if set.
    fn recorded_at(&self) -> Option<Timestamp>;

    /// Fill in the record time if the caller left it empty.
    fn stamp(&mut self, now: Timestamp);
}

impl ChainRecord for AuditRecord {
    const TABLE: AuditTable = AuditTable::AuditLogs;

    fn validate(&self) -> Result<(), AuditError> {
        AuditRecord::validate(self)
    }

    fn recorded_at(&self) -> Option<Timestamp> {
        self.timestamp
    }

    fn stamp(&mut self, now: Timestamp) {
        self.timestamp.get_or_insert(now);
    }
}

impl ChainRecord for ChangeEvent {
    const TABLE: AuditTable = AuditTable::ChangeEvents;

    fn validate(&self) -> Result<(), AuditError> {
        ChangeEvent::validate(self)
    }

    fn recorded_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    fn stamp(&mut self, now: Timestamp) {
        self.created_at.get_or_insert(now);
    }
}

impl ChainRecord for KeystrokeLog {
    const TABLE: AuditTable = AuditTable::KeystrokeLogs;

    fn validate(&self) -> Result<(), AuditError> {
        KeystrokeLog::validate(self)
    }

    fn recorded_at(&self) -> Option<Timestamp> {
        self.timestamp
    }

    fn stamp(&mut self, now: Timestamp) {
        self.timestamp.get_or_insert(now);
    }
}

/// A record as persisted: positioned, identified and hash-linked.
///
/// There is no `&mut` access to any field.
///
/// ```compile_fail
/// use cmate_audit::{AuditRecord, AuditStore, MemoryAuditStore};
///
/// let store = MemoryAuditStore::new();
/// let sealed = store.append_audit(AuditRecord::new("view", "license")).unwrap();
/// sealed.record_mut().action_type = "delete".into();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sealed<T> {
    seq: u64,
    entry_id: EventId,
    record: T,
    previous_hash: String,
    integrity_hash: String,
}

#[derive(Serialize)]
struct SealPreimage<'a, T> {
    seq: u64,
    entry_id: &'a EventId,
    previous_hash: &'a str,
    record: &'a T,
}

fn integrity_hash<T: Serialize>(
    seq: u64,
    entry_id: &EventId,
    previous_hash: &str,
    record: &T,
) -> Result<String, AuditError> {
    let canonical = CanonicalBytes::new(&SealPreimage {
        seq,
        entry_id,
        previous_hash,
        record,
    })?;
    Ok(sha256_hex(&canonical))
}

impl<T: ChainRecord> Sealed<T> {
    /// Seal `record` as entry `seq`, linked to `previous_hash`.
    pub(crate) fn seal(
        seq: u64,
        entry_id: EventId,
        record: T,
        previous_hash: String,
    ) -> Result<Self, AuditError> {
        let integrity_hash = integrity_hash(seq, &entry_id, &previous_hash, &record)?;
        Ok(Self {
            seq,
            entry_id,
            record,
            previous_hash,
            integrity_hash,
        })
    }

    /// Rebuild an entry from stored columns without recomputing its hash.
    pub(crate) fn from_parts(
        seq: u64,
        entry_id: EventId,
        record: T,
        previous_hash: String,
        integrity_hash: String,
    ) -> Self {
        Self {
            seq,
            entry_id,
            record,
            previous_hash,
            integrity_hash,
        }
    }

    /// 1-based position in the table's chain.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Row identity.
    pub fn entry_id(&self) -> EventId {
        self.entry_id
    }

    /// The sealed record.
    pub fn record(&self) -> &T {
        &self.record
    }

    /// Hash of the preceding entry, or [`GENESIS_HASH`].
    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// This entry's hash, hex encoded.
    pub fn integrity_hash(&self) -> &str {
        &self.integrity_hash
    }

    /// The record's time. Always set on entries produced by a store.
    pub fn recorded_at(&self) -> Option<Timestamp> {
        self.record.recorded_at()
    }

    /// Recompute this entry's hash from its fields.
    pub fn recompute_hash(&self) -> Result<String, AuditError> {
        integrity_hash(self.seq, &self.entry_id, &self.previous_hash, &self.record)
    }

    /// Unwrap into the record.
    pub fn into_record(self) -> T {
        self.record
    }
}

/// Result of a successful chain verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    /// Verified table.
    pub table: AuditTable,
    /// Number of entries verified.
    pub length: u64,
    /// `integrity_hash` of the last entry, or [`GENESIS_HASH`] if empty.
    pub head: String,
}

/// First point at which a chain fails verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// An entry is not at the position its `seq` claims.
    #[error("{table}: entry at index {index} has seq {found}, expected {expected}")]
    SequenceGap {
        /// Table.
        table: AuditTable,
        /// Position in the verified slice.
        index: usize,
        /// Expected seq.
        expected: u64,
        /// Stored seq.
        found: u64,
    },

    /// `previous_hash` does not match the preceding entry.
    #[error("{table}: seq {seq} links to {found}, expected {expected}")]
    BrokenLink {
        /// Table.
        table: AuditTable,
        /// Offending entry.
        seq: u64,
        /// Hash of the preceding entry.
        expected: String,
        /// Stored `previous_hash`.
        found: String,
    },

    /// Stored `integrity_hash` does not match the entry's contents.
    #[error("{table}: seq {seq} integrity hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        /// Table.
        table: AuditTable,
        /// Offending entry.
        seq: u64,
        /// Stored hash.
        stored: String,
        /// Recomputed hash.
        computed: String,
    },

    /// An entry could not be canonicalized.
    #[error("{table}: seq {seq} could not be hashed: {reason}")]
    Unhashable {
        /// Table.
        table: AuditTable,
        /// Offending entry.
        seq: u64,
        /// Underlying error.
        reason: String,
    },
}

/// Verify a complete chain, starting from genesis.
pub fn verify_chain<T: ChainRecord>(entries: &[Sealed<T>]) -> Result<ChainReport, ChainError> {
    let table = T::TABLE;
    let mut previous = GENESIS_HASH.to_string();

    for (index, entry) in entries.iter().enumerate() {
        let expected = index as u64 + 1;
        if entry.seq != expected {
            return Err(ChainError::SequenceGap {
                table,
                index,
                expected,
                found: entry.seq,
            });
        }
        if entry.previous_hash != previous {
            return Err(ChainError::BrokenLink {
                table,
                seq: entry.seq,
                expected: previous,
                found: entry.previous_hash.clone(),
            });
        }
        let computed = entry.recompute_hash().map_err(|e| ChainError::Unhashable {
            table,
            seq: entry.seq,
            reason: e.to_string(),
        })?;
        if computed != entry.integrity_hash {
            return Err(ChainError::HashMismatch {
                table,
                seq: entry.seq,
                stored: entry.integrity_hash.clone(),
                computed,
            });
        }
        previous = computed;
    }

    Ok(ChainReport {
        table,
        length: entries.len() as u64,
        head: previous,
    })
}

/// Seal `record` onto the end of `chain`.
///
/// Validates, stamps the record time, links to the current head and pushes.
pub(crate) fn append_sealed<T: ChainRecord>(
    chain: &mut Vec<Sealed<T>>,
    mut record: T,
    now: Timestamp,
) -> Result<Sealed<T>, AuditError> {
    record.validate()?;
    record.stamp(now);
    let previous_hash = chain
        .last()
        .map(|e| e.integrity_hash.clone())
        .unwrap_or_else(|| GENESIS_HASH.to_string());
    let sealed = Sealed::seal(chain.len() as u64 + 1, EventId::new(), record, previous_hash)?;
    chain.push(sealed.clone());
    Ok(sealed)
}
