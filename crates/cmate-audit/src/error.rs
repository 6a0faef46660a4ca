//! # Audit Store Errors
//!
//! Write failures propagate to the caller unchanged; nothing in this crate
//! retries. Immutability violations and chain breaks are never transient.

use cmate_core::{CanonicalizationError, CryptoError, Timestamp};
use thiserror::Error;

use crate::chain::ChainError;
use crate::record::AuditTable;

/// Errors raised by the audit store.
#[derive(Error, Debug)]
pub enum AuditError {
    /// A required field was absent or empty.
    #[error("{table}: required field '{field}' is missing or empty")]
    MissingField {
        /// Table the record was destined for.
        table: AuditTable,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A field violated a length, enum, or consistency constraint.
    #[error("{table}: field '{field}' is invalid: {reason}")]
    InvalidField {
        /// Table the record was destined for.
        table: AuditTable,
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// `(aggregate_type, aggregate_id, event_seq)` already exists.
    #[error("change event {aggregate_type}/{aggregate_id} seq {event_seq} already exists")]
    DuplicateSequence {
        /// Aggregate type.
        aggregate_type: String,
        /// Aggregate id.
        aggregate_id: String,
        /// The repeated sequence number.
        event_seq: i64,
    },

    /// A change event sequence number did not increase.
    #[error("change event {aggregate_type}/{aggregate_id} seq {attempted} does not follow last seq {last_seq}")]
    SequenceRegression {
        /// Aggregate type.
        aggregate_type: String,
        /// Aggregate id.
        aggregate_id: String,
        /// Highest sequence number already stored.
        last_seq: i64,
        /// The rejected sequence number.
        attempted: i64,
    },

    /// A time-range filter had `start > end`.
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange {
        /// Range start.
        start: Timestamp,
        /// Range end.
        end: Timestamp,
    },

    /// The principal may not read this part of the audit trail.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An UPDATE or DELETE reached an immutable table.
    #[error("cannot modify {table}: {detail}")]
    Immutable {
        /// The protected table.
        table: AuditTable,
        /// Message raised by the data layer.
        detail: String,
    },

    /// Hash-chain verification failed.
    #[error("chain verification failed: {0}")]
    Chain(#[from] ChainError),

    /// A snapshot counts more rows than the table now holds.
    #[error("snapshot counted {recorded} rows in {table}, only {present} present")]
    SnapshotRowsMissing {
        /// Table.
        table: AuditTable,
        /// Rows counted at snapshot time.
        recorded: u64,
        /// Rows present now.
        present: u64,
    },

    /// Recomputed Merkle root differs from the snapshot's.
    #[error("snapshot root mismatch: recorded {recorded}, computed {computed}")]
    SnapshotMismatch {
        /// Root stored in the snapshot.
        recorded: String,
        /// Root recomputed from current rows.
        computed: String,
    },

    /// Record could not be canonicalized for hashing.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Digest or Merkle computation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A value could not be converted to or from JSON for storage.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row could not be decoded.
    #[error("row decode error in {table}: {reason}")]
    RowDecode {
        /// Source table.
        table: AuditTable,
        /// Decode failure.
        reason: String,
    },

    /// Database error, propagated unchanged.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
