//! # cmate-audit: Append-Only Audit Store
//!
//! Write-once storage for HIPAA audit records, aggregate change events and
//! encrypted keystroke captures (45 CFR 164.312(b), audit controls).
//!
//! ## Guarantees
//!
//! - **No mutation path.** [`AuditStore`] and [`PgAuditStore`] expose
//!   `append_*` and read operations only. [`Sealed`] entries have no `&mut`
//!   accessors. In Postgres, a trigger rejects UPDATE and DELETE on every
//!   audit table regardless of which client issues them.
//!
//! - **Tamper evidence.** Each table is a hash chain: every row's
//!   `integrity_hash` covers its position, identity, predecessor hash and
//!   record. [`verify_chain`] names the first row that does not check out.
//!
//! - **Snapshots.** [`IntegritySnapshot`] commits to all three tables with
//!   one Merkle Mountain Range root, written to the immutable snapshot
//!   index and checkable later against the same row prefix.
//!
//! - **Per-aggregate ordering.** Change events carry a sequence number that
//!   must strictly increase per `(aggregate_type, aggregate_id)`; duplicates
//!   are rejected.
//!
//! ## Engines
//!
//! - [`MemoryAuditStore`]: synchronous, `parking_lot`-guarded, for tests,
//!   tools and single-process deployments.
//! - [`PgAuditStore`]: async SQLx engine with embedded migrations.

pub mod chain;
pub mod config;
pub mod error;
pub mod memory;
pub mod merkle;
pub mod pg;
pub mod query;
pub mod record;
pub mod snapshot;
pub mod store;

pub use chain::{verify_chain, ChainError, ChainRecord, ChainReport, Sealed, GENESIS_HASH};
pub use config::{ConfigError, DatabaseConfig};
pub use error::AuditError;
pub use memory::MemoryAuditStore;
pub use merkle::{build_inclusion_proof, verify_inclusion_proof, InclusionProof};
pub use pg::{classify_db_error, init_pool, PgAuditStore};
pub use query::{AuditQuery, ChangeQuery, KeystrokeQuery};
pub use record::{AuditRecord, AuditStatus, AuditTable, ChangeEvent, ChangeEventType, KeystrokeLog};
pub use snapshot::{ChainSet, IntegritySnapshot, StoreReport};
pub use store::AuditStore;
