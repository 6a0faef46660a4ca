//! # cmate-core: Foundational Types for CredentialMate Audit Infrastructure
//!
//! Every other crate in the workspace depends on `cmate-core`; it depends on
//! nothing internal. It defines the primitives that the audit store and the
//! issue log build their invariants on.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** `UserId`, `ProviderId`, `OrgId`,
//!    `AggregateId`, `IssueId`; no bare UUIDs or strings crossing crate
//!    boundaries.
//!
//! 2. **`CanonicalBytes` newtype.** All hash-chain and Merkle computation
//!    flows through `CanonicalBytes::new()`. No raw `serde_json::to_vec()`
//!    for digests.
//!
//! 3. **UTC-only timestamps.** `Timestamp` enforces UTC with Z suffix and
//!    seconds precision, so the same instant always hashes the same way.
//!
//! 4. **Typed principal.** The acting user is a `Principal` struct with a
//!    `Role` enum and named org/provider fields, never an untyped map.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `cmate-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod principal;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, tagged_digest, ContentDigest};
pub use error::{CanonicalizationError, CmateError, CryptoError};
pub use identity::{AggregateId, EventId, IssueId, OrgId, ProviderId, SessionId, UserId};
pub use principal::{Principal, Role};
pub use temporal::Timestamp;
