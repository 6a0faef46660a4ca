//! # cmate-issues: Append-Only Issue Log
//!
//! The CredentialMate triage log: a JSONL file where agents and engineers
//! record bugs, debt and compliance findings across the CredentialMate
//! repositories.
//!
//! - Every line is checked against an embedded JSON Schema before the file
//!   is opened ([`IssueValidator`]).
//! - Issue ids are canonical UUID4 strings, unique among issue lines.
//! - Nothing is rewritten. Status changes are appended as [`StatusUpdate`]
//!   lines and must follow the lifecycle in [`lifecycle`].
//! - Reads fold the file into current per-issue state ([`IssueRecord`])
//!   for listing and summaries.

pub mod config;
pub mod draft;
pub mod error;
pub mod lifecycle;
pub mod log;
pub mod schema;
pub mod validate;

pub use config::{IssueLogConfig, DEFAULT_LOG_PATH};
pub use draft::IssueDraft;
pub use error::{IssueLogError, ValidationViolations, Violation};
pub use lifecycle::{IssueRecord, StatusTransition};
pub use log::{IssueLog, IssueSummary, SCHEMA_VERSION};
pub use schema::{
    IssueLogEntry, IssueStatus, IssueType, LogLine, Repo, Severity, StatusUpdate,
};
pub use validate::IssueValidator;
