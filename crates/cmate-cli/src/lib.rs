//! # cmate-cli: CredentialMate Audit Tooling
//!
//! Argument definitions and handlers for the `cmate` binary.
//!
//! ## Subcommands
//!
//! - `issues`: append to, transition and summarize the JSONL issue log
//! - `audit`: migrate the Postgres audit store, verify its hash chains,
//!   record and check integrity snapshots
//!
//! Handlers write their results to a caller-supplied writer and leave
//! logging (stderr) to `tracing`. Domain rules live in `cmate-issues` and
//! `cmate-audit`; nothing here bypasses them.

pub mod audit;
pub mod issues;
pub mod output;
