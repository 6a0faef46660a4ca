//! # Issue Lifecycle
//!
//! ```text
//! NEW -> TRIAGED -> IN_PROGRESS -> FIXED   -> VERIFIED -> CLOSED
//!                               -> WONTFIX -> VERIFIED
//! FIXED | VERIFIED | CLOSED -> REGRESSION
//! ```
//!
//! `REGRESSION` is terminal: a regressed fix is re-filed as a new issue
//! that `depends_on` the old one.
//!
//! [`IssueRecord`] is the current state of one issue, folded from its
//! issue line and every status update that follows it.

use cmate_core::{IssueId, Timestamp};
use serde::Serialize;

use crate::error::IssueLogError;
use crate::schema::{IssueLogEntry, IssueStatus, StatusUpdate};

impl IssueStatus {
    /// Statuses reachable in one step.
    pub fn valid_transitions(&self) -> &'static [IssueStatus] {
        use IssueStatus::*;
        match self {
            New => &[Triaged],
            Triaged => &[InProgress],
            InProgress => &[Fixed, Wontfix],
            Fixed => &[Verified, Regression],
            Wontfix => &[Verified],
            Verified => &[Closed, Regression],
            Closed => &[Regression],
            Regression => &[],
        }
    }

    pub fn can_transition_to(&self, to: IssueStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Whether no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

/// One applied status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub from: IssueStatus,
    pub to: IssueStatus,
    pub at: Timestamp,
    pub by: String,
}

/// Current state of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRecord {
    /// The issue line as first logged.
    pub entry: IssueLogEntry,
    pub status: IssueStatus,
    pub attempts: u32,
    pub fix_summary: String,
    /// Time of the last applied line.
    pub updated_at: Timestamp,
    pub history: Vec<StatusTransition>,
}

impl IssueRecord {
    pub fn new(entry: IssueLogEntry) -> Self {
        Self {
            status: entry.status,
            attempts: entry.attempts,
            fix_summary: entry.fix_summary.clone(),
            updated_at: entry.timestamp_utc,
            history: Vec::new(),
            entry,
        }
    }

    pub fn issue_id(&self) -> IssueId {
        self.entry.issue_id
    }

    /// Check that `update` is applicable without changing anything.
    pub fn check(&self, update: &StatusUpdate) -> Result<(), IssueLogError> {
        if update.issue_id != self.issue_id() {
            return Err(IssueLogError::UnknownIssue(update.issue_id));
        }
        self.require_state(update.previous_status, update.status)
    }

    /// Apply a status update.
    pub fn apply(&mut self, update: &StatusUpdate) -> Result<(), IssueLogError> {
        self.check(update)?;
        self.do_transition(update);
        Ok(())
    }

    fn require_state(&self, observed: IssueStatus, to: IssueStatus) -> Result<(), IssueLogError> {
        if self.status.is_terminal() {
            return Err(IssueLogError::TerminalState {
                issue_id: self.issue_id(),
                status: self.status,
            });
        }
        if observed != self.status {
            return Err(IssueLogError::StaleStatus {
                issue_id: self.issue_id(),
                expected: self.status,
                found: observed,
            });
        }
        if !self.status.can_transition_to(to) {
            return Err(IssueLogError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    fn do_transition(&mut self, update: &StatusUpdate) {
        self.history.push(StatusTransition {
            from: self.status,
            to: update.status,
            at: update.timestamp_utc,
            by: update.updated_by.clone(),
        });
        self.status = update.status;
        self.attempts = update.attempts;
        self.fix_summary = update.fix_summary.clone();
        self.updated_at = update.timestamp_utc;
    }
}
