//! Issue-log error types.

use std::fmt;
use std::path::PathBuf;

use cmate_core::IssueId;
use thiserror::Error;

use crate::schema::IssueStatus;

/// Errors from validating, appending to or reading the issue log.
#[derive(Error, Debug)]
pub enum IssueLogError {
    /// The line failed JSON Schema validation.
    #[error("{kind} failed schema validation: {}", .violations.first_message())]
    Schema {
        /// `issue` or `status update`.
        kind: &'static str,
        violations: ValidationViolations,
    },

    /// `timestamp_utc` matched the schema pattern but is not a real instant.
    #[error("invalid timestamp_utc {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// An issue line with this id already exists.
    #[error("duplicate issue_id {0}")]
    DuplicateIssueId(IssueId),

    /// A status update names an issue the log does not contain.
    #[error("unknown issue_id {0}")]
    UnknownIssue(IssueId),

    /// New issues enter the log at `NEW`.
    #[error("new issue must have status NEW, got {0}")]
    InitialStatus(IssueStatus),

    /// The update was written against an out-of-date view of the issue.
    #[error("stale update for {issue_id}: previous_status {found} but current status is {expected}")]
    StaleStatus {
        issue_id: IssueId,
        expected: IssueStatus,
        found: IssueStatus,
    },

    /// Not a permitted lifecycle transition.
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },

    /// No transitions leave this status.
    #[error("issue {issue_id} is in terminal status {status}")]
    TerminalState {
        issue_id: IssueId,
        status: IssueStatus,
    },

    /// The fix-attempt counter is already at its maximum.
    #[error("issue {0} has no fix attempts left to count")]
    AttemptsExhausted(IssueId),

    /// An issue listed itself in `blocked_by` or `depends_on`.
    #[error("issue {0} references itself in {1}")]
    SelfReference(IssueId, &'static str),

    /// An embedded schema failed to compile.
    #[error("schema build error for {schema}: {reason}")]
    SchemaBuild { schema: &'static str, reason: String },

    /// The line is not a JSON object of the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IssueLogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON Pointer to the offending value in the line.
    pub instance_path: String,
    /// JSON Pointer to the schema keyword that rejected it.
    pub schema_path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance_path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.instance_path, self.message)
        }
    }
}

/// Every violation reported for one line, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationViolations {
    violations: Vec<Violation>,
}

impl ValidationViolations {
    pub(crate) fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// The first violation, if any.
    pub fn first(&self) -> Option<&Violation> {
        self.violations.first()
    }

    pub fn into_inner(self) -> Vec<Violation> {
        self.violations
    }

    fn first_message(&self) -> String {
        match self.violations.as_slice() {
            [] => "no violations".to_string(),
            [only] => only.to_string(),
            [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
        }
    }
}

impl fmt::Display for ValidationViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {v}")?;
        }
        Ok(())
    }
}
