//! # Line Validation
//!
//! Two passes, both before any byte reaches the log file:
//!
//! 1. **Shape.** The raw JSON is checked against the embedded Draft 2020-12
//!    schema for its line kind. This covers presence, types, enums, string
//!    lengths, the UUID4 pattern and `attempts >= 0`, and reports every
//!    violation with its instance path.
//! 2. **Meaning.** The typed line is checked for what a schema cannot see:
//!    a real UTC instant, `NEW` as the initial status, no self-references.
//!
//! Checks against existing log contents (duplicate ids, stale updates)
//! live in [`crate::log::IssueLog`].

use jsonschema::{Draft, Validator};
use serde_json::Value;

use cmate_core::Timestamp;

use crate::error::{IssueLogError, ValidationViolations, Violation};
use crate::schema::{IssueLogEntry, IssueStatus, LogLine, StatusUpdate};

const ISSUE_SCHEMA: &str = include_str!("../schemas/issue.schema.json");
const STATUS_UPDATE_SCHEMA: &str = include_str!("../schemas/status-update.schema.json");

/// Compiled validators for both line kinds.
pub struct IssueValidator {
    issue: Validator,
    status_update: Validator,
}

impl std::fmt::Debug for IssueValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueValidator").finish_non_exhaustive()
    }
}

impl IssueValidator {
    /// Compile the embedded schemas.
    pub fn new() -> Result<Self, IssueLogError> {
        Ok(Self {
            issue: compile("issue.schema.json", ISSUE_SCHEMA)?,
            status_update: compile("status-update.schema.json", STATUS_UPDATE_SCHEMA)?,
        })
    }

    /// Validate and decode a new issue line.
    pub fn validate_issue(&self, value: &Value) -> Result<IssueLogEntry, IssueLogError> {
        check_shape(&self.issue, "issue", value)?;
        check_timestamp(value)?;
        let entry: IssueLogEntry = serde_json::from_value(value.clone())?;
        if entry.status != IssueStatus::New {
            return Err(IssueLogError::InitialStatus(entry.status));
        }
        if entry.blocked_by.contains(&entry.issue_id) {
            return Err(IssueLogError::SelfReference(entry.issue_id, "blocked_by"));
        }
        if entry.depends_on.contains(&entry.issue_id) {
            return Err(IssueLogError::SelfReference(entry.issue_id, "depends_on"));
        }
        Ok(entry)
    }

    /// Validate and decode a status-update line.
    pub fn validate_status_update(&self, value: &Value) -> Result<StatusUpdate, IssueLogError> {
        check_shape(&self.status_update, "status update", value)?;
        check_timestamp(value)?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Validate either kind of line, chosen by the presence of
    /// `previous_status`.
    pub fn validate_line(&self, value: &Value) -> Result<LogLine, IssueLogError> {
        if LogLine::is_status_update(value) {
            self.validate_status_update(value).map(LogLine::StatusUpdate)
        } else {
            self.validate_issue(value).map(LogLine::Issue)
        }
    }
}

fn compile(name: &'static str, source: &str) -> Result<Validator, IssueLogError> {
    let schema: Value = serde_json::from_str(source).map_err(|e| IssueLogError::SchemaBuild {
        schema: name,
        reason: e.to_string(),
    })?;
    let mut opts = jsonschema::options();
    opts.with_draft(Draft::Draft202012);
    opts.build(&schema).map_err(|e| IssueLogError::SchemaBuild {
        schema: name,
        reason: e.to_string(),
    })
}

fn check_shape(validator: &Validator, kind: &'static str, value: &Value) -> Result<(), IssueLogError> {
    let violations: Vec<Violation> = validator
        .iter_errors(value)
        .map(|e| Violation {
            instance_path: e.instance_path.to_string(),
            schema_path: e.schema_path.to_string(),
            message: e.to_string(),
        })
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(IssueLogError::Schema {
            kind,
            violations: ValidationViolations::new(violations),
        })
    }
}

// The schema pattern admits e.g. month 13.
fn check_timestamp(value: &Value) -> Result<(), IssueLogError> {
    let raw = value
        .get("timestamp_utc")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Timestamp::parse(raw)
        .map(|_| ())
        .map_err(|e| IssueLogError::InvalidTimestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
