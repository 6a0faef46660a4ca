//! # Append-Only Issue Log
//!
//! One JSON object per line. The file starts with a `#` comment header,
//! written once when the first line is appended. Lines are never edited or
//! removed; lifecycle changes are appended as [`StatusUpdate`] lines and
//! folded into [`IssueRecord`]s on read.
//!
//! Every append validates first and only then opens the file, so a rejected
//! line leaves the log byte-identical. Writes go through `O_APPEND` as a
//! single buffer.
//!
//! The log assumes a single writer: the duplicate-id and stale-status
//! checks read the file and then append without a lock between the two.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cmate_core::{IssueId, Timestamp};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::IssueLogError;
use crate::lifecycle::IssueRecord;
use crate::schema::{IssueLogEntry, IssueStatus, LogLine, StatusUpdate};
use crate::validate::IssueValidator;

/// Version of the line format, recorded in the header.
pub const SCHEMA_VERSION: &str = "1.0";

/// Counts over the current state of every issue in the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueSummary {
    pub total_issues: usize,
    pub new_count: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_repo: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

/// Handle to a JSONL issue log at a fixed path.
#[derive(Debug)]
pub struct IssueLog {
    path: PathBuf,
    validator: IssueValidator,
}

impl IssueLog {
    /// Prepare a log at `path`. The file is not touched until the first
    /// append; a missing file reads as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IssueLogError> {
        Ok(Self {
            path: path.into(),
            validator: IssueValidator::new()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every line of the log in file order.
    ///
    /// Blank lines and `#` comments are skipped. Lines that are not JSON
    /// objects of a known shape are skipped with a warning; they are never
    /// rewritten.
    pub fn read_lines(&self) -> Result<Vec<LogLine>, IssueLogError> {
        Ok(self
            .read_values()?
            .into_iter()
            .filter_map(|(number, value)| match LogLine::from_value(value) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = number,
                        error = %e,
                        "skipping issue log line of unknown shape"
                    );
                    None
                }
            })
            .collect())
    }

    /// Every line that parses as JSON, with its 1-based line number.
    /// Lines that are not UTF-8 or not JSON are skipped with a warning.
    fn read_values(&self) -> Result<Vec<(usize, Value)>, IssueLogError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IssueLogError::io(&self.path, e)),
        };

        let mut values = Vec::new();
        for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
            let number = index + 1;
            let text = match std::str::from_utf8(raw) {
                Ok(text) => text.trim(),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = number,
                        error = %e,
                        "skipping non-UTF-8 issue log line"
                    );
                    continue;
                }
            };
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(value) => values.push((number, value)),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = number,
                    error = %e,
                    "skipping malformed issue log line"
                ),
            }
        }
        Ok(values)
    }

    /// Issue lines only, as originally logged.
    pub fn entries(&self) -> Result<Vec<IssueLogEntry>, IssueLogError> {
        Ok(self
            .read_lines()?
            .into_iter()
            .filter_map(|line| match line {
                LogLine::Issue(entry) => Some(entry),
                LogLine::StatusUpdate(_) => None,
            })
            .collect())
    }

    /// Current state of every issue, in the order issues were logged.
    pub fn issues(&self) -> Result<Vec<IssueRecord>, IssueLogError> {
        Ok(fold(self.read_lines()?))
    }

    pub fn get(&self, issue_id: IssueId) -> Result<Option<IssueRecord>, IssueLogError> {
        Ok(self
            .issues()?
            .into_iter()
            .find(|r| r.issue_id() == issue_id))
    }

    /// Validate a new issue line against the schema and the log contents.
    ///
    /// The id must not appear on any parseable issue-shaped line, including
    /// lines that fail to decode as a full issue.
    pub fn validate(&self, value: &Value) -> Result<IssueLogEntry, IssueLogError> {
        let entry = self.validator.validate_issue(value)?;
        let wanted = entry.issue_id.to_string();
        let taken = self.read_values()?.iter().any(|(_, line)| {
            line.get("previous_status").is_none()
                && line
                    .get("issue_id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| id.eq_ignore_ascii_case(&wanted))
        });
        if taken {
            return Err(IssueLogError::DuplicateIssueId(entry.issue_id));
        }
        Ok(entry)
    }

    /// Validate and append a new issue line. The value is written as given,
    /// in compact form.
    pub fn append(&self, value: &Value) -> Result<IssueLogEntry, IssueLogError> {
        let entry = self.validate(value)?;
        self.write_line(value)?;
        debug!(
            issue_id = %entry.issue_id,
            repo = %entry.repo,
            severity = %entry.severity,
            "issue appended"
        );
        Ok(entry)
    }

    pub fn append_entry(&self, entry: &IssueLogEntry) -> Result<(), IssueLogError> {
        self.append(&serde_json::to_value(entry)?).map(|_| ())
    }

    /// Validate a status-update line against the schema and the current
    /// state of its issue.
    pub fn validate_status_update(&self, value: &Value) -> Result<StatusUpdate, IssueLogError> {
        let update = self.validator.validate_status_update(value)?;
        self.current(update.issue_id)?.check(&update)?;
        Ok(update)
    }

    /// Validate and append a status update, returning the issue's new state.
    pub fn append_status_update(&self, update: &StatusUpdate) -> Result<IssueRecord, IssueLogError> {
        let value = serde_json::to_value(update)?;
        let update = self.validator.validate_status_update(&value)?;
        let mut record = self.current(update.issue_id)?;
        record.apply(&update)?;
        self.write_line(&value)?;
        debug!(
            issue_id = %update.issue_id,
            from = %update.previous_status,
            to = %update.status,
            "status update appended"
        );
        Ok(record)
    }

    /// Move an issue to `to`, taking `previous_status` and attempts from
    /// the log. Entering `FIXED` counts as one more fix attempt.
    pub fn transition(
        &self,
        issue_id: IssueId,
        to: IssueStatus,
        updated_by: &str,
        fix_summary: Option<&str>,
    ) -> Result<IssueRecord, IssueLogError> {
        let current = self.current(issue_id)?;
        let mut update = StatusUpdate::new(issue_id, current.status, to, updated_by);
        update.attempts = if to == IssueStatus::Fixed {
            current
                .attempts
                .checked_add(1)
                .ok_or(IssueLogError::AttemptsExhausted(issue_id))?
        } else {
            current.attempts
        };
        update.fix_summary = fix_summary
            .map(str::to_string)
            .unwrap_or(current.fix_summary);
        self.append_status_update(&update)
    }

    /// Issues whose current status is `NEW`.
    pub fn list_new(&self) -> Result<Vec<IssueRecord>, IssueLogError> {
        Ok(self
            .issues()?
            .into_iter()
            .filter(|r| r.status == IssueStatus::New)
            .collect())
    }

    pub fn summarize(&self) -> Result<IssueSummary, IssueLogError> {
        Ok(summarize(&self.issues()?))
    }

    fn current(&self, issue_id: IssueId) -> Result<IssueRecord, IssueLogError> {
        self.get(issue_id)?
            .ok_or(IssueLogError::UnknownIssue(issue_id))
    }

    fn write_line(&self, value: &Value) -> Result<(), IssueLogError> {
        let line = serde_json::to_string(value)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| IssueLogError::io(parent, e))?;
            }
        }
        let mut buf = String::new();
        match self.last_byte()? {
            None => buf.push_str(&header(Timestamp::now())),
            Some(b'\n') => {}
            Some(_) => buf.push('\n'),
        }
        buf.push_str(&line);
        buf.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| IssueLogError::io(&self.path, e))?;
        file.write_all(buf.as_bytes())
            .map_err(|e| IssueLogError::io(&self.path, e))
    }

    /// Final byte of the file; `None` when it is missing or empty.
    fn last_byte(&self) -> Result<Option<u8>, IssueLogError> {
        let mut file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IssueLogError::io(&self.path, e)),
        };
        let len = file
            .metadata()
            .map_err(|e| IssueLogError::io(&self.path, e))?
            .len();
        if len == 0 {
            return Ok(None);
        }
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|e| IssueLogError::io(&self.path, e))?;
        Ok(Some(last[0]))
    }
}

fn header(created: Timestamp) -> String {
    format!(
        "# SOC2 TYPE II COMPLIANT ISSUE LOG\n\
         # CREATED: {created}\n\
         # SCHEMA_VERSION: {SCHEMA_VERSION}\n\
         # RETENTION: Indefinite (audit trail)\n\
         # INTEGRITY: Append-only JSONL, never modify prior entries\n\
         \n"
    )
}

/// Fold lines into per-issue state. Lines that contradict what came before
/// (a repeated issue id, an update for an unknown issue, an illegal or stale
/// transition) are skipped with a warning.
pub fn fold(lines: Vec<LogLine>) -> Vec<IssueRecord> {
    let mut records: Vec<IssueRecord> = Vec::new();
    let mut index: HashMap<IssueId, usize> = HashMap::new();

    for line in lines {
        match line {
            LogLine::Issue(entry) => {
                if index.contains_key(&entry.issue_id) {
                    warn!(issue_id = %entry.issue_id, "ignoring repeated issue line");
                    continue;
                }
                index.insert(entry.issue_id, records.len());
                records.push(IssueRecord::new(entry));
            }
            LogLine::StatusUpdate(update) => {
                let Some(&i) = index.get(&update.issue_id) else {
                    warn!(issue_id = %update.issue_id, "ignoring update for unknown issue");
                    continue;
                };
                if let Err(e) = records[i].apply(&update) {
                    warn!(issue_id = %update.issue_id, error = %e, "ignoring inapplicable update");
                }
            }
        }
    }
    records
}

pub fn summarize(records: &[IssueRecord]) -> IssueSummary {
    let mut summary = IssueSummary {
        total_issues: records.len(),
        ..IssueSummary::default()
    };
    for r in records {
        if r.status == IssueStatus::New {
            summary.new_count += 1;
        }
        *summary.by_status.entry(r.status.to_string()).or_default() += 1;
        *summary.by_severity.entry(r.entry.severity.to_string()).or_default() += 1;
        *summary.by_repo.entry(r.entry.repo.to_string()).or_default() += 1;
        *summary.by_type.entry(r.entry.issue_type.to_string()).or_default() += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::IssueDraft;
    use crate::schema::{IssueType, Repo, Severity};

    fn entry(repo: Repo, severity: Severity) -> IssueLogEntry {
        IssueDraft::new(repo, "agent-7", severity, IssueType::Security, "Session cookie lacks SameSite")
            .description("The session cookie is issued without a SameSite attribute.")
            .repro("Inspect Set-Cookie after login")
            .root_cause_guess("Framework default changed")
            .build()
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = IssueLog::open(dir.path().join("none.jsonl")).unwrap();
        assert!(log.read_lines().unwrap().is_empty());
        assert_eq!(log.summarize().unwrap(), IssueSummary::default());
    }

    #[test]
    fn test_header_written_once_and_dirs_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/issues/log.jsonl");
        let log = IssueLog::open(&path).unwrap();
        log.append_entry(&entry(Repo::App, Severity::High)).unwrap();
        log.append_entry(&entry(Repo::App, Severity::Low)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# SOC2 TYPE II COMPLIANT ISSUE LOG\n"));
        assert_eq!(text.matches("# SCHEMA_VERSION: 1.0").count(), 1);
        let json_lines: Vec<&str> = text.lines().filter(|l| l.starts_with('{')).collect();
        assert_eq!(json_lines.len(), 2);
        assert!(!json_lines[0].contains(": "), "lines are compact");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let log = IssueLog::open(&path).unwrap();
        log.append_entry(&entry(Repo::Docs, Severity::Low)).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"not json\n\n{\"issue_id\": 5}\n").unwrap();

        assert_eq!(log.read_lines().unwrap().len(), 1);
    }

    #[test]
    fn test_fold_ignores_repeated_issue_lines() {
        let e = entry(Repo::App, Severity::High);
        let mut second = e.clone();
        second.title = "A different title entirely".to_string();
        let records = fold(vec![LogLine::Issue(e.clone()), LogLine::Issue(second)]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry.title, e.title);
    }

    #[test]
    fn test_summary_counts_current_state() {
        let a = entry(Repo::App, Severity::High);
        let b = entry(Repo::Infra, Severity::High);
        let update = StatusUpdate::new(a.issue_id, IssueStatus::New, IssueStatus::Triaged, "bot");
        let records = fold(vec![
            LogLine::Issue(a),
            LogLine::Issue(b),
            LogLine::StatusUpdate(update),
        ]);
        let s = summarize(&records);
        assert_eq!(s.total_issues, 2);
        assert_eq!(s.new_count, 1);
        assert_eq!(s.by_status.get("TRIAGED"), Some(&1));
        assert_eq!(s.by_status.get("NEW"), Some(&1));
        assert_eq!(s.by_severity.get("HIGH"), Some(&2));
        assert_eq!(s.by_repo.get("credentialmate-infra"), Some(&1));
        assert_eq!(s.by_type.get("security"), Some(&2));
    }

    #[test]
    fn test_transition_counts_fix_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let log = IssueLog::open(dir.path().join("log.jsonl")).unwrap();
        let e = entry(Repo::App, Severity::Critical);
        log.append_entry(&e).unwrap();

        log.transition(e.issue_id, IssueStatus::Triaged, "bot", None).unwrap();
        log.transition(e.issue_id, IssueStatus::InProgress, "bot", None).unwrap();
        let fixed = log
            .transition(e.issue_id, IssueStatus::Fixed, "bot", Some("Set SameSite=Lax"))
            .unwrap();
        assert_eq!(fixed.attempts, 1);
        assert_eq!(fixed.fix_summary, "Set SameSite=Lax");

        let reread = log.get(e.issue_id).unwrap().unwrap();
        assert_eq!(reread, fixed);
    }

    #[test]
    fn test_header_mentions_integrity_rule() {
        let h = header(Timestamp::parse("2025-11-16T00:00:00Z").unwrap());
        assert!(h.contains("# CREATED: 2025-11-16T00:00:00Z\n"));
        assert!(h.contains("Append-only JSONL, never modify prior entries"));
        assert!(h.ends_with("\n\n"));
    }
}
