//! # Issue Log Line Types
//!
//! Typed forms of the two kinds of line the log holds:
//!
//! - [`IssueLogEntry`]: a new issue, written once.
//! - [`StatusUpdate`]: a lifecycle change of an existing issue. Issues are
//!   never edited in place; each change is its own line.
//!
//! Wire names match the JSON Schemas under `schemas/`: `type` for the issue
//! kind, SCREAMING_SNAKE statuses and severities, lowercase kinds.

use cmate_core::{IssueId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Repositories an issue may be filed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Repo {
    /// Web application and API.
    #[serde(rename = "credentialmate-app")]
    App,
    /// Infrastructure as code.
    #[serde(rename = "credentialmate-infra")]
    Infra,
    /// State licensing rules.
    #[serde(rename = "credentialmate-rules")]
    Rules,
    /// Notification service.
    #[serde(rename = "credentialmate-notification")]
    Notification,
    /// Shared schemas.
    #[serde(rename = "credentialmate-schemas")]
    Schemas,
    /// Document extraction and AI services.
    #[serde(rename = "credentialmate-ai")]
    Ai,
    /// Documentation.
    #[serde(rename = "credentialmate-docs")]
    Docs,
}

impl Repo {
    /// Every accepted repository.
    pub const ALL: [Repo; 7] = [
        Repo::App,
        Repo::Infra,
        Repo::Rules,
        Repo::Notification,
        Repo::Schemas,
        Repo::Ai,
        Repo::Docs,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "credentialmate-app",
            Self::Infra => "credentialmate-infra",
            Self::Rules => "credentialmate-rules",
            Self::Notification => "credentialmate-notification",
            Self::Schemas => "credentialmate-schemas",
            Self::Ai => "credentialmate-ai",
            Self::Docs => "credentialmate-docs",
        }
    }
}

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Production down or data at risk.
    Critical,
    /// Major feature broken.
    High,
    /// Degraded behaviour with a workaround.
    Medium,
    /// Cosmetic or minor.
    Low,
}

impl Severity {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Kind of issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Bug,
    Enhancement,
    TechDebt,
    Security,
    Documentation,
    Performance,
    Compliance,
}

impl IssueType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Enhancement => "enhancement",
            Self::TechDebt => "tech_debt",
            Self::Security => "security",
            Self::Documentation => "documentation",
            Self::Performance => "performance",
            Self::Compliance => "compliance",
        }
    }
}

/// Lifecycle status. Transitions are defined in [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    /// Logged, not yet looked at.
    New,
    /// Reviewed and prioritized.
    Triaged,
    /// Being worked on.
    InProgress,
    /// Fix landed.
    Fixed,
    /// Fix confirmed.
    Verified,
    /// Done.
    Closed,
    /// Will not be fixed.
    Wontfix,
    /// A verified fix stopped working.
    Regression,
}

impl IssueStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Triaged => "TRIAGED",
            Self::InProgress => "IN_PROGRESS",
            Self::Fixed => "FIXED",
            Self::Verified => "VERIFIED",
            Self::Closed => "CLOSED",
            Self::Wontfix => "WONTFIX",
            Self::Regression => "REGRESSION",
        }
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|_| format!("unknown issue status {s:?}"))
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Repo, Severity, IssueType, IssueStatus);

/// One issue line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLogEntry {
    /// Canonical UUID4.
    pub issue_id: IssueId,
    /// When the issue was logged.
    pub timestamp_utc: Timestamp,
    /// Affected repository.
    pub repo: Repo,
    /// Reporting agent or person.
    pub agent: String,
    /// Severity.
    pub severity: Severity,
    /// Kind.
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// Status at logging time.
    pub status: IssueStatus,
    /// 10 to 200 characters.
    pub title: String,
    /// At least 20 characters.
    pub description: String,
    /// At least 10 characters.
    pub repro: String,
    /// At least 10 characters.
    pub root_cause_guess: String,
    /// Issues that must be resolved first.
    pub blocked_by: Vec<IssueId>,
    /// Issues this one builds on.
    pub depends_on: Vec<IssueId>,
    /// Fix attempts so far.
    pub attempts: u32,
    /// Summary of the fix, empty until there is one.
    pub fix_summary: String,
}

/// One lifecycle change of an existing issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Issue being updated.
    pub issue_id: IssueId,
    /// When the change happened.
    pub timestamp_utc: Timestamp,
    /// New status.
    pub status: IssueStatus,
    /// Status the writer observed before the change.
    pub previous_status: IssueStatus,
    /// Agent or person making the change.
    pub updated_by: String,
    /// Fix attempts after this change.
    pub attempts: u32,
    /// Fix summary after this change.
    pub fix_summary: String,
    /// `path:line` of the fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_location: Option<String>,
    /// Kind of fix, e.g. `code_change`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_type: Option<String>,
    /// Test outcome as reported by the fixer, e.g. `passed` or
    /// `VERIFIED - build output contains the fix`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_status: Option<String>,
    /// Whether the build was verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_verified: Option<bool>,
    /// Changed files or produced artifacts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl StatusUpdate {
    /// A transition with the current time and unchanged attempts/summary
    /// left for the caller to fill.
    pub fn new(
        issue_id: IssueId,
        previous_status: IssueStatus,
        status: IssueStatus,
        updated_by: impl Into<String>,
    ) -> Self {
        Self {
            issue_id,
            timestamp_utc: Timestamp::now(),
            status,
            previous_status,
            updated_by: updated_by.into(),
            attempts: 0,
            fix_summary: String::new(),
            fix_location: None,
            fix_type: None,
            test_status: None,
            build_verified: None,
            artifacts: Vec::new(),
        }
    }
}

/// A parsed log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    /// A new issue.
    Issue(IssueLogEntry),
    /// A lifecycle change.
    StatusUpdate(StatusUpdate),
}

impl LogLine {
    /// Whether a raw JSON object is shaped like a status update.
    pub fn is_status_update(value: &Value) -> bool {
        value.get("previous_status").is_some()
    }

    /// Decode a raw JSON object into the matching line kind.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if Self::is_status_update(&value) {
            serde_json::from_value(value).map(LogLine::StatusUpdate)
        } else {
            serde_json::from_value(value).map(LogLine::Issue)
        }
    }

    /// The issue this line refers to.
    pub fn issue_id(&self) -> IssueId {
        match self {
            Self::Issue(e) => e.issue_id,
            Self::StatusUpdate(u) => u.issue_id,
        }
    }
}
