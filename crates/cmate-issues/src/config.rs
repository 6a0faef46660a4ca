//! Issue-log location.

use std::path::PathBuf;

/// Log path used when `CMATE_ISSUE_LOG` is unset.
pub const DEFAULT_LOG_PATH: &str = "issues/auto_issues_log.jsonl";

/// Where the issue log lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueLogConfig {
    pub path: PathBuf,
}

impl Default for IssueLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

impl IssueLogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read `CMATE_ISSUE_LOG`, falling back to [`DEFAULT_LOG_PATH`].
    /// An empty value is treated as unset.
    pub fn from_env() -> Self {
        match std::env::var("CMATE_ISSUE_LOG") {
            Ok(path) if !path.trim().is_empty() => Self::new(path.trim()),
            _ => Self::default(),
        }
    }
}
