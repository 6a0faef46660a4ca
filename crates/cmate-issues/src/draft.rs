//! Builder for new issue lines.

use cmate_core::{IssueId, Timestamp};

use crate::schema::{IssueLogEntry, IssueStatus, IssueType, Repo, Severity};

/// A new issue before it is logged.
///
/// `build` fills a fresh UUID4, the current time, `NEW`, zero attempts and
/// an empty fix summary. Length limits are enforced when the built entry is
/// validated, not here.
///
/// ```
/// use cmate_issues::{IssueDraft, IssueStatus, IssueType, Repo, Severity};
///
/// let entry = IssueDraft::new(
///     Repo::App,
///     "qa-agent",
///     Severity::High,
///     IssueType::Bug,
///     "Login page rejects valid NPI",
/// )
/// .description("Ten-digit NPIs starting with 2 fail the client-side check.")
/// .repro("Enter 2123456789 on signup")
/// .root_cause_guess("Regex requires a leading 1")
/// .build();
///
/// assert_eq!(entry.status, IssueStatus::New);
/// assert_eq!(entry.attempts, 0);
/// ```
#[derive(Debug, Clone)]
pub struct IssueDraft {
    repo: Repo,
    agent: String,
    severity: Severity,
    issue_type: IssueType,
    title: String,
    description: String,
    repro: String,
    root_cause_guess: String,
    blocked_by: Vec<IssueId>,
    depends_on: Vec<IssueId>,
}

impl IssueDraft {
    pub fn new(
        repo: Repo,
        agent: impl Into<String>,
        severity: Severity,
        issue_type: IssueType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            agent: agent.into(),
            severity,
            issue_type,
            title: title.into(),
            description: String::new(),
            repro: String::new(),
            root_cause_guess: String::new(),
            blocked_by: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn repro(mut self, repro: impl Into<String>) -> Self {
        self.repro = repro.into();
        self
    }

    pub fn root_cause_guess(mut self, guess: impl Into<String>) -> Self {
        self.root_cause_guess = guess.into();
        self
    }

    pub fn blocked_by(mut self, ids: impl IntoIterator<Item = IssueId>) -> Self {
        self.blocked_by.extend(ids);
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = IssueId>) -> Self {
        self.depends_on.extend(ids);
        self
    }

    pub fn build(self) -> IssueLogEntry {
        IssueLogEntry {
            issue_id: IssueId::new(),
            timestamp_utc: Timestamp::now(),
            repo: self.repo,
            agent: self.agent,
            severity: self.severity,
            issue_type: self.issue_type,
            status: IssueStatus::New,
            title: self.title,
            description: self.description,
            repro: self.repro,
            root_cause_guess: self.root_cause_guess,
            blocked_by: self.blocked_by,
            depends_on: self.depends_on,
            attempts: 0,
            fix_summary: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_build_gets_fresh_id() {
        let draft = IssueDraft::new(Repo::Infra, "ops", Severity::Low, IssueType::Documentation, "t");
        let a = draft.clone().build();
        let b = draft.build();
        assert_ne!(a.issue_id, b.issue_id);
        assert!(IssueId::is_valid(&a.issue_id.to_string()));
    }

    #[test]
    fn test_dependencies_carried() {
        let dep = IssueId::new();
        let entry = IssueDraft::new(Repo::Ai, "ops", Severity::Low, IssueType::Performance, "t")
            .depends_on([dep])
            .build();
        assert_eq!(entry.depends_on, vec![dep]);
        assert!(entry.blocked_by.is_empty());
        assert!(entry.fix_summary.is_empty());
    }
}
