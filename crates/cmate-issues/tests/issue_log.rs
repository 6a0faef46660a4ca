//! End-to-end behaviour of the JSONL issue log on disk.

use std::fs;

use cmate_issues::{
    IssueDraft, IssueLog, IssueLogError, IssueStatus, IssueType, Repo, Severity, StatusUpdate,
};
use serde_json::{json, Value};

fn issue_value(id: &str, title: &str) -> Value {
    json!({
        "issue_id": id,
        "timestamp_utc": "2025-11-16T12:00:00Z",
        "repo": "credentialmate-app",
        "agent": "uat-agent",
        "severity": "HIGH",
        "type": "bug",
        "status": "NEW",
        "title": title,
        "description": "Bulk CSV import drops rows with accented provider names.",
        "repro": "Import fixtures/providers_utf8.csv",
        "root_cause_guess": "Reader opened with latin-1",
        "blocked_by": [],
        "depends_on": [],
        "attempts": 0,
        "fix_summary": ""
    })
}

const ID_A: &str = "3b241101-e2bb-4255-8caf-4136c566a962";
const ID_B: &str = "9c858901-8a57-4791-81fe-4c455b099bc9";

fn setup() -> (tempfile::TempDir, IssueLog) {
    let dir = tempfile::tempdir().unwrap();
    let log = IssueLog::open(dir.path().join("issues").join("auto_issues_log.jsonl")).unwrap();
    (dir, log)
}

fn line_count(log: &IssueLog) -> usize {
    fs::read_to_string(log.path()).unwrap().lines().count()
}

#[test]
fn valid_issue_grows_file_by_one_line() {
    let (_dir, log) = setup();
    log.append(&issue_value(ID_A, "CSV import drops accented names")).unwrap();
    let before = line_count(&log);

    log.append(&issue_value(ID_B, "Second issue for the same import")).unwrap();
    assert_eq!(line_count(&log), before + 1);

    let last = fs::read_to_string(log.path()).unwrap();
    let last: Value = serde_json::from_str(last.lines().last().unwrap()).unwrap();
    assert_eq!(last, issue_value(ID_B, "Second issue for the same import"));
}

#[test]
fn duplicate_append_leaves_file_byte_identical() {
    let (_dir, log) = setup();
    log.append(&issue_value(ID_A, "CSV import drops accented names")).unwrap();
    let before = fs::read(log.path()).unwrap();

    let err = log
        .append(&issue_value(ID_A, "Same id, different title here"))
        .unwrap_err();
    assert!(matches!(err, IssueLogError::DuplicateIssueId(_)));
    assert_eq!(fs::read(log.path()).unwrap(), before);
}

#[test]
fn rejected_first_issue_creates_no_file() {
    let (_dir, log) = setup();
    let mut bad = issue_value(ID_A, "CSV import drops accented names");
    bad["severity"] = json!("BLOCKER");

    assert!(matches!(log.append(&bad), Err(IssueLogError::Schema { .. })));
    assert!(!log.path().exists());
}

#[test]
fn invalid_fields_rejected() {
    let (_dir, log) = setup();
    let not_uuid = issue_value("ISSUE-42", "CSV import drops accented names");
    let short = issue_value(ID_A, "Too short");
    let uppercase = issue_value(&ID_A.to_uppercase(), "CSV import drops accented names");

    for v in [not_uuid, short, uppercase] {
        assert!(log.validate(&v).is_err(), "accepted {v}");
    }
}

#[test]
fn lifecycle_via_status_lines() {
    let (_dir, log) = setup();
    let entry = log.append(&issue_value(ID_A, "CSV import drops accented names")).unwrap();
    let id = entry.issue_id;

    for to in [IssueStatus::Triaged, IssueStatus::InProgress] {
        log.transition(id, to, "uat-agent", None).unwrap();
    }

    let mut fixed = StatusUpdate::new(id, IssueStatus::InProgress, IssueStatus::Fixed, "fixer");
    fixed.attempts = 1;
    fixed.fix_summary = "Open CSV as UTF-8".to_string();
    fixed.fix_location = Some("backend/app/imports/csv.py:41".to_string());
    fixed.build_verified = Some(true);
    fixed.artifacts = vec!["backend/app/imports/csv.py".to_string()];
    let record = log.append_status_update(&fixed).unwrap();

    assert_eq!(record.status, IssueStatus::Fixed);
    assert_eq!(record.history.len(), 3);
    assert_eq!(log.entries().unwrap().len(), 1);
    assert_eq!(log.read_lines().unwrap().len(), 4);
}

#[test]
fn illegal_and_stale_updates_rejected_without_writing() {
    let (_dir, log) = setup();
    let entry = log.append(&issue_value(ID_A, "CSV import drops accented names")).unwrap();
    let id = entry.issue_id;
    let before = fs::read(log.path()).unwrap();

    let skip = StatusUpdate::new(id, IssueStatus::New, IssueStatus::Closed, "fixer");
    assert!(matches!(
        log.append_status_update(&skip),
        Err(IssueLogError::InvalidTransition { .. })
    ));

    let stale = StatusUpdate::new(id, IssueStatus::Triaged, IssueStatus::InProgress, "fixer");
    assert!(matches!(
        log.append_status_update(&stale),
        Err(IssueLogError::StaleStatus { .. })
    ));

    let unknown = StatusUpdate::new(
        cmate_core::IssueId::new(),
        IssueStatus::New,
        IssueStatus::Triaged,
        "fixer",
    );
    assert!(matches!(
        log.append_status_update(&unknown),
        Err(IssueLogError::UnknownIssue(_))
    ));

    assert_eq!(fs::read(log.path()).unwrap(), before);
}

#[test]
fn list_new_and_summary_follow_current_state() {
    let (_dir, log) = setup();
    let a = IssueDraft::new(
        Repo::Rules,
        "rules-agent",
        Severity::Critical,
        IssueType::Compliance,
        "Florida renewal window miscalculated",
    )
    .description("Florida MD renewals are flagged 30 days late on the dashboard.")
    .repro("Load provider FL-123 on Jan 2")
    .root_cause_guess("Window anchored to issue date")
    .build();
    let b = IssueDraft::new(
        Repo::Infra,
        "ops-agent",
        Severity::Low,
        IssueType::TechDebt,
        "Terraform state bucket lacks tags",
    )
    .description("The shared state bucket has no cost-centre or owner tags.")
    .repro("aws s3api get-bucket-tagging")
    .root_cause_guess("Module predates tagging policy")
    .depends_on([a.issue_id])
    .build();
    log.append_entry(&a).unwrap();
    log.append_entry(&b).unwrap();
    log.transition(a.issue_id, IssueStatus::Triaged, "triage", None)
        .unwrap();

    let new: Vec<_> = log.list_new().unwrap().into_iter().map(|r| r.issue_id()).collect();
    assert_eq!(new, vec![b.issue_id]);

    let summary = log.summarize().unwrap();
    assert_eq!(summary.total_issues, 2);
    assert_eq!(summary.new_count, 1);
    assert_eq!(summary.by_status["TRIAGED"], 1);
    assert_eq!(summary.by_severity["CRITICAL"], 1);
    assert_eq!(summary.by_repo["credentialmate-infra"], 1);
    assert_eq!(summary.by_type["tech_debt"], 1);

    let as_json = serde_json::to_value(&summary).unwrap();
    assert_eq!(as_json["total_issues"], json!(2));
}

fn raw_append(log: &IssueLog, bytes: &[u8]) {
    use std::io::Write;
    fs::OpenOptions::new()
        .append(true)
        .open(log.path())
        .unwrap()
        .write_all(bytes)
        .unwrap();
}

#[test]
fn partial_legacy_line_still_reserves_its_id() {
    let (_dir, log) = setup();
    log.append(&issue_value(ID_B, "Unrelated issue to create the file")).unwrap();
    raw_append(&log, format!("{{\"issue_id\":\"{ID_A}\",\"title\":\"legacy partial\"}}\n").as_bytes());
    let before = fs::read(log.path()).unwrap();

    let err = log
        .append(&issue_value(ID_A, "CSV import drops accented names"))
        .unwrap_err();
    assert!(matches!(err, IssueLogError::DuplicateIssueId(_)));
    assert_eq!(fs::read(log.path()).unwrap(), before);
}

#[test]
fn non_utf8_line_is_skipped() {
    let (_dir, log) = setup();
    log.append(&issue_value(ID_A, "CSV import drops accented names")).unwrap();
    raw_append(&log, b"\xff\xfe garbage\n");

    assert_eq!(log.summarize().unwrap().total_issues, 1);
    log.append(&issue_value(ID_B, "Second issue for the same import")).unwrap();
    assert_eq!(log.entries().unwrap().len(), 2);
    assert!(log.get(entry_id(ID_B)).unwrap().is_some());
}

fn entry_id(id: &str) -> cmate_core::IssueId {
    cmate_core::IssueId::parse(id).unwrap()
}

#[test]
fn free_text_test_status_is_folded() {
    let (_dir, log) = setup();
    log.append(&issue_value(ID_A, "CSV import drops accented names")).unwrap();
    let id = entry_id(ID_A);
    log.transition(id, IssueStatus::Triaged, "triage", None).unwrap();
    log.transition(id, IssueStatus::InProgress, "fixer", None).unwrap();

    raw_append(
        &log,
        format!(
            "{}\n",
            json!({
                "issue_id": ID_A,
                "timestamp_utc": "2025-11-16T16:30:00Z",
                "status": "FIXED",
                "previous_status": "IN_PROGRESS",
                "updated_by": "bugfix-agent",
                "attempts": 1,
                "fix_summary": "Open the CSV reader as UTF-8",
                "fix_location": "backend/app/imports/csv.py:41",
                "fix_type": "Encoding fix",
                "test_status": "VERIFIED - Build output contains correct CSP",
                "build_verified": true,
                "artifacts": ["npm run build: SUCCESS"]
            })
        )
        .as_bytes(),
    );

    let record = log.get(id).unwrap().unwrap();
    assert_eq!(record.status, IssueStatus::Fixed);
    assert_eq!(record.attempts, 1);
}

#[test]
fn attempts_at_maximum_cannot_be_fixed_again() {
    let (_dir, log) = setup();
    let mut v = issue_value(ID_A, "CSV import drops accented names");
    v["attempts"] = json!(u32::MAX);
    log.append(&v).unwrap();
    let id = entry_id(ID_A);
    log.transition(id, IssueStatus::Triaged, "triage", None).unwrap();
    log.transition(id, IssueStatus::InProgress, "fixer", None).unwrap();
    let before = fs::read(log.path()).unwrap();

    assert!(matches!(
        log.transition(id, IssueStatus::Fixed, "fixer", None),
        Err(IssueLogError::AttemptsExhausted(_))
    ));
    assert_eq!(fs::read(log.path()).unwrap(), before);

    let mut over = issue_value(ID_B, "Second issue for the same import");
    over["attempts"] = json!(u64::from(u32::MAX) + 1);
    assert!(matches!(log.validate(&over), Err(IssueLogError::Schema { .. })));
}

#[test]
fn missing_trailing_newline_is_repaired_before_append() {
    let (_dir, log) = setup();
    log.append(&issue_value(ID_A, "CSV import drops accented names")).unwrap();
    let text = fs::read_to_string(log.path()).unwrap();
    fs::write(log.path(), text.trim_end_matches('\n')).unwrap();
    let before = line_count(&log);

    log.append(&issue_value(ID_B, "Second issue for the same import")).unwrap();
    assert_eq!(line_count(&log), before + 1);
    assert_eq!(log.entries().unwrap().len(), 2);
}
