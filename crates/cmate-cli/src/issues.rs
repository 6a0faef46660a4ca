//! # Issues Subcommand
//!
//! Thin wrappers over [`cmate_issues::IssueLog`]. Every write goes through
//! the log's validation; a rejected line exits non-zero and leaves the file
//! untouched.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use cmate_core::IssueId;
use cmate_issues::{
    IssueDraft, IssueLog, IssueLogConfig, IssueRecord, IssueStatus, IssueType, Repo, Severity,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::output::{emit, OutputFormat};

/// Arguments for the issues subcommand.
#[derive(Args, Debug)]
pub struct IssuesArgs {
    /// Path to the JSONL issue log. Defaults to `CMATE_ISSUE_LOG`, then
    /// `issues/auto_issues_log.jsonl`.
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: IssuesCommand,
}

#[derive(Subcommand, Debug)]
pub enum IssuesCommand {
    /// Log a new issue with a fresh id.
    New(NewIssueArgs),
    /// Append a single issue object from a JSON file.
    Append {
        /// File holding one JSON object.
        file: PathBuf,
    },
    /// Move an issue to a new lifecycle status.
    Status(StatusArgs),
    /// List issues still at NEW.
    ListNew,
    /// Counts by status, severity, repo and type.
    Summary,
}

#[derive(Args, Debug)]
pub struct NewIssueArgs {
    /// Repository, e.g. credentialmate-app.
    #[arg(long, value_parser = parse_wire::<Repo>)]
    pub repo: Repo,

    /// Reporting agent.
    #[arg(long)]
    pub agent: String,

    /// CRITICAL, HIGH, MEDIUM or LOW.
    #[arg(long, value_parser = parse_wire::<Severity>)]
    pub severity: Severity,

    /// bug, enhancement, tech_debt, security, documentation, performance
    /// or compliance.
    #[arg(long = "type", value_parser = parse_wire::<IssueType>)]
    pub issue_type: IssueType,

    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub description: String,

    /// Steps to reproduce.
    #[arg(long)]
    pub repro: String,

    /// Suspected root cause.
    #[arg(long = "root-cause")]
    pub root_cause: String,

    #[arg(long = "blocked-by", num_args = 1..)]
    pub blocked_by: Vec<IssueId>,

    #[arg(long = "depends-on", num_args = 1..)]
    pub depends_on: Vec<IssueId>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Issue to update.
    pub issue_id: IssueId,

    /// Target status, e.g. TRIAGED.
    #[arg(long)]
    pub to: IssueStatus,

    /// Agent or person making the change.
    #[arg(long)]
    pub by: String,

    /// Fix summary to record; defaults to the current one.
    #[arg(long)]
    pub summary: Option<String>,
}

fn parse_wire<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(Value::String(s.to_string()))
        .map_err(|_| format!("unrecognised value {s:?}"))
}

/// Run an issues subcommand, printing results to `out`.
pub fn run<W: Write>(args: IssuesArgs, format: OutputFormat, out: &mut W) -> anyhow::Result<()> {
    let config = args.log.map_or_else(IssueLogConfig::from_env, IssueLogConfig::new);
    let log = IssueLog::open(config.path)?;
    tracing::debug!(path = %log.path().display(), "issue log opened");

    match args.command {
        IssuesCommand::New(a) => {
            let entry = IssueDraft::new(a.repo, a.agent, a.severity, a.issue_type, a.title)
                .description(a.description)
                .repro(a.repro)
                .root_cause_guess(a.root_cause)
                .blocked_by(a.blocked_by)
                .depends_on(a.depends_on)
                .build();
            log.append_entry(&entry)?;
            emit(out, format, &entry, |w| writeln!(w, "{}", entry.issue_id))
        }
        IssuesCommand::Append { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;
            let entry = log.append(&value)?;
            emit(out, format, &entry, |w| writeln!(w, "{}", entry.issue_id))
        }
        IssuesCommand::Status(a) => {
            let record = log.transition(a.issue_id, a.to, &a.by, a.summary.as_deref())?;
            emit(out, format, &record, |w| {
                writeln!(w, "{} {}", record.issue_id(), record.status)
            })
        }
        IssuesCommand::ListNew => {
            let records = log.list_new()?;
            emit(out, format, &records, |w| write_records(w, &records))
        }
        IssuesCommand::Summary => {
            let summary = log.summarize()?;
            emit(out, format, &summary, |w| {
                writeln!(w, "total issues: {}", summary.total_issues)?;
                writeln!(w, "new:          {}", summary.new_count)?;
                for (title, counts) in [
                    ("by status", &summary.by_status),
                    ("by severity", &summary.by_severity),
                    ("by repo", &summary.by_repo),
                    ("by type", &summary.by_type),
                ] {
                    writeln!(w, "{title}:")?;
                    for (key, n) in counts {
                        writeln!(w, "  {key:<28} {n}")?;
                    }
                }
                Ok(())
            })
        }
    }
}

fn write_records<W: Write>(w: &mut W, records: &[IssueRecord]) -> std::io::Result<()> {
    for r in records {
        writeln!(
            w,
            "{}  {:<8}  {:<27}  {}",
            r.issue_id(),
            r.entry.severity,
            r.entry.repo,
            r.entry.title
        )?;
    }
    Ok(())
}
