//! # Audit Subcommand
//!
//! Operations against the Postgres audit store. Connection settings come
//! from `DATABASE_URL` and the `CMATE_DB_*` variables (see
//! [`cmate_audit::DatabaseConfig::from_env`]). Connecting applies any
//! pending migrations.

use std::io::Write;

use clap::{Args, Subcommand};
use cmate_audit::{DatabaseConfig, PgAuditStore, StoreReport};
use serde::Serialize;

use crate::output::{emit, OutputFormat};

/// Arguments for the audit subcommand.
#[derive(Args, Debug)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub command: AuditCommand,
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Apply pending schema migrations, including the immutability triggers.
    Migrate,
    /// Verify the hash chains of all three audit tables from genesis.
    Verify {
        /// Also check every recorded integrity snapshot against current rows.
        #[arg(long)]
        snapshots: bool,
    },
    /// Record an integrity snapshot of the current rows.
    Snapshot {
        /// Where an exported copy of the covered rows is kept.
        #[arg(long)]
        storage_pointer: Option<String>,
    },
}

#[derive(Serialize)]
struct VerifyOutput {
    chains: StoreReport,
    snapshots_checked: usize,
}

/// Run an audit subcommand, printing results to `out`.
pub async fn run<W: Write>(args: AuditArgs, format: OutputFormat, out: &mut W) -> anyhow::Result<()> {
    let config = DatabaseConfig::from_env()?;
    tracing::debug!(?config, "audit store configuration");
    let store = PgAuditStore::connect(&config).await?;

    match args.command {
        AuditCommand::Migrate => {
            writeln!(out, "migrations applied")?;
            Ok(())
        }
        AuditCommand::Verify { snapshots } => {
            let chains = store.verify().await?;
            let mut checked = 0;
            if snapshots {
                for snap in store.snapshots().await? {
                    store.verify_snapshot(&snap).await?;
                    checked += 1;
                }
            }
            let report = VerifyOutput {
                chains,
                snapshots_checked: checked,
            };
            emit(out, format, &report, |w| {
                for c in [
                    &report.chains.audit_logs,
                    &report.chains.change_events,
                    &report.chains.keystroke_logs,
                ] {
                    writeln!(w, "{:<15} {:>8} rows  head {}", c.table, c.length, c.head)?;
                }
                if snapshots {
                    writeln!(w, "snapshots verified: {}", report.snapshots_checked)?;
                }
                Ok(())
            })
        }
        AuditCommand::Snapshot { storage_pointer } => {
            let snap = store.take_snapshot(storage_pointer).await?;
            emit(out, format, &snap, |w| {
                writeln!(w, "snapshot {}", snap.id)?;
                writeln!(w, "merkle root {}", snap.merkle_root)?;
                writeln!(w, "rows {}", snap.total_rows())
            })
        }
    }
}
