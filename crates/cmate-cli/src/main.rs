//! # cmate CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;
use cmate_cli::output::OutputFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// CredentialMate audit tooling.
///
/// Appends to and reports on the triage issue log, and maintains the
/// append-only HIPAA audit store.
#[derive(Parser, Debug)]
#[command(name = "cmate", version, about)]
struct Cli {
    /// Output format for command results.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, env = "CMATE_LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// JSONL issue log.
    Issues(cmate_cli::issues::IssuesArgs),
    /// Postgres audit store.
    Audit(cmate_cli::audit::AuditArgs),
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Commands::Issues(args) => cmate_cli::issues::run(args, cli.format, &mut stdout),
        Commands::Audit(args) => tokio::runtime::Runtime::new()?.block_on(cmate_cli::audit::run(
            args,
            cli.format,
            &mut stdout,
        )),
    }
}
