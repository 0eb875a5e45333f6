//! topology-lint CLI.
//!
//! Checks ArgoCD Application manifests against a declared hub/spoke cluster
//! pair and probes the controller for spoke registration.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::check::CheckCommand;
use commands::rules::RulesCommand;

/// Hub-spoke topology linter for ArgoCD.
#[derive(Parser)]
#[command(
    name = "topology-lint",
    version,
    about = "Check ArgoCD Applications against a hub-spoke topology",
    long_about = "Check ArgoCD Application manifests against a declared hub/spoke cluster pair.\n\n\
                  Flags destinations that point at the hub's in-cluster API, namespace creation\n\
                  without a spoke, spoke-only workflow steps without a spoke declaration and\n\
                  unbounded sync retries. Optionally asks ArgoCD whether the spoke is\n\
                  registered and reachable."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (logs go to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Check manifests against the declared topology.
    ///
    /// Exits 0 when clean, 1 on ERROR or CRITICAL findings, 2 when the check
    /// could not run.
    Check(CheckCommand),

    /// List the rules with their severity and remediation.
    Rules(RulesCommand),
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,topology_lint=debug")
        } else {
            EnvFilter::new("warn,topology_lint=info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Check(cmd) => cmd.run().await,
        Commands::Rules(cmd) => cmd.run(),
    }
}
