use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::transfer::DocumentKind;

#[derive(Parser)]
#[command(
    name = "estunnel",
    about = "Collect and restore Elasticsearch documents over an SSH tunnel",
    version
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Collect document kinds from the source device into envelope files
    Collect {
        /// Restrict to specific kinds (default: all)
        #[arg(short, long, value_enum)]
        kind: Vec<DocumentKind>,
    },
    /// Restore collected envelope files to the destination device
    Restore {
        /// Restore alerts, optionally naming the envelope file
        #[arg(short, long, num_args = 0..=1, default_missing_value = "alerts.json")]
        alerts: Option<String>,
        /// Restore reports, optionally naming the envelope file
        #[arg(short, long, num_args = 0..=1, default_missing_value = "reports.json")]
        reports: Option<String>,
        /// Restore a single explicit envelope file
        #[arg(short, long, conflicts_with_all = ["alerts", "reports"])]
        file: Option<PathBuf>,
    },
    /// Extract only the _source definitions from an envelope file
    Extract {
        /// Document kind the file contains
        #[arg(short, long, value_enum)]
        kind: DocumentKind,
        /// Input envelope file (default: <kind>.json in the output dir)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Rewrite a collected alert file using a device/recipient plan
    Update {
        /// Plan file with replacement device IPs, recipients and syslog servers
        #[arg(short, long, default_value = "json_files/alert_devices.json")]
        input: PathBuf,
        /// Alert envelope file to rewrite
        #[arg(short, long)]
        alert: PathBuf,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}
