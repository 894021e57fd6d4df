use std::process::ExitCode;

use clap::Parser;
use dotenv::dotenv;
use tracing::error;

use estunnel::cli::{Cli, Command};
use estunnel::ops;
use estunnel::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().expect("valid directive")),
        )
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = Settings::load(&cli.config)?;

    let (title, results) = match cli.command {
        Command::Collect { kind } => (
            "COLLECTION SUMMARY",
            ops::run_collect(&settings, kind).await?,
        ),
        Command::Restore {
            alerts,
            reports,
            file,
        } => (
            "RESTORATION SUMMARY",
            ops::run_restore(&settings, alerts, reports, file).await?,
        ),
        Command::Extract { kind, input } => (
            "EXTRACTION SUMMARY",
            ops::run_extract(&settings, kind, input)?,
        ),
        Command::Update {
            input,
            alert,
            output,
        } => (
            "UPDATE SUMMARY",
            ops::run_update(&settings, input, alert, output)?,
        ),
    };

    ops::print_summary(title, &results);

    Ok(if ops::all_succeeded(&results) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
