//! CLI binary for gradewatch.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gradewatch::config::{ConfigSeverity, WatchConfig};
use gradewatch::{logging, service};

/// Gradewatch: notifies students over Telegram when OBS grades change.
#[derive(Parser)]
#[command(name = "gradewatch", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the bot and the periodic sweeps (default).
    Run,

    /// Run one sweep over all eligible users and print its report.
    Sweep,

    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and list any issues.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(WatchConfig::default_config_path);

    match cli.command.unwrap_or(Command::Run) {
        Command::InitConfig { force } => init_config(&config_path, force),
        Command::CheckConfig => {
            let config = WatchConfig::load_or_default(&config_path)?;
            check_config(&config)
        }
        Command::Sweep => {
            let config = WatchConfig::load_or_default(&config_path)?;
            let _guard = logging::init(&config.logging)?;
            let report = service::sweep_once(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Run => {
            let config = WatchConfig::load_or_default(&config_path)?;
            let _guard = logging::init(&config.logging)?;
            service::run(config).await
        }
    }
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    WatchConfig::default().save_to_file(path)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn check_config(config: &WatchConfig) -> anyhow::Result<()> {
    let issues = config.validate();
    if issues.is_empty() {
        println!("configuration OK");
        return Ok(());
    }
    for issue in &issues {
        let level = match issue.severity {
            ConfigSeverity::Warning => "warning",
            ConfigSeverity::Error => "error",
        };
        println!("{level} [{}]: {}", issue.id, issue.summary);
    }
    if WatchConfig::has_blocking_issues(&issues) {
        anyhow::bail!("configuration has blocking errors");
    }
    Ok(())
}
