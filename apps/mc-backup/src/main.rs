use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod backup;
mod channel;
mod config;
mod error;
mod orchestrator;
mod progress;
#[cfg(test)]
mod testing;

use backup::ResticProcess;
use config::Config;
use orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "mc-backup")]
#[command(
    about = "Back up a running Minecraft server with restic, reporting progress in game over RCON",
    long_about = None
)]
struct Cli {
    /// Environment file loaded before reading configuration
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
    /// Seconds between the in-game warning and the start of the backup (overrides WARNING_DELAY)
    #[arg(long)]
    warning_delay: Option<u64>,
}

/// Loads the environment file, then builds the log filter so RUST_LOG may come
/// from the file. Real environment variables win over the file.
fn load_environment(env_file: &Path) -> (Result<(), dotenvy::Error>, EnvFilter) {
    let loaded = dotenvy::from_path(env_file);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    (loaded, filter)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let (env_file, filter) = load_environment(&cli.env_file);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    match env_file {
        Ok(()) => debug!(path = %cli.env_file.display(), "loaded environment file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(
            path = %cli.env_file.display(),
            error = %err,
            "failed to load environment file"
        ),
    }

    let mut config = Config::from_env();
    if let Some(secs) = cli.warning_delay {
        config.timings.warning_delay = Duration::from_secs(secs);
    }

    let settings = config::rcon_settings(|key| std::env::var(key).ok())
        .context("Failed to resolve RCON settings")?;

    let process = ResticProcess::new(&config.restic);
    let orchestrator = Orchestrator::new(config, process);
    let report = orchestrator
        .run(&settings)
        .await
        .with_context(|| format!("Failed to connect to RCON server at {}", settings.address))?;

    if !report.indicator_shown {
        warn!("bossbar backup:active was not shown; create it with `bossbar add` to see progress");
    }

    if report.succeeded() {
        info!("backup completed");
        return Ok(ExitCode::SUCCESS);
    }

    match (&report.fatal, &report.backup) {
        (Some(err), _) => error!(error = %err, "backup run aborted"),
        (None, Some(result)) => error!(
            exit_code = result.exit_code(),
            detail = result.detail().unwrap_or_default(),
            "backup failed"
        ),
        (None, None) => error!("backup did not run"),
    }
    Ok(ExitCode::FAILURE)
}
