use std::panic::AssertUnwindSafe;
use std::time::Duration;

use backup_rcon::RconTransport;
use futures_util::FutureExt;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::backup::{BackupProcess, BackupResult};
use crate::error::{BackupError, log_recoverable};
use crate::progress::{ALERT_COLOR, ProgressReporter};

const SAVE_OFF: &str = "save-off";
const SAVE_ALL: &str = "save-all";
const SAVE_ON: &str = "save-on";

pub const SAVING_TITLE: &str = "Saving Worlds";
pub const RUNNING_TITLE: &str = "Running restic";
/// Final progress title when the backup tool printed nothing.
pub const NO_OUTPUT_TITLE: &str = "(no output)";

/// Runs one backup attempt with autosave suspended around it.
pub struct BackupRunner<'a, T, P: ?Sized> {
    reporter: &'a mut ProgressReporter<T>,
    process: &'a P,
    post_save_settle: Duration,
}

impl<'a, T, P> BackupRunner<'a, T, P>
where
    T: RconTransport,
    P: BackupProcess + ?Sized,
{
    pub fn new(
        reporter: &'a mut ProgressReporter<T>,
        process: &'a P,
        post_save_settle: Duration,
    ) -> Self {
        Self {
            reporter,
            process,
            post_save_settle,
        }
    }

    /// Returns `Err` only when the RCON connection is lost. Once `save-off`
    /// has been sent, `save-on` is sent exactly once on every way out,
    /// including a panic further down.
    pub async fn run(&mut self) -> Result<BackupResult, BackupError> {
        log_recoverable("progress", self.reporter.set_progress(SAVING_TITLE, 10).await)?;

        self.reporter.command(SAVE_OFF).await?;
        info!("autosave disabled");

        let outcome = AssertUnwindSafe(self.run_with_autosave_off())
            .catch_unwind()
            .await;

        let restored = self.reporter.command(SAVE_ON).await;
        match &restored {
            Ok(_) => info!("autosave re-enabled"),
            Err(err) => error!(error = %err, "failed to re-enable autosave"),
        }

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(result) => {
                let result = result?;
                restored?;
                Ok(result)
            }
        }
    }

    async fn run_with_autosave_off(&mut self) -> Result<BackupResult, BackupError> {
        self.reporter.command(SAVE_ALL).await?;
        sleep(self.post_save_settle).await;

        log_recoverable("progress", self.reporter.set_progress(RUNNING_TITLE, 50).await)?;
        let invocation = self.process.describe();
        info!(command = %invocation, "running backup");
        log_recoverable("announce command", self.reporter.detail(&invocation, None).await)?;

        let result = match self.process.run().await {
            Ok(result) => result,
            Err(err) => {
                error!(error = %err, "backup process did not start");
                BackupResult::not_started(&err)
            }
        };

        if !result.succeeded() {
            warn!(exit_code = result.exit_code(), "restic failed");
            let summary = format!("Failed backup. Exit: {}", result.exit_code());
            let announced = self.reporter.detail(&summary, Some(ALERT_COLOR)).await;
            log_recoverable("announce failure", announced)?;
            if let Some(detail) = result.detail() {
                let announced = self.reporter.detail(detail, Some(ALERT_COLOR)).await;
                log_recoverable("announce failure", announced)?;
            }
        }

        for line in result.output_lines() {
            info!(target: "restic", "{line}");
            log_recoverable("relay output", self.reporter.detail(line, None).await)?;
        }

        let title = result
            .output_lines()
            .last()
            .map(String::as_str)
            .unwrap_or(NO_OUTPUT_TITLE);
        log_recoverable("progress", self.reporter.set_progress(title, 100).await)?;

        Ok(result)
    }
}
