use backup_rcon::{RconSession, RconSettings, RconTransport};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::backup::{BackupProcess, BackupResult, BackupRunner};
use crate::channel::CommandChannel;
use crate::config::Config;
use crate::error::{BackupError, log_recoverable};
use crate::progress::ProgressReporter;

pub const WARNING_MESSAGE: &str = "Starting a backup shortly.";
pub const STARTING_TITLE: &str = "Starting Backup";

/// What happened during a run, for the operator.
#[derive(Debug, Default)]
pub struct RunReport {
    /// `None` when the run stopped before the backup tool was reached.
    pub backup: Option<BackupResult>,
    pub indicator_shown: bool,
    /// Set when the RCON connection broke partway through.
    pub fatal: Option<BackupError>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.fatal.is_none() && self.backup.as_ref().is_some_and(BackupResult::succeeded)
    }
}

pub struct Orchestrator<P> {
    config: Config,
    process: P,
}

impl<P: BackupProcess> Orchestrator<P> {
    pub fn new(config: Config, process: P) -> Self {
        Self { config, process }
    }

    /// Connects and drives one backup. Only a failed connection is an `Err`;
    /// everything after that is summarised in the [`RunReport`].
    pub async fn run(&self, settings: &RconSettings) -> Result<RunReport, BackupError> {
        info!(address = %settings.address, "connecting to rcon");
        let session = RconSession::connect(settings).await?;
        Ok(self.drive(session).await)
    }

    /// Drives one backup over an already open session and closes it.
    pub async fn drive<T: RconTransport>(&self, transport: T) -> RunReport {
        let channel = CommandChannel::new(transport);
        let mut reporter = ProgressReporter::new(channel, &self.config.selectors);
        let mut report = RunReport::default();

        if let Err(err) = self.run_steps(&mut reporter, &mut report).await {
            error!(error = %err, "backup interrupted");
            report.fatal = Some(err);
        }

        if reporter.state().visible() {
            if let Err(err) = reporter.hide_indicator().await {
                warn!(error = %err, "failed to hide the bossbar");
            }
        }

        let mut channel = reporter.into_channel();
        if let Err(err) = channel.close().await {
            warn!(error = %err, "failed to close rcon session");
        }

        report
    }

    async fn run_steps<T: RconTransport>(
        &self,
        reporter: &mut ProgressReporter<T>,
        report: &mut RunReport,
    ) -> Result<(), BackupError> {
        let timings = &self.config.timings;

        log_recoverable(
            "broadcast warning",
            reporter
                .announce(&self.config.selectors.broadcast, WARNING_MESSAGE, None)
                .await,
        )?;
        sleep(timings.warning_delay).await;

        let shown = log_recoverable("show bossbar", reporter.show_indicator().await)?;
        report.indicator_shown = shown.is_some();
        log_recoverable("progress", reporter.set_progress(STARTING_TITLE, 0).await)?;

        let result = BackupRunner::new(reporter, &self.process, timings.post_save_settle)
            .run()
            .await?;
        report.backup = Some(result);

        sleep(timings.final_settle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_rcon::TransportError;

    use crate::progress::ALERT_COLOR;
    use crate::testing::{ScriptedProcess, ScriptedTransport};

    fn orchestrator(process: ScriptedProcess) -> Orchestrator<ScriptedProcess> {
        let config = Config::from_lookup(|key| (key == "WARNING_DELAY").then(|| "0".to_string()));
        Orchestrator::new(config, process)
    }

    fn position(commands: &[String], wanted: &str) -> usize {
        commands
            .iter()
            .position(|command| command == wanted)
            .unwrap_or_else(|| panic!("{wanted} was never sent"))
    }

    #[tokio::test(start_paused = true)]
    async fn failed_backup_runs_to_completion_with_cleanup() {
        let (transport, handle) = ScriptedTransport::accepting();
        let orchestrator = orchestrator(ScriptedProcess::Exits {
            code: 1,
            output: "error: repo locked",
        });

        let report = orchestrator.drive(transport).await;

        let commands = handle.commands();
        let warning = &handle.announcements()[0];
        assert_eq!(warning.selector, "@a");
        assert_eq!(warning.text, WARNING_MESSAGE);

        assert_eq!(handle.count("save-off"), 1);
        assert_eq!(handle.count("save-on"), 1);
        assert!(position(&commands, "save-off") < position(&commands, "save-on"));

        let alerts: Vec<String> = handle
            .announcements()
            .into_iter()
            .filter(|announcement| announcement.color == ALERT_COLOR)
            .map(|announcement| announcement.text)
            .collect();
        assert_eq!(alerts, vec!["Failed backup. Exit: 1", "exit status 1"]);

        assert!(report.indicator_shown);
        assert_eq!(
            handle.bossbar_commands().last().map(String::as_str),
            Some("bossbar set backup:active visible false")
        );
        assert!(handle.closed());

        assert!(report.fatal.is_none());
        assert!(!report.backup.as_ref().unwrap().succeeded());
        assert!(!report.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_backup_reports_success() {
        let (transport, handle) = ScriptedTransport::accepting();
        let orchestrator = orchestrator(ScriptedProcess::Exits {
            code: 0,
            output: "snapshot 4f2a9c1e saved",
        });

        let report = orchestrator.drive(transport).await;

        assert!(report.succeeded());
        assert_eq!(handle.reads(), handle.commands().len());
        let renamed = r#"bossbar set backup:active name "Backup: snapshot 4f2a9c1e saved""#;
        assert!(handle.bossbar_commands().iter().any(|command| command == renamed));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_bossbar_is_not_hidden_at_the_end() {
        let (transport, handle) = ScriptedTransport::replying(|command| {
            if command.starts_with("bossbar") {
                Ok("No bossbar exists with the ID 'backup:active'".to_string())
            } else {
                Ok(String::new())
            }
        });
        let orchestrator = orchestrator(ScriptedProcess::Exits { code: 0, output: "done" });

        let report = orchestrator.drive(transport).await;

        assert!(!report.indicator_shown);
        assert!(report.succeeded());
        assert_eq!(handle.bossbar_commands(), vec!["bossbar set backup:active players @a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_is_reported_and_session_closed() {
        let (transport, handle) = ScriptedTransport::replying(|command| {
            if command == "save-off" {
                Err(TransportError::Closed)
            } else {
                Ok(String::new())
            }
        });
        let orchestrator = orchestrator(ScriptedProcess::Exits { code: 0, output: "" });

        let report = orchestrator.drive(transport).await;

        assert!(matches!(report.fatal, Some(BackupError::Transport(_))));
        assert!(report.backup.is_none());
        assert!(!report.succeeded());
        // Cleanup still ran: the bossbar was shown, so it gets hidden.
        assert_eq!(
            handle.bossbar_commands().last().map(String::as_str),
            Some("bossbar set backup:active visible false")
        );
        assert!(handle.closed());
    }

    #[tokio::test]
    async fn connection_failure_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let orchestrator = orchestrator(ScriptedProcess::Exits { code: 0, output: "" });
        let result = orchestrator.run(&RconSettings::new(&address, "pw")).await;

        assert!(matches!(
            result,
            Err(BackupError::Transport(TransportError::Connect { .. }))
        ));
    }
}
