use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::warn;

use crate::config::ResticConfig;
use crate::error::BackupError;

/// Exit code recorded when the process never ran or ended without one.
const NO_EXIT_CODE: i32 = -1;

/// Terminal state of one backup process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupResult {
    succeeded: bool,
    exit_code: i32,
    output_lines: Vec<String>,
    detail: Option<String>,
}

impl BackupResult {
    pub fn from_output(exit_code: i32, output: &str) -> Self {
        let succeeded = exit_code == 0;
        Self {
            succeeded,
            exit_code,
            output_lines: split_output(output),
            detail: (!succeeded).then(|| BackupError::BackupProcess { exit_code }.to_string()),
        }
    }

    pub fn from_status(status: ExitStatus, output: &str) -> Self {
        match status.code() {
            Some(code) => Self::from_output(code, output),
            None => Self {
                succeeded: false,
                exit_code: NO_EXIT_CODE,
                output_lines: split_output(output),
                detail: Some(termination(status).to_string()),
            },
        }
    }

    /// The process could not be started at all.
    pub fn not_started(err: &BackupError) -> Self {
        Self {
            succeeded: false,
            exit_code: NO_EXIT_CODE,
            output_lines: Vec::new(),
            detail: Some(err.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn output_lines(&self) -> &[String] {
        &self.output_lines
    }

    /// Why the run failed, `None` on success.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

#[cfg(unix)]
fn termination(status: ExitStatus) -> BackupError {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => BackupError::Signalled { signal },
        None => BackupError::NoExitStatus,
    }
}

#[cfg(not(unix))]
fn termination(_status: ExitStatus) -> BackupError {
    BackupError::NoExitStatus
}

/// Splits the whole trimmed output into lines. Empty output has no lines.
fn split_output(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect()
}

/// Reads stdout and stderr together, keeping lines in the order they arrive.
async fn read_interleaved<O, E>(stdout: O, stderr: E) -> std::io::Result<Vec<String>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = BufReader::new(stdout);
    let mut stderr = BufReader::new(stderr);
    let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
    let (mut out_open, mut err_open) = (true, true);
    let mut lines = Vec::new();

    while out_open || err_open {
        tokio::select! {
            read = stdout.read_until(b'\n', &mut out_buf), if out_open => {
                out_open = take_line(read?, &mut out_buf, &mut lines);
            }
            read = stderr.read_until(b'\n', &mut err_buf), if err_open => {
                err_open = take_line(read?, &mut err_buf, &mut lines);
            }
        }
    }

    Ok(lines)
}

/// Moves a finished line out of `buf`. Returns whether the stream is still open.
fn take_line(read: usize, buf: &mut Vec<u8>, lines: &mut Vec<String>) -> bool {
    if !buf.is_empty() && (read == 0 || buf.ends_with(b"\n")) {
        let line = String::from_utf8_lossy(buf);
        lines.push(line.trim_end_matches('\n').to_string());
        buf.clear();
    }
    read != 0
}

#[async_trait]
pub trait BackupProcess: Send + Sync {
    /// Command line shown to players before the run.
    fn describe(&self) -> String;

    /// Runs to completion. `Err` only when the process could not be started.
    async fn run(&self) -> Result<BackupResult, BackupError>;
}

/// `restic backup --files-from <list>`.
pub struct ResticProcess {
    binary: String,
    args: Vec<String>,
}

impl ResticProcess {
    pub fn new(config: &ResticConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: vec![
                "backup".to_string(),
                "--files-from".to_string(),
                config.files_from.clone(),
            ],
        }
    }
}

#[async_trait]
impl BackupProcess for ResticProcess {
    fn describe(&self) -> String {
        format!("{} {}", self.binary, self.args.join(" "))
    }

    async fn run(&self) -> Result<BackupResult, BackupError> {
        let spawn_error = |source| BackupError::Spawn {
            command: self.describe(),
            source,
        };

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(spawn_error(std::io::Error::other("output pipes were not captured")));
        };

        let lines = match read_interleaved(stdout, stderr).await {
            Ok(lines) => lines,
            Err(err) => {
                warn!(error = %err, "failed to read backup output");
                Vec::new()
            }
        };

        let status = child.wait().await.map_err(spawn_error)?;
        Ok(BackupResult::from_status(status, &lines.join("\n")))
    }
}
