use backup_rcon::TransportError;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum BackupError {
    /// Sending over RCON failed. Fatal unless the session survived it.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered a command with text signalling a rejection.
    #[error("server rejected command: {response}")]
    Protocol { response: String },

    #[error("exit status {exit_code}")]
    BackupProcess { exit_code: i32 },

    #[error("terminated by signal {signal}")]
    Signalled { signal: i32 },

    #[error("terminated without an exit status")]
    NoExitStatus,

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BackupError {
    pub fn protocol(response: impl Into<String>) -> Self {
        Self::Protocol {
            response: response.into(),
        }
    }

    /// Fatal errors abort the remaining steps; everything else is logged and
    /// the run carries on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(err) if err.breaks_session())
    }
}

/// Logs a recoverable failure of `step` and swallows it. Fatal errors are
/// handed back to the caller.
pub fn log_recoverable<T>(
    step: &str,
    result: Result<T, BackupError>,
) -> Result<Option<T>, BackupError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(step, error = %err, "step failed, continuing");
            Ok(None)
        }
    }
}
