use std::time::Duration;

use backup_rcon::RconSettings;
use tracing::warn;

use crate::error::BackupError;

const DEFAULT_SELECTOR: &str = "@a";
const DEFAULT_DETAIL_SELECTOR: &str = "@a[tag=backups]";
const DEFAULT_WARNING_DELAY_SECS: u64 = 5;
const DEFAULT_FILE_LIST: &str = ".backuplist";
const DEFAULT_RESTIC_BIN: &str = "restic";

/// Audiences for player-visible output. Passed to the server untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectors {
    pub bossbar: String,
    pub broadcast: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Pause between the broadcast warning and the start of the backup.
    pub warning_delay: Duration,
    /// Lag allowance for the server to finish writing after `save-all`.
    pub post_save_settle: Duration,
    /// Pause before the indicator is hidden so players can read the result.
    pub final_settle: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResticConfig {
    pub binary: String,
    pub files_from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub selectors: Selectors,
    pub timings: Timings,
    pub restic: ResticConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let warning_delay = match lookup("WARNING_DELAY") {
            None => DEFAULT_WARNING_DELAY_SECS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) => secs,
                Err(err) => {
                    warn!(
                        value = %raw,
                        error = %err,
                        "failed to parse WARNING_DELAY, using default"
                    );
                    DEFAULT_WARNING_DELAY_SECS
                }
            },
        };

        Self {
            selectors: Selectors {
                bossbar: or_default("BOSSBAR_SELECTOR", DEFAULT_SELECTOR),
                broadcast: or_default("BACKUP_BROADCAST_SELECTOR", DEFAULT_SELECTOR),
                detail: or_default("BACKUP_MESSAGE_SELECTOR", DEFAULT_DETAIL_SELECTOR),
            },
            timings: Timings {
                warning_delay: Duration::from_secs(warning_delay),
                post_save_settle: Duration::from_secs(1),
                final_settle: Duration::from_secs(2),
            },
            restic: ResticConfig {
                binary: or_default("RESTIC_BIN", DEFAULT_RESTIC_BIN),
                files_from: or_default("BACKUP_FILE_LIST", DEFAULT_FILE_LIST),
            },
        }
    }
}

/// Reads `RCON_HOST` and `RCON_PASSWORD`. Both are required.
pub fn rcon_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<RconSettings, BackupError> {
    let host = lookup("RCON_HOST")
        .filter(|host| !host.trim().is_empty())
        .ok_or_else(|| BackupError::InvalidConfig("RCON_HOST is not set".to_string()))?;
    let password = lookup("RCON_PASSWORD").ok_or_else(|| {
        BackupError::InvalidConfig("RCON_HOST is set but RCON_PASSWORD is not".to_string())
    })?;
    Ok(RconSettings::new(host, password))
}
