use backup_rcon::{MAX_COMMAND_LEN, RconTransport, TransportError};
use serde_json::json;
use tracing::debug;

use crate::channel::CommandChannel;
use crate::config::Selectors;
use crate::error::BackupError;

pub const DEFAULT_COLOR: &str = "gray";
pub const ALERT_COLOR: &str = "red";
const PREFIX: &str = "[Backup]";
const PREFIX_COLOR: &str = "aqua";

/// Identifier of the boss bar. It has to be created on the server beforehand
/// (`bossbar add backup:active ...`); this tool only drives it.
const BOSSBAR_ID: &str = "backup:active";

/// Prefix of the server's reply when [`BOSSBAR_ID`] does not exist.
const NO_BOSSBAR_PREFIX: &str = "No bossbar exists with the ID";

/// Interprets the reply to a `bossbar` command.
///
/// The server signals a missing boss bar only through its reply text, so this
/// is the single place that knows that wording.
pub fn classify_bossbar_response(response: &str) -> Result<(), BackupError> {
    if response.starts_with(NO_BOSSBAR_PREFIX) {
        return Err(BackupError::protocol(response));
    }
    Ok(())
}

const ELLIPSIS: &str = "...";

/// Builds a command around `text`, cutting `text` short with an ellipsis when
/// the command would exceed what RCON accepts.
fn fit_command(text: &str, build: impl Fn(&str) -> String) -> String {
    let mut command = build(text);
    let mut keep = text.len();
    while command.len() > MAX_COMMAND_LEN && keep > 0 {
        // Escaping only grows the text, so dropping the overflow always helps.
        let overflow = command.len() - MAX_COMMAND_LEN;
        keep = keep.saturating_sub(overflow + ELLIPSIS.len());
        while !text.is_char_boundary(keep) {
            keep -= 1;
        }
        command = build(&format!("{}{ELLIPSIS}", &text[..keep]));
    }
    command
}

/// Builds the `tellraw` command for a prefixed, coloured message.
fn tellraw(selector: &str, message: &str, color: &str) -> String {
    fit_command(message, |message| {
        let components = json!([
            { "text": PREFIX, "color": PREFIX_COLOR },
            { "text": format!(" {message}"), "color": color },
        ]);
        format!("tellraw {selector} {components}")
    })
}

fn bossbar_name(title: &str) -> String {
    fit_command(title, |title| {
        let name = json!(format!("Backup: {title}"));
        format!("bossbar set {BOSSBAR_ID} name {name}")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    visible: bool,
    players: String,
    detail: String,
}

impl ProgressState {
    pub fn visible(&self) -> bool {
        self.visible
    }
}

/// Player-facing output: chat messages and the backup boss bar.
pub struct ProgressReporter<T> {
    channel: CommandChannel<T>,
    state: ProgressState,
}

impl<T: RconTransport> ProgressReporter<T> {
    pub fn new(channel: CommandChannel<T>, selectors: &Selectors) -> Self {
        Self {
            channel,
            state: ProgressState {
                visible: false,
                players: selectors.bossbar.clone(),
                detail: selectors.detail.clone(),
            },
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Sends a raw server command, ignoring what the server says back.
    pub async fn command(&mut self, command: &str) -> Result<String, TransportError> {
        self.channel.send(command).await
    }

    /// Tells `selector` a message. The server replies with nothing to an
    /// accepted `tellraw`, so any reply text is reported as a rejection.
    pub async fn announce(
        &mut self,
        selector: &str,
        message: &str,
        color: Option<&str>,
    ) -> Result<(), BackupError> {
        let color = color.unwrap_or(DEFAULT_COLOR);
        let response = self.channel.send(&tellraw(selector, message, color)).await?;
        if !response.is_empty() {
            return Err(BackupError::protocol(response));
        }
        Ok(())
    }

    /// Announces to the detail audience.
    pub async fn detail(
        &mut self,
        message: &str,
        color: Option<&str>,
    ) -> Result<(), BackupError> {
        let selector = self.state.detail.clone();
        self.announce(&selector, message, color).await
    }

    /// Announces `title` to the detail audience and, while the boss bar is
    /// shown, moves it to `percent` with `title` as its name.
    ///
    /// A rejected announcement does not stop the boss bar update; the first
    /// failure is returned.
    pub async fn set_progress(&mut self, title: &str, percent: u8) -> Result<(), BackupError> {
        let announced = self.detail(title, None).await;
        if matches!(&announced, Err(err) if err.is_fatal()) {
            return announced;
        }

        if self.state.visible {
            let response = self
                .channel
                .send(&format!("bossbar set {BOSSBAR_ID} value {percent}"))
                .await?;
            classify_bossbar_response(&response)?;

            let response = self.channel.send(&bossbar_name(title)).await?;
            classify_bossbar_response(&response)?;
        }

        announced
    }

    /// Assigns the boss bar to its audience and makes it visible.
    pub async fn show_indicator(&mut self) -> Result<(), BackupError> {
        let response = self
            .channel
            .send(&format!("bossbar set {BOSSBAR_ID} players {}", self.state.players))
            .await?;
        classify_bossbar_response(&response)?;

        let response = self
            .channel
            .send(&format!("bossbar set {BOSSBAR_ID} visible true"))
            .await?;
        classify_bossbar_response(&response)?;

        self.state.visible = true;
        debug!("backup bossbar shown");
        Ok(())
    }

    /// Hides the boss bar. Safe to call whether or not it was shown.
    pub async fn hide_indicator(&mut self) -> Result<(), BackupError> {
        self.state.visible = false;
        let response = self
            .channel
            .send(&format!("bossbar set {BOSSBAR_ID} visible false"))
            .await?;
        // A boss bar that does not exist is as hidden as it gets.
        if classify_bossbar_response(&response).is_err() {
            debug!(response = %response, "bossbar missing while hiding");
        }
        Ok(())
    }

    pub fn into_channel(self) -> CommandChannel<T> {
        self.channel
    }
}
