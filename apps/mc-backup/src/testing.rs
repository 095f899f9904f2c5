//! Test doubles for the RCON transport and the backup process.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use backup_rcon::{MAX_COMMAND_LEN, RconResponse, RconTransport, TransportError};
use tracing::subscriber::DefaultGuard;

use crate::backup::{BackupProcess, BackupResult};
use crate::error::BackupError;

type Responder = Box<dyn FnMut(&str) -> Result<String, TransportError> + Send>;

#[derive(Default)]
struct Recorded {
    commands: Vec<String>,
    reads: usize,
    closed: bool,
}

/// Inspects what a [`ScriptedTransport`] saw after it has been moved away.
#[derive(Clone)]
pub struct TransportHandle(Arc<Mutex<Recorded>>);

impl TransportHandle {
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().unwrap().commands.clone()
    }

    pub fn reads(&self) -> usize {
        self.0.lock().unwrap().reads
    }

    pub fn closed(&self) -> bool {
        self.0.lock().unwrap().closed
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|sent| *sent == command).count()
    }

    pub fn bossbar_commands(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|command| command.starts_with("bossbar "))
            .collect()
    }

    /// Decoded `tellraw` messages, in the order they were sent.
    pub fn announcements(&self) -> Vec<Announcement> {
        self.tellraws()
            .iter()
            .map(|command| Announcement::parse(command))
            .collect()
    }

    pub fn tellraws(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|command| command.starts_with("tellraw "))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub selector: String,
    pub color: String,
    pub text: String,
}

impl Announcement {
    fn parse(command: &str) -> Self {
        let rest = command.strip_prefix("tellraw ").expect("not a tellraw command");
        let split = rest.find(" [").expect("tellraw without components");
        let components: serde_json::Value =
            serde_json::from_str(&rest[split + 1..]).expect("tellraw components are not JSON");
        let message = &components[1];
        Self {
            selector: rest[..split].to_string(),
            color: message["color"].as_str().unwrap_or_default().to_string(),
            text: message["text"]
                .as_str()
                .map(|text| text.strip_prefix(' ').unwrap_or(text))
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// In-memory transport answering each command through a responder closure.
pub struct ScriptedTransport {
    recorded: Arc<Mutex<Recorded>>,
    responder: Responder,
    pending: Option<(i32, Result<String, TransportError>)>,
    next_id: i32,
    id_offset: i32,
    enforce_limit: bool,
}

impl ScriptedTransport {
    /// Accepts every command with an empty response.
    pub fn accepting() -> (Self, TransportHandle) {
        Self::replying(|_| Ok(String::new()))
    }

    pub fn replying(
        responder: impl FnMut(&str) -> Result<String, TransportError> + Send + 'static,
    ) -> (Self, TransportHandle) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let transport = Self {
            recorded: recorded.clone(),
            responder: Box::new(responder),
            pending: None,
            next_id: 1,
            id_offset: 0,
            enforce_limit: false,
        };
        (transport, TransportHandle(recorded))
    }

    /// Refuses oversized commands the way a real session does.
    pub fn enforcing_command_limit(mut self) -> Self {
        self.enforce_limit = true;
        self
    }

    /// Answers every request under a different id than it was sent with.
    pub fn with_id_offset(mut self, offset: i32) -> Self {
        self.id_offset = offset;
        self
    }
}

#[async_trait]
impl RconTransport for ScriptedTransport {
    async fn write(&mut self, command: &str) -> Result<i32, TransportError> {
        let mut recorded = self.recorded.lock().unwrap();
        if recorded.closed {
            return Err(TransportError::Closed);
        }
        assert!(self.pending.is_none(), "write while a response is outstanding");
        if self.enforce_limit && command.len() > MAX_COMMAND_LEN {
            return Err(TransportError::CommandTooLong {
                len: command.len(),
                max: MAX_COMMAND_LEN,
            });
        }
        recorded.commands.push(command.to_string());
        drop(recorded);

        let id = self.next_id;
        self.next_id += 1;
        self.pending = Some((id, (self.responder)(command)));
        Ok(id)
    }

    async fn read(&mut self) -> Result<RconResponse, TransportError> {
        let (id, reply) = self.pending.take().ok_or(TransportError::Closed)?;
        self.recorded.lock().unwrap().reads += 1;
        Ok(RconResponse {
            id: id + self.id_offset,
            body: reply?,
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.recorded.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Backup process double returning a canned outcome.
pub enum ScriptedProcess {
    Exits { code: i32, output: &'static str },
    FailsToStart,
}

#[async_trait]
impl BackupProcess for ScriptedProcess {
    fn describe(&self) -> String {
        "restic backup --files-from .backuplist".to_string()
    }

    async fn run(&self) -> Result<BackupResult, BackupError> {
        match self {
            Self::Exits { code, output } => Ok(BackupResult::from_output(*code, output)),
            Self::FailsToStart => Err(BackupError::Spawn {
                command: self.describe(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "No such file or directory",
                ),
            }),
        }
    }
}

/// Log output captured by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's tracing events into a buffer until the guard drops.
pub fn capture_logs() -> (DefaultGuard, CapturedLogs) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (tracing::subscriber::set_default(subscriber), logs)
}
