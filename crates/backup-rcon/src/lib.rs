//! Minecraft RCON client used by the backup orchestrator.
//!
//! A [`RconSession`] keeps one authenticated TCP connection open for the whole
//! run. Callers talk to it through the [`RconTransport`] trait so the layers
//! above can be exercised against a scripted transport.

mod error;
mod packet;
mod session;
mod settings;

use async_trait::async_trait;

pub use error::TransportError;
pub use packet::MAX_COMMAND_LEN;
pub use session::RconSession;
pub use settings::{DEFAULT_RCON_PORT, RconSettings};

/// One packet read back from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconResponse {
    pub id: i32,
    pub body: String,
}

/// Request/response transport with a correlation id per request.
///
/// Only one request may be outstanding at a time: every `write` is followed by
/// exactly one `read` before the next `write`.
#[async_trait]
pub trait RconTransport: Send {
    /// Sends a command and returns the request id assigned to it.
    async fn write(&mut self, command: &str) -> Result<i32, TransportError>;

    /// Reads the next response packet.
    async fn read(&mut self) -> Result<RconResponse, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
