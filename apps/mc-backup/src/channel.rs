use backup_rcon::{RconTransport, TransportError};
use tracing::{debug, warn};

/// Sends one command at a time and reads back exactly one response for it.
pub struct CommandChannel<T> {
    transport: T,
}

impl<T: RconTransport> CommandChannel<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Sends `command` and returns the server's reply text.
    ///
    /// A reply carrying a different request id is still returned: the server
    /// never pipelines, so the only thing we can do with a mismatch is log it.
    pub async fn send(&mut self, command: &str) -> Result<String, TransportError> {
        debug!(command, "rcon send");
        let sent_id = self.transport.write(command).await?;
        let response = self.transport.read().await?;

        if response.id != sent_id {
            warn!(
                sent_id,
                response_id = response.id,
                command,
                "rcon response id mismatch"
            );
        }

        Ok(response.body)
    }

    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close().await
    }
}
