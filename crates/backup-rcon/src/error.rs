use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to RCON at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("RCON authentication failed")]
    AuthenticationFailed,

    #[error("malformed RCON packet: {0}")]
    MalformedPacket(String),

    #[error("command is {len} bytes, RCON accepts at most {max}")]
    CommandTooLong { len: usize, max: usize },

    #[error("RCON connection closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the session is unusable after this error. A command refused
    /// before it was written leaves the connection as it was.
    pub fn breaks_session(&self) -> bool {
        !matches!(self, Self::CommandTooLong { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_refused_commands_keep_the_session() {
        assert!(!TransportError::CommandTooLong { len: 2000, max: 1446 }.breaks_session());
        assert!(TransportError::Closed.breaks_session());
        assert!(TransportError::AuthenticationFailed.breaks_session());
    }
}
