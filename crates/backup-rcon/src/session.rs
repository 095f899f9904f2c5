use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::packet::{
    MAX_COMMAND_LEN, Packet, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
    SERVERDATA_RESPONSE_VALUE, read_packet, write_packet,
};
use crate::{RconResponse, RconSettings, RconTransport, TransportError};

/// The server answers a failed login with this request id.
const AUTH_FAILED_ID: i32 = -1;

/// An authenticated RCON connection that stays open for many commands.
pub struct RconSession {
    stream: TcpStream,
    address: String,
    next_id: i32,
    closed: bool,
}

impl RconSession {
    pub async fn connect(settings: &RconSettings) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(&settings.address)
            .await
            .map_err(|source| TransportError::Connect {
                address: settings.address.clone(),
                source,
            })?;

        let mut session = Self {
            stream,
            address: settings.address.clone(),
            next_id: 1,
            closed: false,
        };
        session.authenticate(&settings.password).await?;
        debug!(address = %session.address, "rcon session authenticated");
        Ok(session)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), TransportError> {
        let id = self.next_request_id();
        write_packet(&mut self.stream, &Packet::new(id, SERVERDATA_AUTH, password)).await?;

        loop {
            let packet = read_packet(&mut self.stream).await?;
            // Some servers send an empty value packet ahead of the auth response.
            if packet.kind == SERVERDATA_RESPONSE_VALUE {
                continue;
            }
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                return Err(TransportError::MalformedPacket(format!(
                    "unexpected packet type {} during login",
                    packet.kind
                )));
            }
            if packet.id == AUTH_FAILED_ID {
                return Err(TransportError::AuthenticationFailed);
            }
            return Ok(());
        }
    }

    fn next_request_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = match self.next_id.checked_add(1) {
            Some(next) => next,
            None => 1,
        };
        id
    }
}

#[async_trait]
impl RconTransport for RconSession {
    async fn write(&mut self, command: &str) -> Result<i32, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if command.len() > MAX_COMMAND_LEN {
            return Err(TransportError::CommandTooLong {
                len: command.len(),
                max: MAX_COMMAND_LEN,
            });
        }

        let id = self.next_request_id();
        write_packet(
            &mut self.stream,
            &Packet::new(id, SERVERDATA_EXECCOMMAND, command),
        )
        .await?;
        Ok(id)
    }

    async fn read(&mut self) -> Result<RconResponse, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let packet = read_packet(&mut self.stream).await?;
        Ok(RconResponse {
            id: packet.id,
            body: packet.body,
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.shutdown().await?;
        Ok(())
    }
}
