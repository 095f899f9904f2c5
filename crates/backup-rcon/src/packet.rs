use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

pub(crate) const SERVERDATA_AUTH: i32 = 3;
pub(crate) const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub(crate) const SERVERDATA_EXECCOMMAND: i32 = 2;
pub(crate) const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// id + type + two trailing nulls.
const HEADER_LEN: i32 = 10;

/// Largest packet we are willing to buffer. Minecraft fragments responses at
/// 4096 body bytes, so anything far beyond that is a framing error.
const MAX_PACKET_SIZE: i32 = 16 * 1024;

/// Longest command body the server accepts.
pub const MAX_COMMAND_LEN: usize = 1446;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let size = HEADER_LEN + body.len() as i32;
        let mut buf = Vec::with_capacity(4 + size as usize);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }
}

pub(crate) async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&packet.encode()).await?;
    writer.flush().await?;
    Ok(())
}

pub(crate) async fn read_packet<R>(reader: &mut R) -> Result<Packet, TransportError>
where
    R: AsyncRead + Unpin,
{
    let size = reader.read_i32_le().await.map_err(eof_as_closed)?;
    if !(HEADER_LEN..=MAX_PACKET_SIZE).contains(&size) {
        return Err(TransportError::MalformedPacket(format!(
            "packet size {size} outside {HEADER_LEN}..={MAX_PACKET_SIZE}"
        )));
    }

    let id = reader.read_i32_le().await.map_err(eof_as_closed)?;
    let kind = reader.read_i32_le().await.map_err(eof_as_closed)?;

    let mut payload = vec![0u8; (size - 8) as usize];
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;

    // Body is followed by two null terminators.
    if payload.len() < 2 || payload[payload.len() - 2..] != [0, 0] {
        return Err(TransportError::MalformedPacket(
            "missing null terminators".to_string(),
        ));
    }
    payload.truncate(payload.len() - 2);

    Ok(Packet {
        id,
        kind,
        body: String::from_utf8_lossy(&payload).into_owned(),
    })
}

fn eof_as_closed(err: std::io::Error) -> TransportError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(err)
    }
}
