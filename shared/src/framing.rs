//! Length-prefixed framing over async byte streams.
//!
//! Each frame is a 4-byte big-endian payload length followed by the payload
//! produced by [`crate::encode_packet`]. `MAX_FRAME_SIZE` bounds the
//! allocation a peer can force with a forged length prefix; the largest real
//! message is a world snapshot of a few dozen bytes.

use crate::{decode_packet, encode_packet, Packet, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Writes one frame and flushes the writer.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the stream closes cleanly on a frame boundary.
/// A stream that ends partway through a frame is an `Io` error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    // Only a stream that ends before any header byte is a clean close.
    let mut header = [0u8; 4];
    let first = reader.read(&mut header).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[first..]).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode_packet(packet)?;
    write_frame(writer, &payload).await
}

pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(payload) => Ok(Some(decode_packet(&payload)?)),
        None => Ok(None),
    }
}
