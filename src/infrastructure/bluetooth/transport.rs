//! Bluetooth Transport Module
//!
//! Over Bluetooth every telegram is preceded by its length as a
//! little-endian u16. This module owns that framing and the wait for
//! replies; it knows nothing about what the telegrams mean.

use crate::domain::error::{NxtError, Result};
use crate::infrastructure::bluetooth::protocol::MAX_TELEGRAM_LEN;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Write one length-prefixed telegram
pub async fn write_frame<W>(writer: &mut W, telegram: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if telegram.is_empty() {
        return Err(NxtError::EmptyFrame);
    }
    if telegram.len() > MAX_TELEGRAM_LEN {
        return Err(NxtError::FrameTooLarge(telegram.len()));
    }

    let mut frame = Vec::with_capacity(telegram.len() + 2);
    frame.extend_from_slice(&(telegram.len() as u16).to_le_bytes());
    frame.extend_from_slice(telegram);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed telegram
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;
    let len = u16::from_le_bytes(header) as usize;

    if len == 0 {
        return Err(NxtError::EmptyFrame);
    }
    if len > MAX_TELEGRAM_LEN {
        return Err(NxtError::FrameTooLarge(len));
    }

    let mut telegram = vec![0u8; len];
    reader.read_exact(&mut telegram).await?;
    Ok(telegram)
}

/// A framed link to one brick
pub struct Transport<S> {
    stream: S,
    response_timeout: Duration,
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, response_timeout: Duration) -> Self {
        Self {
            stream,
            response_timeout,
        }
    }

    pub async fn send(&mut self, telegram: &[u8]) -> Result<()> {
        trace!("-> {:02X?}", telegram);
        write_frame(&mut self.stream, telegram).await
    }

    /// Wait for the next telegram, giving up after the response timeout
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let telegram = tokio::time::timeout(self.response_timeout, read_frame(&mut self.stream))
            .await
            .map_err(|_| NxtError::Timeout(self.response_timeout))??;
        trace!("<- {:02X?}", &telegram);
        Ok(telegram)
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub type RfcommStream = bluer::rfcomm::Stream;

/// Open an RFCOMM stream to the brick through BlueZ
#[cfg(target_os = "linux")]
pub async fn connect_rfcomm(
    address: crate::domain::models::BrickAddress,
    channel: u8,
) -> std::io::Result<RfcommStream> {
    let target = bluer::rfcomm::SocketAddr::new(bluer::Address::new(address.octets()), channel);
    bluer::rfcomm::Stream::connect(target).await
}
