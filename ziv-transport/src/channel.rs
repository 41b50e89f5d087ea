//! Byte channel trait for transport layer

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use ziv_core::TransportError;

const READ_CHUNK: usize = 256;

/// Upper bound on what [`ByteChannel::discard_input`] drops in one go, so a
/// chattering line cannot hold up the next request
const MAX_DISCARD: usize = 4096;

/// Duplex byte pipe to the meter
///
/// Implementations own the underlying device. Nothing here knows about
/// frames; that is the job of [`TransportSession`](crate::TransportSession).
#[async_trait]
pub trait ByteChannel: Send {
    /// Write all of `bytes`
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read whatever arrives within `timeout`
    ///
    /// # Returns
    ///
    /// The bytes received, empty when nothing arrived in time. A closed
    /// device is reported as [`TransportError::ChannelClosed`].
    async fn read_with_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Drop whatever has already arrived and not been read
    ///
    /// Returns the number of bytes dropped.
    async fn discard_input(&mut self) -> Result<usize, TransportError> {
        let mut dropped = 0;
        while dropped < MAX_DISCARD {
            let stale = self.read_with_timeout(Duration::ZERO).await?;
            if stale.is_empty() {
                break;
            }
            dropped += stale.len();
        }
        Ok(dropped)
    }
}

/// [`ByteChannel`] over any async byte stream
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: S,
    closed: bool,
}

impl<S> StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Check if the stream is closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> ByteChannel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn read_with_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }
        let mut buf = [0u8; READ_CHUNK];
        match tokio::time::timeout(timeout, self.stream.read(&mut buf)).await {
            Err(_) => Ok(Vec::new()),
            Ok(Ok(0)) => {
                self.closed = true;
                Err(TransportError::ChannelClosed)
            }
            Ok(Ok(n)) => Ok(buf[..n].to_vec()),
            Ok(Err(e)) => {
                log::error!("Read from channel failed: {}", e);
                self.closed = true;
                Err(TransportError::ChannelClosed)
            }
        }
    }
}
