//! One request/response exchange over a byte channel

use crate::channel::ByteChannel;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::time::Instant;
use ziv_core::{DEFAULT_INTER_BYTE_TIMEOUT, HexBytes, RequestFrame, ResponseFrame, TransportError};

const FLAG: u8 = 0x7E;

/// A buffer ending in a flag and longer than this is handed over once the
/// line goes quiet, even if its length field disagrees
const MIN_GAP_FRAME: usize = 5;

/// Owns the channel and runs exchanges one at a time
///
/// `exchange` takes `&mut self`, so two exchanges can never be in flight on
/// the same channel.
#[derive(Debug)]
pub struct TransportSession<C> {
    channel: C,
    inter_byte_timeout: Duration,
    buffer: BytesMut,
}

impl<C: ByteChannel> TransportSession<C> {
    pub fn new(channel: C) -> Self {
        Self::with_inter_byte_timeout(channel, DEFAULT_INTER_BYTE_TIMEOUT)
    }

    pub fn with_inter_byte_timeout(channel: C, inter_byte_timeout: Duration) -> Self {
        Self {
            channel,
            inter_byte_timeout,
            buffer: BytesMut::with_capacity(256),
        }
    }

    pub fn inter_byte_timeout(&self) -> Duration {
        self.inter_byte_timeout
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Send `request` and wait for one complete frame
    ///
    /// Input left over from earlier exchanges is dropped, then the request
    /// is written once. Reading runs against an overall deadline of
    /// `timeout`; see [`receive`](Self::receive) for when a frame counts as
    /// complete.
    ///
    /// No retry happens here.
    pub async fn exchange(
        &mut self,
        request: &RequestFrame,
        timeout: Duration,
    ) -> Result<ResponseFrame, TransportError> {
        self.send(request).await?;
        match self.receive(Instant::now() + timeout).await? {
            Some(frame) => Ok(frame),
            None => Err(TransportError::Timeout(timeout)),
        }
    }

    /// Drop stale input, then write `request` once
    pub async fn send(&mut self, request: &RequestFrame) -> Result<(), TransportError> {
        self.buffer.clear();
        let stale = self.channel.discard_input().await?;
        if stale > 0 {
            log::debug!("Dropped {} stale bytes before request", stale);
        }
        log::trace!("TX: {}", request);
        self.channel.write(request.as_bytes()).await
    }

    /// Wait for the next complete frame until `deadline`
    ///
    /// Once bytes have started arriving each read waits at most the
    /// inter-byte gap. A frame is complete when its declared length has
    /// arrived followed by the closing flag, or when the line goes quiet
    /// after a flag. Bytes before the opening flag are discarded; bytes after
    /// a complete frame are kept for the next call.
    ///
    /// # Returns
    ///
    /// `None` when the deadline passes first.
    pub async fn receive(
        &mut self,
        deadline: Instant,
    ) -> Result<Option<ResponseFrame>, TransportError> {
        loop {
            self.skip_to_flag();
            if let Some(frame) = self.take_complete() {
                return Ok(Some(frame));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                log::debug!(
                    "No complete frame before deadline, {} bytes buffered",
                    self.buffer.len()
                );
                return Ok(None);
            }
            let wait = if self.buffer.is_empty() {
                remaining
            } else {
                remaining.min(self.inter_byte_timeout)
            };

            let chunk = self.channel.read_with_timeout(wait).await?;
            if chunk.is_empty() {
                if let Some(frame) = self.take_after_gap() {
                    return Ok(Some(frame));
                }
                continue;
            }
            self.buffer.extend_from_slice(&chunk);
        }
    }

    fn skip_to_flag(&mut self) {
        match self.buffer.iter().position(|&b| b == FLAG) {
            Some(0) => {}
            Some(start) => {
                log::trace!("Dropping {} bytes before flag", start);
                self.buffer.advance(start);
            }
            None => self.buffer.clear(),
        }
        // a closing flag followed by the next opening flag
        while self.buffer.len() >= 2 && self.buffer[1] == FLAG {
            self.buffer.advance(1);
        }
    }

    fn take_complete(&mut self) -> Option<ResponseFrame> {
        if self.buffer.len() < 3 {
            return None;
        }
        let declared = (((self.buffer[1] & 0x07) as usize) << 8) | self.buffer[2] as usize;
        let total = declared + 2;
        if self.buffer.len() >= total && self.buffer[total - 1] == FLAG {
            let frame = self.buffer.split_to(total).to_vec();
            if !self.buffer.is_empty() {
                log::trace!("{} bytes left after frame", self.buffer.len());
            }
            log::trace!("RX: {}", HexBytes(&frame));
            return Some(ResponseFrame::new(frame));
        }
        None
    }

    fn take_after_gap(&mut self) -> Option<ResponseFrame> {
        if self.buffer.len() > MIN_GAP_FRAME && self.buffer.last() == Some(&FLAG) {
            let frame = self.buffer.split().to_vec();
            log::trace!("RX (gap): {}", HexBytes(&frame));
            return Some(ResponseFrame::new(frame));
        }
        None
    }
}
