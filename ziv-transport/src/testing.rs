//! Scripted channel for tests
//!
//! Each write consumes the next [`Reply`] of the script and schedules its
//! bytes on the line, timed from the write. Bytes nobody reads stay on the
//! line across later writes, the way a late answer sits in a UART buffer.
//! Time passes through `tokio::time`, so tests run instantly on a paused
//! runtime.

use crate::channel::ByteChannel;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use ziv_core::TransportError;

/// What the fake meter does after one request
#[derive(Debug, Clone)]
pub enum Reply {
    /// Whole answer available right away
    Frame(Vec<u8>),
    /// Pieces, each available after its delay from the previous one
    Chunks(Vec<(Duration, Vec<u8>)>),
    /// Answer available only after a delay, late answers included
    Delayed(Duration, Vec<u8>),
    /// Nothing comes back
    Silence,
    /// The write itself fails
    WriteError,
    /// The device disappears
    Closed,
}

/// Shared record of every request written
#[derive(Debug, Clone, Default)]
pub struct WriteLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl WriteLog {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.0.lock().map(|w| w.len()).unwrap_or_default()
    }

    fn record(&self, bytes: &[u8]) {
        if let Ok(mut writes) = self.0.lock() {
            writes.push(bytes.to_vec());
        }
    }
}

/// [`ByteChannel`] that plays back a script
#[derive(Debug)]
pub struct ScriptedChannel {
    script: VecDeque<Reply>,
    /// Bytes on the line, ordered by arrival
    pending: VecDeque<(Instant, Vec<u8>)>,
    closed: bool,
    log: WriteLog,
}

impl ScriptedChannel {
    pub fn new(script: Vec<Reply>) -> (Self, WriteLog) {
        let log = WriteLog::default();
        let channel = Self {
            script: script.into(),
            pending: VecDeque::new(),
            closed: false,
            log: log.clone(),
        };
        (channel, log)
    }

    /// Append replies for later requests
    pub fn push(&mut self, reply: Reply) {
        self.script.push_back(reply);
    }

    /// Bytes scheduled but not read yet
    pub fn unread(&self) -> usize {
        self.pending.iter().map(|(_, bytes)| bytes.len()).sum()
    }

    fn schedule(&mut self, at: Instant, bytes: Vec<u8>) {
        let index = self.pending.partition_point(|(arrival, _)| *arrival <= at);
        self.pending.insert(index, (at, bytes));
    }
}

#[async_trait]
impl ByteChannel for ScriptedChannel {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ChannelClosed);
        }
        let now = Instant::now();
        match self.script.pop_front().unwrap_or(Reply::Silence) {
            Reply::WriteError => {
                return Err(TransportError::WriteFailed("scripted failure".to_string()));
            }
            Reply::Frame(frame) => self.schedule(now, frame),
            Reply::Delayed(delay, frame) => self.schedule(now + delay, frame),
            Reply::Chunks(chunks) => {
                let mut at = now;
                for (delay, chunk) in chunks {
                    at += delay;
                    self.schedule(at, chunk);
                }
            }
            Reply::Silence => {}
            Reply::Closed => self.closed = true,
        }
        self.log.record(bytes);
        Ok(())
    }

    async fn read_with_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        match self.pending.front() {
            Some(&(arrival, _)) if arrival <= deadline => {
                tokio::time::sleep_until(arrival).await;
                Ok(self.pending.pop_front().map(|(_, bytes)| bytes).unwrap_or_default())
            }
            Some(_) => {
                tokio::time::sleep_until(deadline).await;
                Ok(Vec::new())
            }
            None if self.closed => Err(TransportError::ChannelClosed),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }
}
