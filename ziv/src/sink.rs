//! Ready-made reading sinks

use serde::Serialize;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use ziv_client::ReadingSink;
use ziv_core::{PollError, Reading, RegisterId};

/// Logs every result at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReadingSink for LogSink {
    fn publish(&self, reading: &Reading) {
        log::info!("{}: {} {}", reading.register, reading.value, reading.unit);
    }

    fn no_reading(&self, register: RegisterId, error: &PollError) {
        log::info!("{}: no reading ({})", register, error);
    }
}

#[derive(Serialize)]
struct Missing<'a> {
    register: RegisterId,
    kind: &'static str,
    error: &'a str,
}

/// Writes one JSON object per line
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line<T: Serialize>(&self, value: &T) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let written = serde_json::to_writer(&mut *out, value)
            .map_err(std::io::Error::from)
            .and_then(|()| writeln!(out))
            .and_then(|()| out.flush());
        if let Err(e) = written {
            log::warn!("Failed to write reading: {}", e);
        }
    }
}

impl<W: Write + Send> ReadingSink for JsonLinesSink<W> {
    fn publish(&self, reading: &Reading) {
        self.write_line(reading);
    }

    fn no_reading(&self, register: RegisterId, error: &PollError) {
        let error_text = error.to_string();
        self.write_line(&Missing {
            register,
            kind: error.kind(),
            error: &error_text,
        });
    }
}
