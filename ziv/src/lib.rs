//! Ziv 5CTM meter driver
//!
//! Reads the active energy and power registers of a Ziv 5CTM electricity
//! meter over its optical/RS-485 UART, using DLMS/COSEM over HDLC.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `ziv-core`: registers, readings, errors and configuration
//! - `ziv-transport`: byte channels and the request/response exchange
//! - `ziv-session`: HDLC framing, checksums and sequence numbers
//! - `ziv-application`: APDUs, the frame codec and the register decoder
//! - `ziv-client`: the poll orchestrator
//!
//! # Usage
//!
//! ```no_run
//! use ziv::client::{MeterPoller, IntervalTicks, shutdown_channel};
//! use ziv::sink::LogSink;
//! use ziv::transport::{SerialChannel, SerialSettings};
//! use ziv::MeterConfig;
//!
//! # async fn poll() -> anyhow::Result<()> {
//! let config = MeterConfig::from_file("meter.yaml")?;
//! let channel = SerialChannel::open(&SerialSettings::from(config.serial()))?;
//! let ticks = IntervalTicks::from_interval(config.update_interval());
//! let poller = MeterPoller::new(config, channel)?;
//! let (_handle, shutdown) = shutdown_channel();
//! if let Some(ticks) = ticks {
//!     poller.run(ticks, &LogSink, shutdown).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod sink;

// Re-export core types
pub use ziv_core::{
    MeterConfig, PollError, PollOutcome, Reading, RegisterId, RegisterSet, Unit, ZivError,
    ZivResult,
};

// Re-export client API
pub mod client {
    pub use ziv_client::*;
}

// Re-export transport API
pub mod transport {
    pub use ziv_transport::*;
}

// Re-export protocol layers
pub mod protocol {
    pub use ziv_application::*;
    pub use ziv_session::*;
}
