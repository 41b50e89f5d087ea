//! Poll orchestrator for the Ziv 5CTM meter driver
//!
//! Each tick runs one poll cycle: open the HDLC link, associate, then read
//! every enabled register in fixed order, one request at a time. The cycle
//! ends by reporting a reading or an explicit "no reading" per register to a
//! [`ReadingSink`].
//!
//! - [`poller`]: [`MeterPoller`] and its Idle/Polling/Reporting state machine
//! - [`tick`]: periodic and manual [`TickSource`]s
//! - [`sink`]: the [`ReadingSink`] receiving results
//! - [`shutdown`]: stopping the run loop
//! - [`statistics`]: counters kept across cycles

pub mod poller;
pub mod shutdown;
pub mod sink;
pub mod statistics;
pub mod tick;

pub use poller::{MeterPoller, PollerState, TickOutcome};
pub use shutdown::{Shutdown, ShutdownHandle, shutdown_channel};
pub use sink::ReadingSink;
pub use statistics::PollStatistics;
pub use tick::{IntervalTicks, ManualTicks, ManualTrigger, TickSource};
