//! Poll orchestrator

mod meter_poller;
mod state;

pub use meter_poller::{MeterPoller, TickOutcome};
pub use state::PollerState;
