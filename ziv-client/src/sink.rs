//! Destination of poll results

use ziv_core::{PollError, Reading, RegisterId};

/// Receives the results of each completed cycle
///
/// Called in polling order once per enabled register: `publish` for a
/// reading, `no_reading` when the register could not be read. A failure is
/// never reported as a zero value. Results of a cycle cut short by shutdown
/// are not delivered at all.
#[cfg_attr(test, mockall::automock)]
pub trait ReadingSink: Send + Sync {
    fn publish(&self, reading: &Reading);

    fn no_reading(&self, register: RegisterId, error: &PollError);
}
