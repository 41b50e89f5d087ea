//! Poller state machine

use std::fmt;

/// Where the poller is in its cycle
///
/// `Idle -> Polling -> Reporting -> Idle`. A cycle cut short by shutdown goes
/// from `Polling` straight back to `Idle`. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerState {
    /// Waiting for a tick
    #[default]
    Idle,
    /// Exchanging frames with the meter
    Polling,
    /// Handing the cycle's results to the sink
    Reporting,
}

impl PollerState {
    pub fn can_transition_to(self, next: PollerState) -> bool {
        matches!(
            (self, next),
            (PollerState::Idle, PollerState::Polling)
                | (PollerState::Polling, PollerState::Reporting)
                | (PollerState::Polling, PollerState::Idle)
                | (PollerState::Reporting, PollerState::Idle)
        )
    }

    /// A cycle is in flight
    pub fn is_busy(self) -> bool {
        !matches!(self, PollerState::Idle)
    }
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollerState::Idle => write!(f, "Idle"),
            PollerState::Polling => write!(f, "Polling"),
            PollerState::Reporting => write!(f, "Reporting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use PollerState::*;
        assert!(Idle.can_transition_to(Polling));
        assert!(Polling.can_transition_to(Reporting));
        assert!(Reporting.can_transition_to(Idle));
        assert!(Polling.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Reporting));
        assert!(!Reporting.can_transition_to(Polling));
        assert!(!Idle.is_busy());
        assert!(Polling.is_busy());
    }
}
