//! Tick sources driving the poll loop

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use ziv_core::PollInterval;

/// Periodic invocation signal
#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick; `None` once the source is exhausted
    async fn next_tick(&mut self) -> Option<Instant>;
}

/// Fixed-period ticks; the first one fires immediately
///
/// Ticks missed while a cycle overran are skipped, not bunched up.
#[derive(Debug)]
pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    /// `None` for [`PollInterval::Never`]
    pub fn from_interval(interval: PollInterval) -> Option<Self> {
        interval.period().map(Self::new)
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn next_tick(&mut self) -> Option<Instant> {
        Some(self.interval.tick().await)
    }
}

/// Ticks fired on demand through a [`ManualTrigger`]
#[derive(Debug)]
pub struct ManualTicks {
    rx: mpsc::Receiver<()>,
}

/// Fires [`ManualTicks`]
#[derive(Debug, Clone)]
pub struct ManualTrigger {
    tx: mpsc::Sender<()>,
}

impl ManualTicks {
    pub fn new() -> (Self, ManualTrigger) {
        let (tx, rx) = mpsc::channel(1);
        (Self { rx }, ManualTrigger { tx })
    }
}

impl ManualTrigger {
    /// Request a tick
    ///
    /// Returns false if one is already pending or the source is gone.
    pub fn fire(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

#[async_trait]
impl TickSource for ManualTicks {
    /// Exhausted once every trigger is dropped
    async fn next_tick(&mut self) -> Option<Instant> {
        self.rx.recv().await.map(|()| Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticks_period() {
        let mut ticks = IntervalTicks::new(Duration::from_secs(30));
        let first = ticks.next_tick().await.unwrap();
        let second = ticks.next_tick().await.unwrap();
        assert_eq!(second - first, Duration::from_secs(30));
        assert_eq!(ticks.period(), Duration::from_secs(30));
    }

    #[test]
    fn test_never_has_no_interval() {
        assert!(IntervalTicks::from_interval(PollInterval::Never).is_none());
    }

    #[tokio::test]
    async fn test_manual_ticks() {
        let (mut ticks, trigger) = ManualTicks::new();
        assert!(trigger.fire());
        // one pending tick at most
        assert!(!trigger.fire());
        assert!(ticks.next_tick().await.is_some());

        drop(trigger);
        assert!(ticks.next_tick().await.is_none());
    }
}
