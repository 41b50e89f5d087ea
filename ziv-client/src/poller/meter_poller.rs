//! Meter poller
//!
//! # Cycle
//!
//! 1. **Link**: SNRM/UA, resetting the HDLC sequence numbers
//! 2. **Association**: AARQ/AARE with the configured password
//! 3. **Reads**: one GET per enabled register, in polling order
//! 4. **Reporting**: every entry goes to the sink, in order
//!
//! Steps 1-3 are skipped when no register is enabled, so an empty
//! configuration never touches the bus. A failing register is recorded and
//! the cycle moves on; a failed association marks every register with the
//! cause. Nothing is retried within a cycle.
//!
//! # Concurrency
//!
//! The link state sits behind an async mutex taken with `try_lock`, so a tick
//! arriving while a cycle runs is dropped rather than queued.

use super::state::PollerState;
use crate::shutdown::Shutdown;
use crate::sink::ReadingSink;
use crate::statistics::PollStatistics;
use crate::tick::TickSource;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use ziv_application::{FrameCodec, RegisterDecoder};
use ziv_core::{
    FrameError, MeterConfig, PollError, PollOutcome, Reading, RegisterId, ResponseFrame,
    TransportError, ZivResult,
};
use ziv_session::HdlcSequence;
use ziv_transport::{ByteChannel, TransportSession};

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A cycle ran and was reported
    Completed(PollOutcome),
    /// A cycle was already in flight, the tick was dropped
    Skipped,
}

impl TickOutcome {
    pub fn outcome(&self) -> Option<&PollOutcome> {
        match self {
            TickOutcome::Completed(outcome) => Some(outcome),
            TickOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped)
    }
}

/// State held for the length of a cycle
#[derive(Debug)]
struct Link<C> {
    session: TransportSession<C>,
    sequence: HdlcSequence,
    /// Where `sequence` would be had the last timed-out request reached the
    /// meter
    unanswered: Option<HdlcSequence>,
}

/// One frame read while waiting for an answer
enum Answer<T> {
    /// The answer to our request, good or bad
    Ours(Result<T, PollError>),
    /// Not an answer to our request
    Stray(FrameError),
}

/// Read frames until one answers the request or `deadline` passes
///
/// Stray frames are skipped; the last one is reported if nothing else
/// arrives.
async fn await_answer<C, T, F>(
    session: &mut TransportSession<C>,
    timeout: Duration,
    deadline: Instant,
    mut classify: F,
) -> Result<T, PollError>
where
    C: ByteChannel,
    F: FnMut(&ResponseFrame) -> Answer<T>,
{
    let mut stray = None;
    while let Some(frame) = session.receive(deadline).await? {
        match classify(&frame) {
            Answer::Ours(result) => return result,
            Answer::Stray(error) => {
                log::debug!("Skipping frame that does not answer the request: {}", error);
                stray = Some(error);
            }
        }
    }
    Err(match stray {
        Some(error) => error.into(),
        None => TransportError::Timeout(timeout).into(),
    })
}

/// Sequence state after the meter's `control`, if it fits the current state
/// or the state in which the last unanswered request got through
fn accept_control(
    sequence: HdlcSequence,
    unanswered: Option<HdlcSequence>,
    control: u8,
) -> Option<HdlcSequence> {
    std::iter::once(sequence)
        .chain(unanswered)
        .find_map(|candidate| {
            let mut next = candidate;
            next.acknowledge(control).ok().map(|()| next)
        })
}

/// `sequence` moved on by the answer the meter owes us
fn answered(sequence: HdlcSequence) -> Option<HdlcSequence> {
    let mut next = sequence;
    next.acknowledge(sequence.expected_response_control())
        .ok()
        .map(|()| next)
}

#[derive(Debug, Default)]
struct Monitor {
    state: PollerState,
    statistics: PollStatistics,
}

/// Polls one meter over one channel
///
/// Built from a validated [`MeterConfig`]; the channel is owned for the
/// poller's lifetime.
#[derive(Debug)]
pub struct MeterPoller<C> {
    config: MeterConfig,
    codec: FrameCodec,
    decoder: RegisterDecoder,
    link: tokio::sync::Mutex<Link<C>>,
    monitor: Mutex<Monitor>,
}

impl<C: ByteChannel> MeterPoller<C> {
    pub fn new(config: MeterConfig, channel: C) -> ZivResult<Self> {
        let codec = FrameCodec::new(config.link())?;
        let session =
            TransportSession::with_inter_byte_timeout(channel, config.inter_byte_timeout());
        Ok(Self {
            config,
            codec,
            decoder: RegisterDecoder::new(),
            link: tokio::sync::Mutex::new(Link {
                session,
                sequence: HdlcSequence::new(),
                unanswered: None,
            }),
            monitor: Mutex::new(Monitor::default()),
        })
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn state(&self) -> PollerState {
        self.monitor().state
    }

    /// Snapshot of the counters
    pub fn statistics(&self) -> PollStatistics {
        self.monitor().statistics.clone()
    }

    /// Run one poll cycle, unless one is already running
    ///
    /// Dropping the returned future before it completes abandons the cycle;
    /// the sink then receives nothing for it.
    pub async fn tick<S>(&self, sink: &S) -> TickOutcome
    where
        S: ReadingSink + ?Sized,
    {
        let Ok(mut link) = self.link.try_lock() else {
            log::debug!("Poll cycle in flight, dropping tick");
            self.monitor().statistics.increment_ticks_dropped();
            return TickOutcome::Skipped;
        };
        self.abandon_cycle();

        self.transition(PollerState::Polling);
        let outcome = self.poll_registers(&mut link).await;

        self.transition(PollerState::Reporting);
        self.report(&outcome, sink);

        self.transition(PollerState::Idle);
        TickOutcome::Completed(outcome)
    }

    /// Poll on every tick until shutdown or until the ticks run out
    ///
    /// Ticks arriving during a cycle are dropped. On shutdown the cycle in
    /// flight is abandoned without reporting. Returns the final counters.
    pub async fn run<T, S>(&self, mut ticks: T, sink: &S, mut shutdown: Shutdown) -> PollStatistics
    where
        T: TickSource,
        S: ReadingSink + ?Sized,
    {
        log::info!(
            "Polling {} register(s), interval {}",
            self.config.registers().len(),
            self.config.update_interval()
        );

        'ticks: loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                tick = ticks.next_tick() => {
                    if tick.is_none() {
                        log::debug!("Tick source exhausted");
                        break;
                    }
                }
            }

            let cycle = self.tick(sink);
            tokio::pin!(cycle);
            let mut ticks_open = true;
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait() => {
                        log::info!("Shutdown during poll cycle, discarding its results");
                        break 'ticks;
                    }
                    _ = &mut cycle => break,
                    tick = ticks.next_tick(), if ticks_open => match tick {
                        Some(_) => {
                            log::debug!("Tick during poll cycle dropped");
                            self.monitor().statistics.increment_ticks_dropped();
                        }
                        None => ticks_open = false,
                    },
                }
            }
            if !ticks_open {
                log::debug!("Tick source exhausted");
                break;
            }
        }

        self.abandon_cycle();
        let statistics = self.statistics();
        log::info!(
            "Poller stopped after {} cycle(s): {} reading(s), {} failure(s)",
            statistics.cycles_completed,
            statistics.readings,
            statistics.total_failures()
        );
        statistics
    }

    async fn poll_registers(&self, link: &mut Link<C>) -> PollOutcome {
        let registers = self.config.registers();
        let mut outcome = PollOutcome::new();
        if registers.is_empty() {
            log::debug!("No registers enabled");
            return outcome;
        }

        if let Err(error) = self.associate(link).await {
            log::error!("Association with meter failed: {}", error);
            for register in registers.iter() {
                outcome.push(register, Err(PollError::Association(Box::new(error.clone()))));
            }
            return outcome;
        }

        for register in registers.iter() {
            let result = self.read_register(link, register).await;
            if let Err(error) = &result {
                log::warn!("No reading for {}: {}", register, error);
            }
            outcome.push(register, result);
        }
        outcome
    }

    async fn associate(&self, link: &mut Link<C>) -> Result<(), PollError> {
        let timeout = self.config.response_timeout();
        link.sequence.reset();
        link.unanswered = None;

        link.session.send(&self.codec.snrm_request()).await?;
        let deadline = Instant::now() + timeout;
        await_answer(&mut link.session, timeout, deadline, |response| {
            match self.codec.decode_ua(response) {
                Ok(()) => Answer::Ours(Ok(())),
                Err(error) => Answer::Stray(error),
            }
        })
        .await?;

        link.session
            .send(&self.codec.aarq_request(&link.sequence))
            .await?;
        let deadline = Instant::now() + timeout;
        let Link {
            session, sequence, ..
        } = &mut *link;
        await_answer(session, timeout, deadline, |response| {
            let frame = match self.codec.open_information(response) {
                Ok(frame) => frame,
                Err(error) => return Answer::Stray(error),
            };
            let mut next = *sequence;
            if let Err(error) = next.acknowledge(frame.control) {
                return Answer::Stray(error);
            }
            *sequence = next;
            Answer::Ours(self.codec.decode_aare(&frame).map(drop).map_err(Into::into))
        })
        .await?;

        log::debug!(
            "Associated with meter {}",
            self.codec.addresses().destination()
        );
        Ok(())
    }

    /// One GET exchange; the sequence moves on any valid information frame,
    /// even one carrying an error
    async fn read_register(
        &self,
        link: &mut Link<C>,
        register: RegisterId,
    ) -> Result<Reading, PollError> {
        let timeout = self.config.response_timeout();
        let request = self.codec.encode_request(register, &link.sequence);
        self.monitor().statistics.increment_register_exchanges();
        link.session.send(&request).await?;
        let deadline = Instant::now() + timeout;

        let mut matched = false;
        let Link {
            session,
            sequence,
            unanswered,
        } = &mut *link;
        let result = await_answer(session, timeout, deadline, |response| {
            let frame = match self.codec.open_information(response) {
                Ok(frame) => frame,
                Err(error) => return Answer::Stray(error),
            };
            let Some(next) = accept_control(*sequence, *unanswered, frame.control) else {
                return Answer::Stray(FrameError::UnexpectedControl(frame.control));
            };
            *sequence = next;
            *unanswered = None;
            match self.codec.decode_get(&frame, register) {
                // answer to an earlier request, the meter has moved on with it
                Err(error @ FrameError::UnexpectedRegister { .. }) => Answer::Stray(error),
                Err(error) => {
                    matched = true;
                    Answer::Ours(Err(error.into()))
                }
                Ok(payload) => {
                    matched = true;
                    Answer::Ours(
                        self.decoder
                            .decode(&payload, register)
                            .map(|value| Reading::new(register, value, Utc::now()))
                            .map_err(Into::into),
                    )
                }
            }
        })
        .await;

        if !matched && result.is_err() {
            link.unanswered = answered(link.sequence);
        }
        result
    }

    fn report<S>(&self, outcome: &PollOutcome, sink: &S)
    where
        S: ReadingSink + ?Sized,
    {
        for entry in outcome {
            match &entry.result {
                Ok(reading) => {
                    log::debug!("{}: {} {}", reading.register, reading.value, reading.unit);
                    sink.publish(reading);
                }
                Err(error) => sink.no_reading(entry.register, error),
            }
        }
        self.monitor().statistics.record_cycle(outcome);
    }

    /// Put a cycle that was dropped mid-flight back to `Idle`
    fn abandon_cycle(&self) {
        let mut monitor = self.monitor();
        if monitor.state.is_busy() {
            log::debug!("Poll cycle abandoned in state {}", monitor.state);
            monitor.state = PollerState::Idle;
            monitor.statistics.increment_cycles_cancelled();
        }
    }

    fn transition(&self, next: PollerState) {
        let mut monitor = self.monitor();
        debug_assert!(
            monitor.state.can_transition_to(next),
            "invalid poller transition {} -> {}",
            monitor.state,
            next
        );
        log::debug!("Poller {} -> {}", monitor.state, next);
        monitor.state = next;
    }

    fn monitor(&self) -> MutexGuard<'_, Monitor> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use crate::sink::MockReadingSink;
    use crate::tick::{IntervalTicks, ManualTicks};
    use mockall::Sequence;
    use std::time::Duration;
    use ziv_application::fixtures::{self, MeterScript};
    use ziv_core::{DataObject, FrameError, RegisterSet, TransportError};
    use ziv_transport::testing::{Reply, ScriptedChannel, WriteLog};

    /// Byte offset of the invoke-id in a GET request frame
    const INVOKE_OFFSET: usize = 14;

    fn config(registers: &[RegisterId]) -> MeterConfig {
        MeterConfig::builder("/dev/ttyTEST")
            .registers(registers.iter().copied().collect::<RegisterSet>())
            .build()
            .expect("valid config")
    }

    fn replies(script: MeterScript) -> Vec<Reply> {
        script
            .build()
            .into_iter()
            .map(|reply| reply.map_or(Reply::Silence, Reply::Frame))
            .collect()
    }

    fn poller_with(
        registers: &[RegisterId],
        replies: Vec<Reply>,
    ) -> (MeterPoller<ScriptedChannel>, WriteLog) {
        let (channel, log) = ScriptedChannel::new(replies);
        let poller = MeterPoller::new(config(registers), channel).expect("poller");
        (poller, log)
    }

    fn poller(
        registers: &[RegisterId],
        script: MeterScript,
    ) -> (MeterPoller<ScriptedChannel>, WriteLog) {
        poller_with(registers, replies(script))
    }

    fn full_cycle(script: MeterScript) -> MeterScript {
        script
            .associate()
            .value(RegisterId::ImportActiveEnergy, DataObject::Unsigned32(1200))
            .value(RegisterId::ExportActiveEnergy, DataObject::Unsigned32(35))
            .value(RegisterId::ImportActivePower, DataObject::Integer32(153))
            .value(RegisterId::ExportActivePower, DataObject::Integer16(-20))
    }

    /// Hold back the answer at `index` by `by`
    fn delay(replies: &mut [Reply], index: usize, by: Duration) {
        if let Reply::Frame(frame) = &replies[index] {
            replies[index] = Reply::Delayed(by, frame.clone());
        }
    }

    fn quiet_sink() -> MockReadingSink {
        let mut sink = MockReadingSink::new();
        sink.expect_publish().return_const(());
        sink.expect_no_reading().return_const(());
        sink
    }

    #[tokio::test]
    async fn test_empty_set_never_touches_bus() {
        let (poller, log) = poller(&[], MeterScript::new());
        let sink = MockReadingSink::new();

        let outcome = poller.tick(&sink).await;
        assert_eq!(outcome, TickOutcome::Completed(PollOutcome::new()));
        assert_eq!(log.count(), 0);

        let stats = poller.statistics();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.register_exchanges, 0);
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test]
    async fn test_all_registers_in_fixed_order() {
        let mut reversed = RegisterId::ALL;
        reversed.reverse();
        let (poller, log) = poller(&reversed, full_cycle(MeterScript::new()));

        let outcome = poller.tick(&quiet_sink()).await;
        let outcome = outcome.outcome().expect("cycle ran");
        assert_eq!(outcome.registers(), RegisterId::ALL.to_vec());

        let values: Vec<i64> = outcome.readings().map(|r| r.value).collect();
        assert_eq!(values, vec![1200, 35, 1530, 200]);

        // SNRM, AARQ, then one GET per register
        let writes = log.writes();
        assert_eq!(writes.len(), 6);
        let invoke_ids: Vec<u8> = writes[2..].iter().map(|w| w[INVOKE_OFFSET]).collect();
        assert_eq!(invoke_ids, vec![0xC1, 0xC2, 0xC3, 0xC4]);
        assert_eq!(poller.statistics().register_exchanges, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_on_second_register() {
        let script = MeterScript::new()
            .associate()
            .value(RegisterId::ImportActiveEnergy, DataObject::Unsigned32(1200))
            .silence()
            .value(RegisterId::ImportActivePower, DataObject::Unsigned16(40))
            .value(RegisterId::ExportActivePower, DataObject::Integer32(0));
        let (poller, log) = poller(&RegisterId::ALL, script);

        let mut sink = MockReadingSink::new();
        let mut seq = Sequence::new();
        sink.expect_publish()
            .withf(|r| r.register == RegisterId::ImportActiveEnergy && r.value == 1200)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_no_reading()
            .withf(|register, error| {
                *register == RegisterId::ExportActiveEnergy
                    && matches!(error, PollError::Transport(TransportError::Timeout(_)))
            })
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_publish()
            .withf(|r| r.register == RegisterId::ImportActivePower && r.value == 400)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        sink.expect_publish()
            .withf(|r| r.register == RegisterId::ExportActivePower && r.value == 0)
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let outcome = poller.tick(&sink).await;
        assert_eq!(outcome.outcome().map(PollOutcome::len), Some(4));
        // one attempt each, no retry
        assert_eq!(log.count(), 6);
        assert_eq!(poller.statistics().failures.get("timeout"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_answer_does_not_shift_later_registers() {
        // the third answer arrives before or after the late second one
        for third_delay in [Duration::ZERO, Duration::from_secs(1)] {
            let mut replies = replies(full_cycle(MeterScript::new()));
            delay(&mut replies, 3, Duration::from_millis(2500));
            delay(&mut replies, 4, third_delay);
            let (poller, log) = poller_with(&RegisterId::ALL, replies);

            let outcome = poller.tick(&quiet_sink()).await;
            let outcome = outcome.outcome().expect("cycle ran");
            let values: Vec<Result<i64, &PollError>> = RegisterId::ALL
                .iter()
                .map(|register| {
                    let entry = outcome.get(*register).expect("entry");
                    entry.result.as_ref().map(|reading| reading.value)
                })
                .collect();
            assert_eq!(values[0], Ok(1200));
            assert!(matches!(
                values[1],
                Err(PollError::Transport(TransportError::Timeout(_)))
            ));
            assert_eq!(values[2], Ok(1530));
            assert_eq!(values[3], Ok(200));
            assert_eq!(log.count(), 6);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_for_other_register_reported_at_deadline() {
        let stray = fixtures::get_response_with_invoke(4, &DataObject::Unsigned8(1), 0x52);
        let script = MeterScript::new().associate().raw(stray);
        let (poller, _log) = poller(&[RegisterId::ImportActiveEnergy], script);

        let started = Instant::now();
        let outcome = poller.tick(&quiet_sink()).await;
        assert!(started.elapsed() >= Duration::from_secs(2));
        let entry = outcome
            .outcome()
            .and_then(|o| o.get(RegisterId::ImportActiveEnergy))
            .expect("entry");
        assert_eq!(
            entry.result,
            Err(PollError::Frame(FrameError::UnexpectedRegister {
                expected: RegisterId::ImportActiveEnergy,
                found: 4,
            }))
        );
    }

    #[tokio::test]
    async fn test_consecutive_cycles_identical() {
        let script = full_cycle(full_cycle(MeterScript::new()));
        let (poller, log) = poller(&RegisterId::ALL, script);
        let sink = quiet_sink();

        let first = poller.tick(&sink).await;
        let second = poller.tick(&sink).await;
        let first = first.outcome().expect("first cycle");
        let second = second.outcome().expect("second cycle");
        assert_eq!(first.registers(), second.registers());
        assert_eq!(second.readings().count(), 4);

        // the link is re-established each cycle, so the bytes repeat
        let writes = log.writes();
        assert_eq!(writes.len(), 12);
        assert_eq!(writes[..6], writes[6..]);
        assert_eq!(poller.statistics().cycles_completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_during_cycle_dropped() {
        let mut replies = replies(
            MeterScript::new()
                .associate()
                .value(RegisterId::ImportActiveEnergy, DataObject::Unsigned8(7)),
        );
        delay(&mut replies, 0, Duration::from_millis(500));
        let (poller, log) = poller_with(&[RegisterId::ImportActiveEnergy], replies);
        let sink = quiet_sink();

        let (first, second) = tokio::join!(poller.tick(&sink), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            poller.tick(&sink).await
        });

        assert_eq!(second, TickOutcome::Skipped);
        let first = first.outcome().expect("first cycle ran");
        assert_eq!(first.readings().map(|r| r.value).collect::<Vec<_>>(), vec![7]);
        assert_eq!(log.count(), 3);
        assert_eq!(poller.statistics().ticks_dropped, 1);
    }

    #[tokio::test]
    async fn test_association_rejected_marks_every_register() {
        let registers = [RegisterId::ImportActiveEnergy, RegisterId::ExportActivePower];
        let (poller, log) = poller(&registers, MeterScript::new().reject_association(1));

        let mut sink = MockReadingSink::new();
        sink.expect_no_reading()
            .withf(|_, error| {
                *error
                    == PollError::Association(Box::new(PollError::Frame(
                        FrameError::AssociationRejected(1),
                    )))
            })
            .times(2)
            .return_const(());

        let outcome = poller.tick(&sink).await;
        let outcome = outcome.outcome().expect("cycle ran");
        assert_eq!(outcome.registers(), registers.to_vec());
        assert_eq!(outcome.readings().count(), 0);
        // SNRM and AARQ only
        assert_eq!(log.count(), 2);
        assert_eq!(poller.statistics().failures.get("association"), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_meter_fails_association() {
        let (poller, log) = poller(&[RegisterId::ImportActivePower], MeterScript::new().silence());

        let outcome = poller.tick(&quiet_sink()).await;
        let outcome = outcome.outcome().expect("cycle ran");
        let entry = outcome.get(RegisterId::ImportActivePower).expect("entry");
        assert!(matches!(
            &entry.result,
            Err(PollError::Association(cause))
                if matches!(**cause, PollError::Transport(TransportError::Timeout(_)))
        ));
        assert_eq!(log.count(), 1);
    }

    #[tokio::test]
    async fn test_access_error_keeps_link_in_step() {
        let script = MeterScript::new()
            .associate()
            .value(RegisterId::ImportActiveEnergy, DataObject::Unsigned32(1))
            .access_error(RegisterId::ExportActiveEnergy, 3)
            .value(RegisterId::ImportActivePower, DataObject::Integer8(2))
            .value(RegisterId::ExportActivePower, DataObject::Integer8(3));
        let (poller, _log) = poller(&RegisterId::ALL, script);

        let outcome = poller.tick(&quiet_sink()).await;
        let outcome = outcome.outcome().expect("cycle ran");
        let failures: Vec<_> = outcome.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, RegisterId::ExportActiveEnergy);
        assert_eq!(failures[0].1, &PollError::Frame(FrameError::DataAccess(3)));
        let values: Vec<i64> = outcome.readings().map(|r| r.value).collect();
        assert_eq!(values, vec![1, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_cycle_discards_outcome() {
        let script = MeterScript::new().associate().silence();
        let (poller, _log) = poller(&[RegisterId::ImportActiveEnergy], script);
        // any sink call fails the test
        let sink = MockReadingSink::new();
        let (ticks, trigger) = ManualTicks::new();
        let (handle, shutdown) = shutdown_channel();

        let (stats, ()) = tokio::join!(poller.run(ticks, &sink, shutdown), async move {
            trigger.fire();
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.shutdown();
        });

        assert_eq!(stats.cycles_completed, 0);
        assert_eq!(stats.cycles_cancelled, 1);
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answer_left_by_shutdown_does_not_break_next_cycle() {
        let script = MeterScript::new()
            .associate()
            .value(RegisterId::ImportActiveEnergy, DataObject::Unsigned32(1))
            .associate()
            .value(RegisterId::ImportActiveEnergy, DataObject::Unsigned32(2));
        let mut replies = replies(script);
        // first GET answered after shutdown, lands while the next SNRM waits
        delay(&mut replies, 2, Duration::from_secs(1));
        delay(&mut replies, 3, Duration::from_millis(800));
        let (poller, log) = poller_with(&[RegisterId::ImportActiveEnergy], replies);

        let silent = MockReadingSink::new();
        let (ticks, trigger) = ManualTicks::new();
        let (handle, shutdown) = shutdown_channel();
        let (stats, ()) = tokio::join!(poller.run(ticks, &silent, shutdown), async move {
            trigger.fire();
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.shutdown();
        });
        assert_eq!(stats.cycles_cancelled, 1);

        let mut sink = MockReadingSink::new();
        sink.expect_publish()
            .withf(|r| r.register == RegisterId::ImportActiveEnergy && r.value == 2)
            .times(1)
            .return_const(());
        let outcome = poller.tick(&sink).await;
        assert_eq!(outcome.outcome().map(|o| o.readings().count()), Some(1));
        assert_eq!(log.count(), 6);
        assert_eq!(poller.statistics().cycles_completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_on_interval() {
        let script = MeterScript::new()
            .associate()
            .value(RegisterId::ExportActiveEnergy, DataObject::Unsigned16(10))
            .associate()
            .value(RegisterId::ExportActiveEnergy, DataObject::Unsigned16(11));
        let (poller, log) = poller(&[RegisterId::ExportActiveEnergy], script);

        let mut sink = MockReadingSink::new();
        sink.expect_publish().times(2).return_const(());
        let ticks = IntervalTicks::new(Duration::from_secs(30));
        let (handle, shutdown) = shutdown_channel();

        let (stats, ()) = tokio::join!(poller.run(ticks, &sink, shutdown), async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            handle.shutdown();
        });

        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.readings, 2);
        assert_eq!(stats.cycles_cancelled, 0);
        assert_eq!(log.count(), 6);
    }

    #[tokio::test]
    async fn test_run_ends_with_manual_ticks() {
        let (poller, _log) = poller(&[], MeterScript::new());
        let sink = MockReadingSink::new();
        let (ticks, trigger) = ManualTicks::new();
        let (_handle, shutdown) = shutdown_channel();

        trigger.fire();
        drop(trigger);
        let stats = poller.run(ticks, &sink, shutdown).await;
        assert_eq!(stats.cycles_completed, 1);
    }
}
