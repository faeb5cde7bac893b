//! The listener control loop.
//!
//! One event at a time: announce `READY`, read an envelope, classify it,
//! buffer it if it is interesting, flush when the [`FlushPolicy`] says so,
//! then acknowledge with `RESULT 2\nOK`. The supervisor blocks until it sees
//! the acknowledgement, so nothing here runs concurrently.
//!
//! Delivery failures stay inside the flush step: they are logged and
//! counted, and the acknowledgement goes out regardless. Only a
//! [`ProtocolError`] ends the loop early.

use std::time::Duration;

use events::{
    is_interesting, parse_event_record, BatchBuffer, DeliveryError, EventRecord, MalformedEvent,
    Notifier, Subscription, Timestamp, DEFAULT_BATCH_CAPACITY, PROCESS_STATE_PREFIX,
};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{EventEnvelope, EventReader, EventWriter, ProtocolError};

/// Default bound on a single notifier call.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where the listener is in the READY / event / RESULT handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerState {
    /// `READY` has been (or is about to be) sent; blocked on the next header.
    WaitingForEvent,
    /// An envelope has been read and is being parsed, filtered and buffered.
    ProcessingEvent,
    /// Processing is finished; the `RESULT` frame is being written.
    AwaitingAck,
}

impl ListenerState {
    /// Returns `true` if the handshake allows moving from `self` to `next`.
    ///
    /// The cycle is strictly `WaitingForEvent -> ProcessingEvent ->
    /// AwaitingAck -> WaitingForEvent`.
    pub fn can_transition_to(self, next: ListenerState) -> bool {
        matches!(
            (self, next),
            (ListenerState::WaitingForEvent, ListenerState::ProcessingEvent)
                | (ListenerState::ProcessingEvent, ListenerState::AwaitingAck)
                | (ListenerState::AwaitingAck, ListenerState::WaitingForEvent)
        )
    }
}

impl std::fmt::Display for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ListenerState::WaitingForEvent => "WAITING_FOR_EVENT",
            ListenerState::ProcessingEvent => "PROCESSING_EVENT",
            ListenerState::AwaitingAck => "AWAITING_ACK",
        })
    }
}

// ---------------------------------------------------------------------------
// Flush policy
// ---------------------------------------------------------------------------

/// Periodic clock events the supervisor can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickEvent {
    Tick5,
    Tick60,
    Tick3600,
}

impl TickEvent {
    /// The wire event name, e.g. `TICK_60`.
    pub fn as_str(self) -> &'static str {
        match self {
            TickEvent::Tick5 => "TICK_5",
            TickEvent::Tick60 => "TICK_60",
            TickEvent::Tick3600 => "TICK_3600",
        }
    }

    /// Wall-clock time one tick represents.
    pub fn period(self) -> Duration {
        match self {
            TickEvent::Tick5 => Duration::from_secs(5),
            TickEvent::Tick60 => Duration::from_secs(60),
            TickEvent::Tick3600 => Duration::from_secs(3600),
        }
    }

    /// Ticks needed to cover `interval_minutes`, never less than one.
    ///
    /// Computed on whole milliseconds so that, say, 24 `TICK_5`s make
    /// exactly two minutes.
    pub fn ticks_for(self, interval_minutes: f64) -> u64 {
        let interval_ms = (interval_minutes * 60_000.0).round() as u64;
        let period_ms = self.period().as_millis() as u64;
        interval_ms.div_ceil(period_ms).max(1)
    }

    /// Case-insensitive lookup by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        [TickEvent::Tick5, TickEvent::Tick60, TickEvent::Tick3600]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for TickEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When buffered records are handed to the notifier.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum FlushPolicy {
    /// Flush at the end of every cycle that buffered a record.
    #[default]
    EveryEvent,
    /// Accumulate across cycles; flush once `tick` events add up to at least
    /// `interval_minutes`.
    Tick {
        tick: TickEvent,
        interval_minutes: f64,
    },
}

/// Everything the loop needs besides its streams and notifier.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub subscription: Subscription,
    pub flush_policy: FlushPolicy,
    /// Bound on pending records between flushes.
    pub max_batch: usize,
    /// Bound on a single notifier call.
    pub delivery_timeout: Duration,
}

impl ListenerOptions {
    /// Options with default batching, capacity and timeout.
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            flush_policy: FlushPolicy::default(),
            max_batch: DEFAULT_BATCH_CAPACITY,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes and counters
// ---------------------------------------------------------------------------

/// What one cycle did with its envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The record passed the filter and is in the buffer (or was flushed).
    Buffered,
    /// The record parsed but its state is not subscribed.
    Filtered,
    /// The payload was malformed; the event was dropped.
    Dropped(MalformedEvent),
    /// A tick event was counted towards the batch interval.
    Tick,
    /// Not a process-state event; acknowledged and ignored.
    Ignored,
}

/// Running totals over the lifetime of a [`Listener`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub events_read: u64,
    pub buffered: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub batches_delivered: u64,
    pub batches_failed: u64,
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// Drives the supervisor handshake over `R`/`W` and delivers through `N`.
pub struct Listener<R, W, N> {
    reader: EventReader<R>,
    writer: EventWriter<W>,
    notifier: N,
    subscription: Subscription,
    flush_policy: FlushPolicy,
    delivery_timeout: Duration,
    buffer: BatchBuffer,
    ticks_seen: u64,
    state: ListenerState,
    stats: ListenerStats,
}

impl<R, W, N> Listener<R, W, N>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    N: Notifier,
{
    pub fn new(input: R, output: W, notifier: N, options: ListenerOptions) -> Self {
        Self {
            reader: EventReader::new(input),
            writer: EventWriter::new(output),
            notifier,
            subscription: options.subscription,
            flush_policy: options.flush_policy,
            delivery_timeout: options.delivery_timeout,
            buffer: BatchBuffer::new(options.max_batch),
            ticks_seen: 0,
            state: ListenerState::WaitingForEvent,
            stats: ListenerStats::default(),
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn stats(&self) -> ListenerStats {
        self.stats
    }

    /// Records accepted since the last flush, oldest first.
    pub fn pending(&self) -> &[EventRecord] {
        self.buffer.pending()
    }

    /// Runs cycles until the supervisor closes stdin, then flushes whatever
    /// is still pending.
    pub async fn run(&mut self) -> Result<ListenerStats, ProtocolError> {
        info!(
            subscription = %self.subscription,
            policy = ?self.flush_policy,
            "listening for supervisor events"
        );
        loop {
            match self.step().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(err) => {
                    if !self.buffer.is_empty() {
                        error!(
                            pending = self.buffer.len(),
                            error = %err,
                            "protocol error; flushing pending batch before stopping"
                        );
                        self.flush().await;
                    }
                    return Err(err);
                }
            }
        }

        if !self.buffer.is_empty() {
            info!(pending = self.buffer.len(), "input closed; flushing pending batch");
            self.flush().await;
        }
        info!(stats = ?self.stats, "supervisor closed the event stream");
        Ok(self.stats)
    }

    /// Runs one READY / event / RESULT cycle.
    ///
    /// Returns `Ok(None)` when the input ended cleanly before a new
    /// envelope.
    pub async fn step(&mut self) -> Result<Option<Disposition>, ProtocolError> {
        self.writer.ready().await?;
        let Some(envelope) = self.reader.read_event().await? else {
            return Ok(None);
        };
        self.stats.events_read += 1;
        self.transition(ListenerState::ProcessingEvent);

        let disposition = self.process(&envelope).await;

        self.transition(ListenerState::AwaitingAck);
        self.writer.ok().await?;
        self.transition(ListenerState::WaitingForEvent);
        Ok(Some(disposition))
    }

    /// Classifies one envelope and flushes if the policy calls for it.
    async fn process(&mut self, envelope: &EventEnvelope) -> Disposition {
        let name = envelope.event_name();

        if let Some(tick) = TickEvent::from_name(name) {
            if self.on_tick(tick) {
                self.flush().await;
            }
            return Disposition::Tick;
        }
        if !has_process_state_prefix(name) {
            debug!(event = name, "ignoring non process-state event");
            return Disposition::Ignored;
        }

        let record = match parse_event_record(name, envelope.payload(), Timestamp::now()) {
            Ok(record) => record,
            Err(err) => {
                self.stats.dropped += 1;
                match &err {
                    MalformedEvent::UnknownEvent { .. } => {
                        debug!(event = name, error = %err, "dropping event outside the vocabulary")
                    }
                    _ => warn!(event = name, error = %err, "dropping malformed event"),
                }
                return Disposition::Dropped(err);
            }
        };

        if !is_interesting(name, &self.subscription) {
            self.stats.filtered += 1;
            trace!(event = name, process = %record.process_name(), "not subscribed");
            return Disposition::Filtered;
        }

        info!("{}", record.summary());
        self.stats.buffered += 1;
        self.accept(record).await;
        if self.flush_policy == FlushPolicy::EveryEvent {
            self.flush().await;
        }
        Disposition::Buffered
    }

    /// Counts a tick towards the batch interval.
    fn on_tick(&mut self, tick: TickEvent) -> bool {
        let FlushPolicy::Tick {
            tick: clock,
            interval_minutes,
        } = self.flush_policy
        else {
            return false;
        };
        if tick != clock {
            return false;
        }
        self.ticks_seen += 1;
        if self.ticks_seen >= tick.ticks_for(interval_minutes) {
            trace!(ticks = self.ticks_seen, "batch interval elapsed");
            self.ticks_seen = 0;
            true
        } else {
            false
        }
    }

    /// Buffers `record`. A full buffer is flushed early rather than
    /// dropping anything.
    async fn accept(&mut self, record: EventRecord) {
        let Err(full) = self.buffer.append(record) else {
            return;
        };
        error!(
            capacity = full.capacity,
            "batch buffer full; flushing the pending batch early"
        );
        self.flush().await;
        if let Err(full) = self.buffer.append(*full.record) {
            error!(
                capacity = full.capacity,
                process = %full.record.process_name(),
                "record still does not fit after flush"
            );
        }
    }

    /// Drains the buffer and delivers it once, bounded by the delivery
    /// timeout. Never fails: errors are logged and counted.
    async fn flush(&mut self) {
        let batch = self.buffer.drain();
        if !batch.is_empty() {
            self.deliver(&batch).await;
        }
    }

    async fn deliver(&mut self, batch: &[EventRecord]) {
        let delivery = self.notifier.notify(batch);
        let outcome = match tokio::time::timeout(self.delivery_timeout, delivery).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                after: self.delivery_timeout,
            }),
        };
        match outcome {
            Ok(()) => {
                self.stats.batches_delivered += 1;
                info!(batch_len = batch.len(), "delivered notification batch");
            }
            Err(err) => {
                self.stats.batches_failed += 1;
                error!(
                    batch_len = batch.len(),
                    error = %err,
                    retryable = err.retry_policy().is_retryable(),
                    "could not deliver notification batch"
                );
            }
        }
    }

    fn transition(&mut self, next: ListenerState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal listener transition {} -> {}",
            self.state,
            next
        );
        trace!(from = %self.state, to = %next, "listener state");
        self.state = next;
    }
}

fn has_process_state_prefix(name: &str) -> bool {
    name.get(..PROCESS_STATE_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(PROCESS_STATE_PREFIX))
}
