//! Scheduling and delivery of buffered log lines.
//!
//! [`BufferFlushingTask`] is the only component that decides when network
//! I/O happens. It wakes up every `flushing_accuracy`, checks the size and
//! time triggers, drains the [`EvictingBuffer`] into batches and hands each
//! batch body to a [`MessageSender`], retrying failed attempts after
//! `retry_interval`.
//!
//! Batching policy: a trigger keeps draining until the buffer falls below
//! one batch. Each drain takes `messages_per_request` items, except that
//! when fewer than twice that many are pending it takes all of them. A
//! short tail therefore rides along with the last full batch instead of
//! waiting for the next time trigger, and no batch exceeds
//! `2 * messages_per_request - 1` items. Forced flushes and the final
//! flush on shutdown keep going until the buffer is empty.

use crate::buffer::EvictingBuffer;
use crate::config::{
    DEFAULT_FLUSHING_ACCURACY, DEFAULT_MAX_FLUSH_INTERVAL, DEFAULT_MESSAGES_PER_REQUEST,
    DEFAULT_RETRY_INTERVAL,
};
use crate::cost::CostAssigner;
use crate::error::ConfigError;
use crate::sink::{MessageSender, SourceMetadata};
use crate::stats::ShipperStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// When and how the flushing task drains the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Batch size; reaching it fires the size trigger.
    pub messages_per_request: usize,
    /// Time since the last successful flush that fires the time trigger.
    pub max_flush_interval: Duration,
    /// Period of the scheduler's trigger checks.
    pub flushing_accuracy: Duration,
    /// Wait between attempts of the same batch.
    pub retry_interval: Duration,
    /// Retries per batch before it is dropped; `None` retries until the
    /// batch is delivered or the task shuts down.
    pub max_retries: Option<u32>,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            messages_per_request: DEFAULT_MESSAGES_PER_REQUEST,
            max_flush_interval: DEFAULT_MAX_FLUSH_INTERVAL,
            flushing_accuracy: DEFAULT_FLUSHING_ACCURACY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: None,
        }
    }
}

impl FlushPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.messages_per_request == 0 {
            return Err(ConfigError::NotPositive("messages_per_request"));
        }
        if self.max_flush_interval.is_zero() {
            return Err(ConfigError::NotPositive("max_flush_interval"));
        }
        if self.flushing_accuracy.is_zero() {
            return Err(ConfigError::NotPositive("flushing_accuracy"));
        }
        if self.retry_interval.is_zero() {
            return Err(ConfigError::NotPositive("retry_interval"));
        }
        Ok(())
    }
}

/// What started a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// At least one full batch was pending.
    Size,
    /// `max_flush_interval` elapsed since the last successful flush.
    Time,
    /// Explicit request through [`FlushHandle::flush`] or
    /// [`BufferFlushingTask::force_flush`].
    Forced,
    /// Final drain after cancellation.
    Shutdown,
}

/// Result of one scheduler cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// `None` when no trigger fired and nothing was drained.
    pub trigger: Option<FlushTrigger>,
    pub batches_sent: usize,
    pub messages_sent: usize,
    pub messages_dropped: usize,
}

impl FlushOutcome {
    fn triggered(trigger: FlushTrigger) -> Self {
        Self {
            trigger: Some(trigger),
            ..Self::default()
        }
    }
}

enum Delivery {
    Sent,
    /// Discarded without an attempt; the sender is not ready.
    Dropped,
    /// Attempts failed and the retry cap was reached.
    GaveUp,
    /// Shutdown interrupted the backoff; the batch is parked for the final flush.
    Interrupted,
}

struct PendingBatch {
    body: String,
    messages: usize,
}

/// Cloneable handle used to request flushes and shutdown of a running
/// [`BufferFlushingTask`].
#[derive(Clone)]
pub struct FlushHandle {
    shutdown: CancellationToken,
    flush_requests: Arc<Notify>,
}

impl FlushHandle {
    /// Ask the task to flush on its next wake-up, bypassing both triggers.
    pub fn flush(&self) {
        self.flush_requests.notify_one();
    }

    /// Cancel the task. It interrupts any retry backoff, performs a final
    /// flush and exits.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Drains an [`EvictingBuffer`] and delivers its contents through a
/// [`MessageSender`].
///
/// Use [`run`](Self::run) to drive it on a timer, or call
/// [`run_once`](Self::run_once) / [`force_flush`](Self::force_flush)
/// directly to step it manually.
pub struct BufferFlushingTask<T, C, S> {
    buffer: Arc<EvictingBuffer<T, C>>,
    sender: S,
    policy: FlushPolicy,
    metadata: SourceMetadata,
    stats: Arc<ShipperStats>,
    shutdown: CancellationToken,
    flush_requests: Arc<Notify>,
    last_flush: Instant,
    parked: Option<PendingBatch>,
}

impl<T, C, S> BufferFlushingTask<T, C, S>
where
    T: AsRef<str>,
    C: CostAssigner<T>,
    S: MessageSender,
{
    /// Create a task over `buffer` delivering through `sender`.
    ///
    /// **Returns**
    /// - `Err(ConfigError::NotPositive)` if any policy value is zero.
    pub fn new(
        buffer: Arc<EvictingBuffer<T, C>>,
        sender: S,
        policy: FlushPolicy,
        metadata: SourceMetadata,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            buffer,
            sender,
            policy,
            metadata,
            stats: Arc::new(ShipperStats::default()),
            shutdown: CancellationToken::new(),
            flush_requests: Arc::new(Notify::new()),
            last_flush: Instant::now(),
            parked: None,
        })
    }

    /// Share `stats` with the task instead of its private counters.
    pub fn with_stats(mut self, stats: Arc<ShipperStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn handle(&self) -> FlushHandle {
        FlushHandle {
            shutdown: self.shutdown.clone(),
            flush_requests: Arc::clone(&self.flush_requests),
        }
    }

    pub fn stats(&self) -> &Arc<ShipperStats> {
        &self.stats
    }

    pub fn policy(&self) -> &FlushPolicy {
        &self.policy
    }

    /// Which trigger, if any, fires right now.
    pub fn pending_trigger(&self) -> Option<FlushTrigger> {
        if self.buffer.len() >= self.policy.messages_per_request {
            Some(FlushTrigger::Size)
        } else if self.last_flush.elapsed() >= self.policy.max_flush_interval {
            Some(FlushTrigger::Time)
        } else {
            None
        }
    }

    /// One scheduler cycle: check the triggers and flush if one fires.
    pub async fn run_once(&mut self) -> FlushOutcome {
        match self.pending_trigger() {
            Some(trigger) => self.flush_and_send(trigger).await,
            None => FlushOutcome::default(),
        }
    }

    /// Drain and send everything pending, regardless of triggers.
    pub async fn force_flush(&mut self) -> FlushOutcome {
        self.flush_and_send(FlushTrigger::Forced).await
    }

    /// Drive the task until shutdown, then perform a final flush.
    pub async fn run(mut self) {
        let mut ticker = interval(self.policy.flushing_accuracy);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            let forced = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.flush_requests.notified() => true,
                _ = ticker.tick() => false,
            };
            if forced {
                self.force_flush().await;
            } else {
                self.run_once().await;
            }
        }

        let outcome = self.final_flush().await;
        debug!(
            batches = outcome.batches_sent,
            messages = outcome.messages_sent,
            dropped = outcome.messages_dropped,
            "flushing task stopped"
        );
    }

    /// Best-effort delivery of everything left, one attempt per batch.
    ///
    /// A batch interrupted in backoff goes first. The first failed attempt
    /// ends the flush and whatever is still queued is counted as dropped.
    pub async fn final_flush(&mut self) -> FlushOutcome {
        let mut outcome = FlushOutcome::triggered(FlushTrigger::Shutdown);

        if let Some(parked) = self.parked.take() {
            if !self.deliver_once(parked, &mut outcome).await {
                self.drop_remaining(&mut outcome);
                return outcome;
            }
        }

        while let Some(batch) = self.next_batch() {
            if !self.deliver_once(batch, &mut outcome).await {
                self.drop_remaining(&mut outcome);
                break;
            }
        }
        outcome
    }

    async fn flush_and_send(&mut self, trigger: FlushTrigger) -> FlushOutcome {
        let mut outcome = FlushOutcome::triggered(trigger);
        let drain_all = matches!(trigger, FlushTrigger::Forced | FlushTrigger::Shutdown);
        let mut first = true;

        loop {
            // after the first batch only full batches continue an
            // automatic flush; forced flushes empty the buffer
            if !first && !drain_all && self.buffer.len() < self.policy.messages_per_request {
                break;
            }
            first = false;

            let Some(batch) = self.next_batch() else {
                break;
            };
            let messages = batch.messages;

            match self.deliver(batch).await {
                Delivery::Sent => {
                    outcome.batches_sent += 1;
                    outcome.messages_sent += messages;
                    self.last_flush = Instant::now();
                }
                Delivery::Dropped => {
                    outcome.messages_dropped += messages;
                    self.last_flush = Instant::now();
                }
                Delivery::GaveUp => {
                    outcome.messages_dropped += messages;
                    break;
                }
                Delivery::Interrupted => break,
            }
        }
        outcome
    }

    /// Drain the next batch and assemble its body.
    fn next_batch(&self) -> Option<PendingBatch> {
        let per_request = self.policy.messages_per_request;
        let pending = self.buffer.len();
        let take = if pending < per_request.saturating_mul(2) {
            pending.max(1)
        } else {
            per_request
        };

        let items = self.buffer.drain_up_to(take);
        if items.is_empty() {
            return None;
        }
        Some(PendingBatch {
            body: assemble_body(&items),
            messages: items.len(),
        })
    }

    async fn deliver(&mut self, batch: PendingBatch) -> Delivery {
        if !self.sender.can_try_send() {
            warn!(
                messages = batch.messages,
                "sender is not ready, dropping batch"
            );
            ShipperStats::add(&self.stats.dropped_not_ready, batch.messages);
            return Delivery::Dropped;
        }

        let mut retries: u32 = 0;
        loop {
            self.stats.begin_attempt(batch.messages);
            let result = self.sender.try_send(&batch.body, &self.metadata).await;
            self.stats.end_attempt();
            match result {
                Ok(()) => {
                    debug!(
                        messages = batch.messages,
                        bytes = batch.body.len(),
                        retries,
                        "batch delivered"
                    );
                    self.record_sent(batch.messages);
                    return Delivery::Sent;
                }
                Err(e) => {
                    ShipperStats::add(&self.stats.failed_attempts, 1);

                    if self.policy.max_retries.is_some_and(|max| retries >= max) {
                        error!(
                            error = %e,
                            messages = batch.messages,
                            retries,
                            "giving up on batch after retries"
                        );
                        ShipperStats::add(&self.stats.dropped_undelivered, batch.messages);
                        return Delivery::GaveUp;
                    }

                    retries += 1;
                    warn!(
                        error = %e,
                        messages = batch.messages,
                        attempt = retries,
                        retry_in_ms = self.policy.retry_interval.as_millis() as u64,
                        "failed to send batch, will retry"
                    );

                    let cancelled = tokio::select! {
                        _ = self.shutdown.cancelled() => true,
                        _ = sleep(self.policy.retry_interval) => false,
                    };
                    if cancelled {
                        // only one batch gets the final-flush attempt
                        if self.parked.is_some() {
                            warn!(
                                messages = batch.messages,
                                "shutting down with a batch already parked, dropping batch"
                            );
                            ShipperStats::add(&self.stats.dropped_undelivered, batch.messages);
                            return Delivery::GaveUp;
                        }
                        self.parked = Some(batch);
                        return Delivery::Interrupted;
                    }
                }
            }
        }
    }

    async fn deliver_once(&mut self, batch: PendingBatch, outcome: &mut FlushOutcome) -> bool {
        if !self.sender.can_try_send() {
            warn!(
                messages = batch.messages,
                "sender is not ready, dropping batch"
            );
            ShipperStats::add(&self.stats.dropped_not_ready, batch.messages);
            outcome.messages_dropped += batch.messages;
            return true;
        }

        self.stats.begin_attempt(batch.messages);
        let result = self.sender.try_send(&batch.body, &self.metadata).await;
        self.stats.end_attempt();
        match result {
            Ok(()) => {
                self.record_sent(batch.messages);
                outcome.batches_sent += 1;
                outcome.messages_sent += batch.messages;
                true
            }
            Err(e) => {
                ShipperStats::add(&self.stats.failed_attempts, 1);
                ShipperStats::add(&self.stats.dropped_undelivered, batch.messages);
                outcome.messages_dropped += batch.messages;
                error!(
                    error = %e,
                    messages = batch.messages,
                    "final flush failed, dropping batch"
                );
                false
            }
        }
    }

    fn drop_remaining(&self, outcome: &mut FlushOutcome) {
        let left = self.buffer.drain_up_to(usize::MAX).len();
        if left > 0 {
            warn!(messages = left, "dropping undelivered messages on shutdown");
            ShipperStats::add(&self.stats.dropped_undelivered, left);
            outcome.messages_dropped += left;
        }
    }

    fn record_sent(&self, messages: usize) {
        ShipperStats::add(&self.stats.batches_sent, 1);
        ShipperStats::add(&self.stats.messages_sent, messages);
    }
}

/// Concatenate lines into one request body, newline-terminating each.
pub fn assemble_body<T: AsRef<str>>(items: &[T]) -> String {
    let len = items.iter().map(|item| item.as_ref().len() + 1).sum();
    let mut body = String::with_capacity(len);
    for item in items {
        let line = item.as_ref();
        body.push_str(line);
        if !line.ends_with('\n') {
            body.push('\n');
        }
    }
    body
}
