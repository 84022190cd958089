use crate::buffer::EvictingBuffer;
use crate::config::ShipperConfig;
use crate::cost::{CostAssigner, StringLengthCost};
use crate::error::{ConfigError, InitError};
use crate::flush::{BufferFlushingTask, FlushHandle};
use crate::http::HttpSender;
use crate::sink::MessageSender;
use crate::stats::{ShipperStats, StatsSnapshot};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum TaskState {
    Idle(TaskFuture),
    Running(JoinHandle<()>),
    Stopped,
}

/// The engine behind a logging adapter: a cost-bounded buffer of
/// formatted lines plus the background task that ships them.
///
/// Adapters only need three calls: [`accept`](Self::accept) from the
/// producing thread, [`start`](Self::start) once a tokio runtime is
/// available, and [`stop`](Self::stop) on teardown.
pub struct LogShipper<C = StringLengthCost> {
    buffer: Arc<EvictingBuffer<String, C>>,
    stats: Arc<ShipperStats>,
    handle: FlushHandle,
    task: Mutex<TaskState>,
    /// Set once `stop` has settled the buffer; guards `accept` against it.
    closed: RwLock<bool>,
    shutdown_timeout: Duration,
}

impl LogShipper<StringLengthCost> {
    /// Build a shipper delivering over HTTP as described by `config`.
    pub fn from_config(config: &ShipperConfig) -> Result<Self, ConfigError> {
        let sender = HttpSender::from_config(config)?;
        Self::new(config, sender)
    }

    /// Build a shipper with byte-length cost accounting and a custom sender.
    pub fn new<S>(config: &ShipperConfig, sender: S) -> Result<Self, ConfigError>
    where
        S: MessageSender + 'static,
    {
        Self::with_cost(config, sender, StringLengthCost)
    }
}

impl<C> LogShipper<C>
where
    C: CostAssigner<String> + 'static,
{
    /// Build a shipper whose buffer weighs lines with `cost`.
    ///
    /// The flushing task is created here but does not run until
    /// [`start`](Self::start) or [`stop`](Self::stop) is called.
    pub fn with_cost<S>(config: &ShipperConfig, sender: S, cost: C) -> Result<Self, ConfigError>
    where
        S: MessageSender + 'static,
    {
        config.validate()?;

        let buffer = Arc::new(EvictingBuffer::new(config.max_queue_size_bytes, cost)?);
        let stats = Arc::new(ShipperStats::default());
        let task = BufferFlushingTask::new(
            Arc::clone(&buffer),
            sender,
            config.flush_policy(),
            config.source.clone(),
        )?
        .with_stats(Arc::clone(&stats));
        let handle = task.handle();

        Ok(Self {
            buffer,
            stats,
            handle,
            task: Mutex::new(TaskState::Idle(Box::pin(task.run()))),
            closed: RwLock::new(false),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    fn state(&self) -> MutexGuard<'_, TaskState> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one formatted line. Never blocks on I/O.
    ///
    /// Returns the number of older lines evicted to make room. Lines
    /// accepted after [`stop`](Self::stop) are discarded.
    pub fn accept(&self, line: String) -> usize {
        let closed = self.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed || self.handle.is_shutdown() {
            ShipperStats::add(&self.stats.dropped_undelivered, 1);
            return 0;
        }
        ShipperStats::add(&self.stats.accepted, 1);
        self.buffer.add(line)
    }

    /// Spawn the flushing task on the current tokio runtime.
    ///
    /// Calling it again while running, or after stop, does nothing.
    pub fn start(&self) -> Result<(), InitError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| InitError::NoRuntime)?;

        let mut state = self.state();
        if let TaskState::Idle(_) = &*state {
            if let TaskState::Idle(future) = std::mem::replace(&mut *state, TaskState::Stopped) {
                *state = TaskState::Running(runtime.spawn(future));
                debug!("log shipper started");
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.state(), TaskState::Running(join) if !join.is_finished())
    }

    /// Ask the running task to flush now, bypassing size and time triggers.
    pub fn flush(&self) {
        self.handle.flush();
    }

    /// Stop the flushing task after a final forced flush.
    ///
    /// Any retry backoff in progress is interrupted. The final flush gets
    /// at most the configured shutdown timeout; after that the task is
    /// aborted. Whatever it still held, and anything left in the buffer,
    /// is counted as undelivered. Stopping twice is a no-op.
    pub async fn stop(&self) {
        self.handle.shutdown();

        let state = std::mem::replace(&mut *self.state(), TaskState::Stopped);
        match state {
            TaskState::Running(mut join) => {
                if tokio::time::timeout(self.shutdown_timeout, &mut join).await.is_err() {
                    warn!(
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "final flush did not finish in time, aborting"
                    );
                    join.abort();
                    let _ = join.await;
                }
                self.close();
            }
            TaskState::Idle(future) => {
                // never started: run the final flush inline
                if tokio::time::timeout(self.shutdown_timeout, future).await.is_err() {
                    warn!(
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "final flush did not finish in time"
                    );
                }
                self.close();
            }
            TaskState::Stopped => {}
        }
    }

    /// Refuse further lines and count whatever the stopped task left behind.
    fn close(&self) {
        let mut closed = self.closed.write().unwrap_or_else(PoisonError::into_inner);
        *closed = true;

        let in_flight = self.stats.abandon_in_flight();
        let left = self.buffer.drain_up_to(usize::MAX).len();
        ShipperStats::add(&self.stats.dropped_undelivered, left);
        drop(closed);

        if in_flight > 0 || left > 0 {
            warn!(in_flight, queued = left, "messages left undelivered after stop");
        }
    }

    /// Signal shutdown without waiting. A running task still performs its
    /// final flush on its own.
    pub fn shutdown_in_background(&self) {
        self.handle.shutdown();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.buffer.evicted_count())
    }

    /// Number of lines waiting in the buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use crate::noop_sink::NoopSender;
    use crate::sink::SourceMetadata;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Collecting {
        bodies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageSender for Collecting {
        fn can_try_send(&self) -> bool {
            true
        }

        async fn try_send(&self, body: &str, _metadata: &SourceMetadata) -> Result<(), SendError> {
            self.bodies.lock().unwrap().push(body.to_string());
            Ok(())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl MessageSender for Unreachable {
        fn can_try_send(&self) -> bool {
            true
        }

        async fn try_send(&self, _body: &str, _metadata: &SourceMetadata) -> Result<(), SendError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn config() -> ShipperConfig {
        ShipperConfig::default()
            .with_messages_per_request(3)
            .with_flushing_accuracy(Duration::from_millis(10))
            .with_max_flush_interval(Duration::from_secs(3600))
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let result = LogShipper::new(&config().with_retry_interval(Duration::ZERO), NoopSender);
        assert!(matches!(result, Err(ConfigError::NotPositive("retry_interval"))));
    }

    #[test]
    fn start_without_runtime_is_rejected() {
        let shipper = LogShipper::new(&config(), NoopSender).unwrap();
        assert!(matches!(shipper.start(), Err(InitError::NoRuntime)));
    }

    #[tokio::test(start_paused = true)]
    async fn started_shipper_ships_full_batches() {
        let sender = Arc::new(Collecting::default());
        let shipper = LogShipper::new(&config(), Arc::clone(&sender)).unwrap();
        shipper.start().unwrap();
        assert!(shipper.is_running());

        for line in ["one", "two", "three"] {
            shipper.accept(line.to_string());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*sender.bodies.lock().unwrap(), vec!["one\ntwo\nthree\n".to_string()]);
        assert_eq!(shipper.pending(), 0);
        let stats = shipper.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.batches_sent, 1);
        assert_eq!(stats.messages_sent, 3);

        shipper.stop().await;
        assert!(!shipper.is_running());
    }

    #[tokio::test]
    async fn stop_flushes_pending_lines_even_if_never_started() {
        let sender = Arc::new(Collecting::default());
        let shipper = LogShipper::new(&config(), Arc::clone(&sender)).unwrap();

        shipper.accept("left over".to_string());
        shipper.stop().await;

        assert_eq!(*sender.bodies.lock().unwrap(), vec!["left over\n".to_string()]);

        // lines after stop are discarded and stop is idempotent
        assert_eq!(shipper.accept("too late".to_string()), 0);
        shipper.stop().await;
        assert_eq!(shipper.stats().dropped_undelivered, 1);
        assert_eq!(sender.bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_bounded_by_shutdown_timeout() {
        let shipper = LogShipper::new(
            &config().with_shutdown_timeout(Duration::from_secs(2)),
            Unreachable,
        )
        .unwrap();
        shipper.start().unwrap();
        shipper.accept("stuck".to_string());

        let started = tokio::time::Instant::now();
        shipper.stop().await;
        assert!(started.elapsed() <= Duration::from_secs(3));
        assert!(!shipper.is_running());
    }

    fn unaccounted(shipper: &LogShipper, offered: u64) -> i64 {
        let stats = shipper.stats();
        offered as i64
            - (stats.messages_sent
                + stats.dropped_not_ready
                + stats.dropped_undelivered
                + stats.evicted
                + shipper.pending() as u64) as i64
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_stop_counts_in_flight_and_queued_lines() {
        let shipper = LogShipper::new(
            &config().with_shutdown_timeout(Duration::from_secs(1)),
            Unreachable,
        )
        .unwrap();
        shipper.start().unwrap();

        for line in ["a", "b", "c"] {
            shipper.accept(line.to_string());
        }
        // the task drains a full batch and hangs in the sender
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(shipper.pending(), 0);

        shipper.accept("d".to_string());
        shipper.accept("e".to_string());
        shipper.stop().await;

        let stats = shipper.stats();
        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.dropped_undelivered, 5);
        assert_eq!(shipper.pending(), 0);
        assert_eq!(unaccounted(&shipper, 5), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lines_racing_with_stop_are_sent_or_counted() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        let shipper = Arc::new(LogShipper::new(&config(), NoopSender).unwrap());
        shipper.start().unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let offered = Arc::new(AtomicU64::new(0));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let shipper = Arc::clone(&shipper);
                let running = Arc::clone(&running);
                let offered = Arc::clone(&offered);
                std::thread::spawn(move || {
                    let mut i = 0u64;
                    while running.load(Ordering::SeqCst) {
                        shipper.accept(format!("p{p}-{i}"));
                        offered.fetch_add(1, Ordering::SeqCst);
                        i += 1;
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        shipper.stop().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        running.store(false, Ordering::SeqCst);
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(shipper.pending(), 0);
        assert_eq!(unaccounted(&shipper, offered.load(Ordering::SeqCst)), 0);
    }

    #[tokio::test]
    async fn eviction_is_reported_by_accept_and_stats() {
        let shipper = LogShipper::new(&config().with_max_queue_size_bytes(8), NoopSender).unwrap();
        assert_eq!(shipper.accept("aaaa".to_string()), 0);
        assert_eq!(shipper.accept("bbbb".to_string()), 0);
        assert_eq!(shipper.accept("cccc".to_string()), 1);
        assert_eq!(shipper.stats().evicted, 1);
        assert_eq!(shipper.pending(), 2);
    }
}
