//! Background dispatcher task and its control surface.
//!
//! The dispatcher owns the delivery side of the pipeline: a single
//! background task drains the pending queue in batches, resolves identity
//! lazily on first delivery, applies the retry policy to failures, and
//! honors flush and shutdown requests. Delivery is single-flight; the
//! task never overlaps outbound calls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use faultline_core::{Clock, Config, ErrorEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{ClientConfig, ReportClient};
use crate::error::{DispatchError, Result};
use crate::identity::IdentityClient;
use crate::queue::{EventQueue, PendingEvent};
use crate::retry::{RetryContext, RetryDecision, RetryPolicy};

/// Runtime configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Whether delivery is active at all.
    pub reporting_enabled: bool,
    /// Pending queue capacity.
    pub queue_capacity: usize,
    /// Maximum events per outbound batch.
    pub batch_size: usize,
    /// Retry policy applied to failed batches.
    pub retry_policy: RetryPolicy,
    /// Idle poll interval of the delivery loop.
    pub poll_interval: Duration,
    /// Budget for the flush-on-shutdown path.
    pub shutdown_timeout: Duration,
    /// HTTP client configuration.
    pub client: ClientConfig,
}

impl DispatchConfig {
    /// Derives dispatcher configuration from the resolved agent config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            reporting_enabled: config.reporting_enabled,
            queue_capacity: config.queue_capacity,
            batch_size: config.batch_size,
            retry_policy: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: config.retry_base_delay(),
                max_delay: config.retry_max_delay(),
                jitter_factor: config.retry_jitter_factor,
                ..RetryPolicy::default()
            },
            poll_interval: config.poll_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            client: ClientConfig {
                endpoint: config.endpoint.clone(),
                timeout: config.request_timeout(),
                ..ClientConfig::default()
            },
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Counters describing dispatcher activity since startup.
///
/// Relaxed atomics; values are advisory and read by diagnostics only.
#[derive(Debug, Default)]
pub struct DispatchStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicU64,
}

impl DispatchStats {
    /// Events accepted into the queue.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Events confirmed delivered.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Delivery retries scheduled.
    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    /// Events abandoned: evicted, exhausted, or discarded on disable.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events currently in an outbound delivery call.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

enum FlushAck {
    Async(oneshot::Sender<()>),
    Blocking(std::sync::mpsc::SyncSender<()>),
}

impl FlushAck {
    fn complete(self) {
        match self {
            Self::Async(tx) => {
                let _ = tx.send(());
            },
            Self::Blocking(tx) => {
                let _ = tx.try_send(());
            },
        }
    }
}

enum Command {
    Flush(FlushAck),
}

/// Handle to the background delivery task.
///
/// Enqueue is synchronous and non-blocking; everything else rides the
/// command channel to the worker. Dropping the dispatcher cancels the
/// worker without a final flush; call [`Dispatcher::shutdown`] for an
/// orderly drain.
pub struct Dispatcher {
    queue: Arc<EventQueue>,
    stats: Arc<DispatchStats>,
    reporting: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Builds the pipeline and spawns the delivery task.
    ///
    /// Must be called within a tokio runtime. When reporting is disabled
    /// in configuration the worker still runs, but the enqueue gate stays
    /// closed and no network I/O ever happens.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the HTTP client cannot be
    /// constructed.
    pub fn start(
        config: DispatchConfig,
        identity: Arc<IdentityClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = ReportClient::new(config.client.clone())?;
        let queue = Arc::new(EventQueue::new(config.queue_capacity));
        let stats = Arc::new(DispatchStats::default());
        let reporting = Arc::new(AtomicBool::new(config.reporting_enabled));
        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = DispatchWorker {
            queue: Arc::clone(&queue),
            stats: Arc::clone(&stats),
            reporting: Arc::clone(&reporting),
            identity,
            client,
            clock,
            policy: config.retry_policy,
            batch_size: config.batch_size,
            poll_interval: config.poll_interval,
            cancel: cancel.clone(),
            commands: command_rx,
        };

        let handle = tokio::spawn(worker.run());
        info!(
            queue_capacity = config.queue_capacity,
            batch_size = config.batch_size,
            reporting_enabled = config.reporting_enabled,
            "dispatcher started"
        );

        Ok(Self {
            queue,
            stats,
            reporting,
            commands: command_tx,
            cancel,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Accepts an event for delivery.
    ///
    /// Returns false when the reporting gate is closed and the event was
    /// discarded without being queued. Never blocks.
    pub fn enqueue(&self, event: ErrorEvent) -> bool {
        if !self.reporting.load(Ordering::SeqCst) {
            debug!(event_id = %event.id, "reporting disabled, event discarded");
            return false;
        }

        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        if self.queue.push(event).is_some() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Attempts to deliver everything pending within the timeout.
    ///
    /// Makes one delivery pass over the queue; events whose delivery
    /// fails stay queued for the normal retry path.
    ///
    /// # Errors
    ///
    /// Returns a timeout error when the pass did not complete in time,
    /// or a configuration error when the worker is gone.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(FlushAck::Async(tx)))
            .map_err(|_| DispatchError::configuration("dispatcher worker stopped"))?;
        self.queue.wake();

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DispatchError::configuration("dispatcher worker stopped")),
            Err(_) => Err(DispatchError::timeout(timeout.as_secs())),
        }
    }

    /// Flush variant usable from synchronous contexts such as a panic
    /// hook. Blocks the calling thread, never the runtime.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Dispatcher::flush`].
    pub fn flush_blocking(&self, timeout: Duration) -> Result<()> {
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.commands
            .send(Command::Flush(FlushAck::Blocking(tx)))
            .map_err(|_| DispatchError::configuration("dispatcher worker stopped"))?;
        self.queue.wake();

        rx.recv_timeout(timeout).map_err(|_| DispatchError::timeout(timeout.as_secs()))
    }

    /// Stops the worker after a final delivery pass over the queue.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` when the worker did not finish draining
    /// within the budget; the task is aborted in that case.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.reporting.store(false, Ordering::SeqCst);
        self.cancel.cancel();
        self.queue.wake();

        let handle = {
            let mut worker = self.lock_worker();
            worker.take()
        };
        let Some(handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => {
                info!("dispatcher stopped");
                Ok(())
            },
            Ok(Err(join_error)) => {
                error!(%join_error, "dispatcher worker panicked");
                Ok(())
            },
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "dispatcher shutdown timed out");
                Err(DispatchError::ShutdownTimeout { timeout_seconds: timeout.as_secs() })
            },
        }
    }

    /// Closes the enqueue gate permanently.
    pub fn disable_reporting(&self) {
        self.reporting.store(false, Ordering::SeqCst);
    }

    /// Whether the enqueue gate is open.
    pub fn is_reporting_enabled(&self) -> bool {
        self.reporting.load(Ordering::SeqCst)
    }

    /// Number of events currently awaiting delivery.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Total events evicted from the queue since startup.
    pub fn evicted_total(&self) -> u64 {
        self.queue.evicted_total()
    }

    /// Activity counters for diagnostics.
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct DispatchWorker {
    queue: Arc<EventQueue>,
    stats: Arc<DispatchStats>,
    reporting: Arc<AtomicBool>,
    identity: Arc<IdentityClient>,
    client: ReportClient,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    batch_size: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<Command>,
}

enum BatchOutcome {
    Progress,
    Stalled,
}

impl DispatchWorker {
    async fn run(mut self) {
        debug!("delivery loop started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Flush(ack)) => {
                            self.flush_pass().await;
                            ack.complete();
                        },
                        // Channel closed: the dispatcher handle is gone.
                        None => break,
                    }
                },
                _ = self.queue.notified() => {},
                _ = self.clock.sleep(self.poll_interval) => {},
            }

            if !self.queue.is_empty() {
                self.deliver_next_batch(true).await;
            }
        }

        // Final drain: one pass, no backoff sleeps, best effort.
        self.flush_pass().await;
        debug!("delivery loop stopped");
    }

    /// Delivers every queued batch once without backoff waits.
    ///
    /// Stops early when a batch makes no progress so a dead endpoint
    /// cannot spin the flush forever.
    async fn flush_pass(&mut self) {
        while !self.queue.is_empty() {
            match self.deliver_next_batch(false).await {
                BatchOutcome::Progress => {},
                BatchOutcome::Stalled => break,
            }
        }
    }

    /// Drains and delivers one batch.
    ///
    /// With `backoff` set, a retryable failure waits out the computed
    /// delay before requeueing; without it the batch requeues immediately
    /// and the outcome reports a stall.
    async fn deliver_next_batch(&mut self, backoff: bool) -> BatchOutcome {
        let mut batch = self.queue.drain(self.batch_size);
        if batch.is_empty() {
            return BatchOutcome::Progress;
        }

        let identity = match self.identity.get().await {
            Ok(identity) => identity.clone(),
            Err(error) => {
                self.disable_and_discard(batch, &error);
                return BatchOutcome::Stalled;
            },
        };

        let events: Vec<ErrorEvent> = batch.iter().map(|p| p.event.clone()).collect();
        self.stats.in_flight.store(batch.len() as u64, Ordering::Relaxed);
        let outcome = self.client.report_batch(&identity, &events).await;
        self.stats.in_flight.store(0, Ordering::Relaxed);

        match outcome {
            Ok(()) => {
                self.stats.delivered.fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(batch_len = batch.len(), "batch delivered");
                BatchOutcome::Progress
            },
            Err(delivery_error) => {
                for item in &mut batch {
                    item.attempts += 1;
                }
                self.handle_failure(batch, delivery_error, backoff).await
            },
        }
    }

    /// Applies the retry policy to a failed batch, per event.
    ///
    /// A non-retryable error drops the whole batch. For retryable errors
    /// each event is judged by its own attempt count: events at the
    /// attempt limit are dropped, the rest are requeued after backoff. A
    /// batch can mix attempt counts because `requeue_front` puts retried
    /// events ahead of fresh captures.
    async fn handle_failure(
        &mut self,
        batch: Vec<PendingEvent>,
        delivery_error: DispatchError,
        backoff: bool,
    ) -> BatchOutcome {
        if !delivery_error.is_retryable() {
            self.stats.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
            error!(
                error = %delivery_error,
                batch_len = batch.len(),
                "non-retryable delivery failure, events dropped"
            );
            return BatchOutcome::Progress;
        }

        let (exhausted, retrying): (Vec<PendingEvent>, Vec<PendingEvent>) = batch
            .into_iter()
            .partition(|item| item.attempts >= self.policy.max_attempts);

        if !exhausted.is_empty() {
            self.stats.dropped.fetch_add(exhausted.len() as u64, Ordering::Relaxed);
            error!(
                max_attempts = self.policy.max_attempts,
                batch_len = exhausted.len(),
                error = %delivery_error,
                "retries exhausted, events dropped"
            );
        }

        if retrying.is_empty() {
            return BatchOutcome::Progress;
        }

        // One shared backoff for the surviving events; the loop is
        // single-flight so they wait together anyway. The most-attempted
        // survivor sets the delay.
        let attempt = retrying.iter().map(|item| item.attempts).max().unwrap_or(1);
        let context = RetryContext::new(attempt, delivery_error, self.policy.clone());
        let delay = match context.decide_retry() {
            RetryDecision::Retry { delay } => delay,
            // Unreachable given the partition above, but dropping is the
            // safe answer if the policy ever disagrees.
            RetryDecision::GiveUp { reason } => {
                self.stats.dropped.fetch_add(retrying.len() as u64, Ordering::Relaxed);
                error!(reason, batch_len = retrying.len(), "delivery abandoned, events dropped");
                return BatchOutcome::Progress;
            },
        };

        self.stats.retried.fetch_add(retrying.len() as u64, Ordering::Relaxed);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %context.error,
            batch_len = retrying.len(),
            "delivery failed, will retry"
        );

        if backoff {
            tokio::select! {
                _ = self.cancel.cancelled() => {},
                _ = self.clock.sleep(delay) => {},
            }
        }
        self.queue.requeue_front(retrying);
        BatchOutcome::Stalled
    }

    /// Identity is unrecoverable: close the gate and empty the queue.
    fn disable_and_discard(&mut self, batch: Vec<PendingEvent>, error: &DispatchError) {
        self.reporting.store(false, Ordering::SeqCst);

        let mut discarded = batch.len();
        loop {
            let drained = self.queue.drain(usize::MAX);
            if drained.is_empty() {
                break;
            }
            discarded += drained.len();
        }

        self.stats.dropped.fetch_add(discarded as u64, Ordering::Relaxed);
        error!(%error, discarded, "identity unresolved, reporting disabled");
    }
}
