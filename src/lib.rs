//! faultline - asynchronous error reporting agent.
//!
//! Captures application faults, normalizes them into a canonical event
//! shape, and delivers them to a remote aggregation service from a
//! background task. Capture never blocks and never fails: the reporting
//! path is strictly best-effort and can only lose events, never disturb
//! the host application.
//!
//! # Quick start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use faultline::{ConfigOptions, Reporter};
//!
//! # async fn example() -> Result<(), faultline::InitError> {
//! let reporter = Reporter::init(ConfigOptions {
//!     project_id: Some("my-project".to_string()),
//!     key: Some("api-key".to_string()),
//!     service: Some("checkout".to_string()),
//!     ..ConfigOptions::default()
//! })?;
//!
//! reporter.report("payment provider unreachable");
//!
//! // Before process exit, give pending events a chance to leave.
//! reporter.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Configuration falls back to `FAULTLINE_*` environment variables for
//! anything not set explicitly; see [`Config`] for the full list.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod uncaught;

use std::sync::Arc;
use std::time::Duration;

use faultline_dispatch::{DispatchConfig, Dispatcher, EnvIdentityProvider, IdentityClient};
use thiserror::Error;
use tracing::debug;

pub use faultline_core::{
    Config, ConfigError, ConfigOptions, ErrorEvent, EventId, FaultPayload, HttpContext,
    Normalizer, RealClock, ReportMetadata, ServiceContext, StackFrame, UncaughtMode,
};
pub use faultline_dispatch::{DispatchError, DispatchStats};

/// Failure to bring the reporting agent up.
///
/// After successful initialization nothing in this crate returns errors
/// to capture paths; only flush and shutdown report outcomes.
#[derive(Debug, Error)]
pub enum InitError {
    /// Configuration could not be resolved or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The dispatch pipeline could not be constructed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Handle to the reporting agent.
///
/// Cheap to clone; all clones share one queue and one background
/// delivery task. Capture methods are synchronous, O(1), and perform no
/// I/O. Dropping the last handle cancels the delivery task without a
/// final flush; call [`Reporter::shutdown`] for an orderly drain.
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<ReporterInner>,
}

struct ReporterInner {
    config: Config,
    normalizer: Normalizer,
    dispatcher: Dispatcher,
}

impl Reporter {
    /// Resolves configuration and starts the delivery pipeline.
    ///
    /// Must be called within a tokio runtime. Also installs the
    /// process-wide uncaught-fault hook; the hook chains whatever hook
    /// was installed before it and is installed at most once per
    /// process.
    ///
    /// Identity is not touched here: credentials are resolved lazily on
    /// the first delivery, so an unconfigured environment initializes
    /// fine and only disables reporting once delivery is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] for invalid configuration or an
    /// unconstructible HTTP client.
    pub fn init(options: ConfigOptions) -> Result<Self, InitError> {
        let config = Config::resolve(options)?;
        let clock: Arc<dyn faultline_core::Clock> = Arc::new(RealClock::new());

        let identity =
            Arc::new(IdentityClient::new(Box::new(EnvIdentityProvider::new(&config))));
        let dispatcher =
            Dispatcher::start(DispatchConfig::from_config(&config), identity, Arc::clone(&clock))?;

        let normalizer = Normalizer::new(config.service_context(), clock);

        let reporter =
            Self { inner: Arc::new(ReporterInner { config, normalizer, dispatcher }) };
        uncaught::install(&reporter);
        Ok(reporter)
    }

    /// Reports a plain message as a fault.
    ///
    /// Returns the event id when the event was queued, or `None` when
    /// reporting is disabled.
    pub fn report(&self, message: impl Into<FaultPayload>) -> Option<EventId> {
        self.capture(message.into(), None)
    }

    /// Reports a message with structured metadata attached.
    pub fn report_with(
        &self,
        message: impl Into<FaultPayload>,
        metadata: ReportMetadata,
    ) -> Option<EventId> {
        let mut payload = message.into();
        payload.user = metadata.user.or(payload.user);
        self.capture(payload, metadata.http)
    }

    /// Reports an error value, capturing the current backtrace.
    pub fn report_error(&self, error: &(dyn std::error::Error + '_)) -> Option<EventId> {
        self.capture(FaultPayload::from_error(error), None)
    }

    /// Normalizes and queues raw fault material.
    ///
    /// The lowest-level capture entrypoint; the other report methods are
    /// conveniences over it. Never blocks and never fails: when the
    /// reporting gate is closed the event is discarded and `None` is
    /// returned.
    pub fn capture(
        &self,
        payload: FaultPayload,
        request: Option<HttpContext>,
    ) -> Option<EventId> {
        let event = self.inner.normalizer.normalize(payload, request);
        let id = event.id;
        if self.inner.dispatcher.enqueue(event) {
            debug!(event_id = %id, "fault captured");
            Some(id)
        } else {
            None
        }
    }

    /// Attempts to deliver everything pending within the timeout.
    ///
    /// # Errors
    ///
    /// Returns a timeout error when the queue could not be drained in
    /// time; pending events stay queued.
    pub async fn flush(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.inner.dispatcher.flush(timeout).await
    }

    /// Stops the delivery task after a final drain of the queue.
    ///
    /// Further captures are discarded. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` when draining exceeded the budget.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.inner.dispatcher.disable_reporting();
        self.inner.dispatcher.shutdown(timeout).await
    }

    /// Whether capture calls currently reach the queue.
    pub fn is_reporting_enabled(&self) -> bool {
        self.inner.dispatcher.is_reporting_enabled()
    }

    /// Activity counters for diagnostics.
    pub fn stats(&self) -> &DispatchStats {
        self.inner.dispatcher.stats()
    }

    /// Resolved configuration this reporter runs with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn flush_blocking(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.inner.dispatcher.flush_blocking(timeout)
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("service", &self.inner.config.service)
            .field("reporting_enabled", &self.is_reporting_enabled())
            .finish()
    }
}
