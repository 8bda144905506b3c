//! Asynchronous dispatch pipeline for error events.
//!
//! This crate owns everything between a capture call and the remote
//! aggregation service: the bounded pending-event queue, the identity
//! client, the HTTP report client, retry/backoff policy, and the single
//! background delivery task.
//!
//! # Architecture
//!
//! Capture entrypoints are producers into a bounded queue; the dispatcher
//! task is the sole consumer. The queue evicts its oldest entry when full
//! so producers never block. Delivery is single-flight: the loop never
//! starts a second outbound call while one is outstanding.
//!
//! 1. **Enqueue** - capture paths push events, O(1), no I/O
//! 2. **Identity** - lazy one-time credential resolution gates delivery
//! 3. **Batch** - the loop drains up to `batch_size` events per call
//! 4. **Retry** - retryable failures re-enter after exponential backoff
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use faultline_core::{Config, ConfigOptions, RealClock};
//! use faultline_dispatch::{DispatchConfig, Dispatcher, EnvIdentityProvider, IdentityClient};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::resolve(ConfigOptions::default())?;
//! let clock = Arc::new(RealClock::new());
//! let identity = Arc::new(IdentityClient::new(Box::new(EnvIdentityProvider::new(&config))));
//! let dispatcher = Dispatcher::start(DispatchConfig::from_config(&config), identity, clock)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod queue;
pub mod retry;

pub use client::{ClientConfig, ReportClient};
pub use dispatcher::{DispatchConfig, DispatchStats, Dispatcher};
pub use error::{DispatchError, Result};
pub use identity::{Credential, EnvIdentityProvider, Identity, IdentityClient, IdentityProvider};
pub use queue::{EventQueue, PendingEvent};
pub use retry::{BackoffStrategy, RetryContext, RetryDecision, RetryPolicy};

/// Default per-delivery HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
