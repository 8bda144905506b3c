//! Core domain types for the faultline error reporting agent.
//!
//! Provides the canonical error event model, configuration resolution,
//! fault normalization, and time abstractions. All other crates depend on
//! these foundational types; this crate performs no network I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod time;

pub use config::{Config, ConfigOptions, UncaughtMode};
pub use error::{ConfigError, Result};
pub use models::{ErrorEvent, EventId, HttpContext, ReportMetadata, ServiceContext, StackFrame};
pub use normalize::{FaultPayload, Normalizer, UNKNOWN_ERROR_MESSAGE};
pub use time::{Clock, RealClock, TestClock};
