//! Configuration resolution for the reporting agent.
//!
//! Merges explicit caller options, `FAULTLINE_*` environment variables, and
//! built-in defaults into a validated, immutable `Config`. Resolution is a
//! pure merge plus validation; missing optional fields are never errors.

use std::time::Duration;

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    models::ServiceContext,
};

/// Environment variable prefix for all configuration overrides.
const ENV_PREFIX: &str = "FAULTLINE_";

/// Default ingest endpoint base URL.
pub const DEFAULT_ENDPOINT: &str = "https://ingest.faultline.dev/v1beta1";

/// Policy governing what the process does after reporting an uncaught
/// fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UncaughtMode {
    /// Report the fault and leave crash behavior untouched.
    #[default]
    #[serde(rename = "ignore")]
    Ignore,
    /// Report the fault, emit a local diagnostic, and continue with default
    /// crash behavior.
    #[serde(rename = "logAndContinue")]
    LogAndContinue,
    /// Report the fault, attempt a bounded flush, then terminate the
    /// process with a non-zero status.
    #[serde(rename = "logAndExit")]
    LogAndExit,
}

/// Explicit options supplied by the host application at initialization.
///
/// Every field is optional; anything left unset falls back to the
/// environment and then to built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOptions {
    /// Master switch for reporting. When false, no component performs
    /// network I/O and capture calls become local-log no-ops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reporting_enabled: Option<bool>,
    /// Project the events are reported under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Opaque credential reference used as the authorization token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Lightweight API key alternative to a credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Logical service name attached to every event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Version label attached to every event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,
    /// Uncaught-fault handling mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_uncaught: Option<UncaughtMode>,
    /// Ingest endpoint base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Pending-event queue capacity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    /// Maximum events per outbound batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Maximum delivery attempts per event, including the first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl ConfigOptions {
    /// Resolves these options against environment and defaults.
    ///
    /// Convenience for `Config::resolve(options)`.
    pub fn resolve(self) -> Result<Config> {
        Config::resolve(self)
    }
}

/// Immutable, validated configuration, constructed once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Whether reporting is active at all.
    ///
    /// Environment variable: `FAULTLINE_REPORTING_ENABLED`
    #[serde(default = "default_reporting_enabled")]
    pub reporting_enabled: bool,
    /// Project the events are reported under. May be absent; identity
    /// resolution can still discover it from another source.
    ///
    /// Environment variable: `FAULTLINE_PROJECT_ID`
    #[serde(default)]
    pub project_id: Option<String>,
    /// Opaque credential reference used as the authorization token.
    ///
    /// Environment variable: `FAULTLINE_CREDENTIAL`
    #[serde(default)]
    pub credential: Option<String>,
    /// Lightweight API key alternative to a credential.
    ///
    /// Environment variable: `FAULTLINE_KEY`
    #[serde(default)]
    pub key: Option<String>,
    /// Logical service name attached to every event.
    ///
    /// Environment variable: `FAULTLINE_SERVICE`
    #[serde(default = "default_service")]
    pub service: String,
    /// Version label attached to every event.
    ///
    /// Environment variable: `FAULTLINE_SERVICE_VERSION`
    #[serde(default)]
    pub service_version: String,
    /// Uncaught-fault handling mode.
    ///
    /// Environment variable: `FAULTLINE_ON_UNCAUGHT`
    #[serde(default)]
    pub on_uncaught: UncaughtMode,
    /// Ingest endpoint base URL.
    ///
    /// Environment variable: `FAULTLINE_ENDPOINT`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Pending-event queue capacity. When full, the oldest event is
    /// evicted to admit a new one.
    ///
    /// Environment variable: `FAULTLINE_QUEUE_CAPACITY`
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum events per outbound batch.
    ///
    /// Environment variable: `FAULTLINE_BATCH_SIZE`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum delivery attempts per event, including the first.
    ///
    /// Environment variable: `FAULTLINE_MAX_ATTEMPTS`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff in milliseconds.
    ///
    /// Environment variable: `FAULTLINE_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    ///
    /// Environment variable: `FAULTLINE_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `FAULTLINE_RETRY_JITTER_FACTOR`
    #[serde(default = "default_retry_jitter_factor")]
    pub retry_jitter_factor: f64,
    /// How often the delivery loop polls when the queue is idle, in
    /// milliseconds.
    ///
    /// Environment variable: `FAULTLINE_POLL_INTERVAL_MS`
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-delivery HTTP timeout in seconds. A call exceeding it is a
    /// retryable failure.
    ///
    /// Environment variable: `FAULTLINE_REQUEST_TIMEOUT_SECS`
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Budget for the flush-on-shutdown path in seconds.
    ///
    /// Environment variable: `FAULTLINE_SHUTDOWN_TIMEOUT_SECS`
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Resolves configuration from explicit options, environment, and
    /// defaults.
    ///
    /// Precedence, highest to lowest:
    /// 1. Explicit `ConfigOptions`
    /// 2. `FAULTLINE_*` environment variables
    /// 3. Built-in defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` only for structurally invalid input, such as
    /// an unknown uncaught-handling mode or an empty credential string.
    /// Missing optional fields are not errors.
    pub fn resolve(options: ConfigOptions) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(options));

        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Service context attached to every event from this process.
    pub fn service_context(&self) -> ServiceContext {
        ServiceContext::new(self.service.clone(), self.service_version.clone())
    }

    /// Base delay for exponential backoff.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Cap on the backoff delay.
    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Idle poll interval of the delivery loop.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-delivery HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Budget for the flush-on-shutdown path.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Validates structural constraints on resolved values.
    fn validate(&self) -> Result<()> {
        if matches!(&self.project_id, Some(id) if id.is_empty()) {
            return Err(ConfigError::invalid("project_id", "must not be empty when supplied"));
        }
        if matches!(&self.credential, Some(c) if c.is_empty()) {
            return Err(ConfigError::invalid("credential", "must not be empty when supplied"));
        }
        if matches!(&self.key, Some(k) if k.is_empty()) {
            return Err(ConfigError::invalid("key", "must not be empty when supplied"));
        }
        if self.endpoint.is_empty() {
            return Err(ConfigError::invalid("endpoint", "must not be empty"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be greater than 0"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be greater than 0"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(ConfigError::invalid(
                "retry_jitter_factor",
                "must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reporting_enabled: default_reporting_enabled(),
            project_id: None,
            credential: None,
            key: None,
            service: default_service(),
            service_version: String::new(),
            on_uncaught: UncaughtMode::default(),
            endpoint: default_endpoint(),
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter_factor: default_retry_jitter_factor(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_reporting_enabled() -> bool {
    true
}

fn default_service() -> String {
    std::env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "unknown-service".to_string())
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_queue_capacity() -> usize {
    100
}

fn default_batch_size() -> usize {
    25
}

fn default_max_attempts() -> u32 {
    4
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    64000
}

fn default_retry_jitter_factor() -> f64 {
    0.1
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        vars: Vec<String>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, vars: Vec::new(), originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            if !self.vars.contains(&key.to_string()) {
                self.originals.insert(key.to_string(), env::var(key).ok());
                self.vars.push(key.to_string());
            }
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                match self.originals.get(var) {
                    Some(Some(value)) => env::set_var(var, value),
                    Some(None) => env::remove_var(var),
                    None => {},
                }
            }
        }
    }

    #[test]
    fn defaults_are_valid_and_reporting_enabled() {
        let _guard = TestEnvGuard::new();
        let config = Config::resolve(ConfigOptions::default()).expect("defaults resolve");

        assert!(config.reporting_enabled);
        assert_eq!(config.on_uncaught, UncaughtMode::Ignore);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_attempts, 4);
        assert!(config.project_id.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("FAULTLINE_PROJECT_ID", "env-project");
        guard.set_var("FAULTLINE_SERVICE", "billing");
        guard.set_var("FAULTLINE_SERVICE_VERSION", "2.3.1");
        guard.set_var("FAULTLINE_ON_UNCAUGHT", "logAndContinue");
        guard.set_var("FAULTLINE_QUEUE_CAPACITY", "16");

        let config = Config::resolve(ConfigOptions::default()).expect("env config resolves");

        assert_eq!(config.project_id.as_deref(), Some("env-project"));
        assert_eq!(config.service_context(), ServiceContext::new("billing", "2.3.1"));
        assert_eq!(config.on_uncaught, UncaughtMode::LogAndContinue);
        assert_eq!(config.queue_capacity, 16);
    }

    #[test]
    fn explicit_options_take_precedence_over_environment() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("FAULTLINE_PROJECT_ID", "env-project");
        guard.set_var("FAULTLINE_ON_UNCAUGHT", "logAndContinue");

        let options = ConfigOptions {
            project_id: Some("explicit-project".to_string()),
            on_uncaught: Some(UncaughtMode::LogAndExit),
            ..ConfigOptions::default()
        };
        let config = Config::resolve(options).expect("explicit config resolves");

        assert_eq!(config.project_id.as_deref(), Some("explicit-project"));
        assert_eq!(config.on_uncaught, UncaughtMode::LogAndExit);
    }

    #[test]
    fn unknown_uncaught_mode_is_a_resolution_error() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("FAULTLINE_ON_UNCAUGHT", "abort");

        let result = Config::resolve(ConfigOptions::default());
        assert!(matches!(result, Err(ConfigError::Resolution(_))));
    }

    #[test]
    fn empty_credential_is_rejected() {
        let _guard = TestEnvGuard::new();
        let options =
            ConfigOptions { credential: Some(String::new()), ..ConfigOptions::default() };

        let result = Config::resolve(options);
        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "credential", .. })));
    }

    #[test]
    fn missing_project_id_is_not_an_error() {
        let _guard = TestEnvGuard::new();
        let config = Config::resolve(ConfigOptions::default()).expect("config resolves");
        assert!(config.project_id.is_none());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let _guard = TestEnvGuard::new();
        let options = ConfigOptions { queue_capacity: Some(0), ..ConfigOptions::default() };

        let result = Config::resolve(options);
        assert!(matches!(result, Err(ConfigError::InvalidValue { field: "queue_capacity", .. })));
    }
}
