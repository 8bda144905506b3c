//! Process-wide uncaught fault hook.
//!
//! Installs a panic hook that reports the panic as a fault event before
//! handing control to whatever hook was installed previously. The hook
//! is installed at most once per process and never replaces the previous
//! hook, only wraps it.

use std::any::Any;
use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicBool, Ordering};

use faultline_core::{FaultPayload, UncaughtMode};
use tracing::error;

use crate::Reporter;

static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Installs the panic hook around the current one.
///
/// Idempotent across reporters: the first initialized reporter owns the
/// hook for the process lifetime.
pub(crate) fn install(reporter: &Reporter) {
    if HOOK_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let reporter = reporter.clone();
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        let message = match info.location() {
            Some(location) => format!(
                "panic at {}:{}: {}",
                location.file(),
                location.line(),
                panic_message(info.payload())
            ),
            None => format!("panic: {}", panic_message(info.payload())),
        };

        let mode = reporter.config().on_uncaught;
        let payload = FaultPayload {
            message: Some(message.clone()),
            stack: Some(Backtrace::force_capture().to_string()),
            user: None,
        };
        let queued = reporter.capture(payload, None).is_some();

        if matches!(mode, UncaughtMode::LogAndContinue | UncaughtMode::LogAndExit) {
            error!(queued, fault = %message, "uncaught fault");
        }

        previous(info);

        if mode == UncaughtMode::LogAndExit {
            // Bounded: a dead endpoint cannot hold the process open.
            let budget = reporter.config().shutdown_timeout();
            let _ = reporter.flush_blocking(budget);
            std::process::exit(1);
        }
    }));
}

/// Extracts a readable message from a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
