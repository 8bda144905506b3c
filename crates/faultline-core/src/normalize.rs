//! Fault normalization into the canonical event shape.
//!
//! Converts heterogeneous inputs (error values, raw message strings, fault
//! plus request context pairs) into `ErrorEvent`. Normalization is total:
//! malformed input degrades to a best-effort event, never to an error,
//! because the fault-reporting path must never itself fault.

use std::sync::Arc;

use crate::{
    models::{ErrorEvent, EventId, HttpContext, ServiceContext, StackFrame},
    time::Clock,
};

/// Placeholder message for faults that carry no usable message.
pub const UNKNOWN_ERROR_MESSAGE: &str = "unknown error";

/// Raw fault material handed to the normalizer.
///
/// Three shapes feed into this: a plain message, an error value with a
/// captured backtrace, or adapter-extracted fault text. All fields are
/// optional; the normalizer fills the gaps.
#[derive(Debug, Clone, Default)]
pub struct FaultPayload {
    /// Human-readable fault description.
    pub message: Option<String>,
    /// Raw stack trace text in Rust backtrace layout.
    pub stack: Option<String>,
    /// User the fault occurred for.
    pub user: Option<String>,
}

impl FaultPayload {
    /// Builds a payload from an error value, capturing the current
    /// backtrace at the call site.
    ///
    /// Backtrace text is only useful when the process runs with
    /// `RUST_BACKTRACE=1`; otherwise the capture yields no frames and the
    /// event is sent without a stack.
    pub fn from_error(error: &(dyn std::error::Error + '_)) -> Self {
        let backtrace = std::backtrace::Backtrace::force_capture();
        Self {
            message: Some(error.to_string()),
            stack: Some(backtrace.to_string()),
            user: None,
        }
    }
}

impl From<&str> for FaultPayload {
    fn from(message: &str) -> Self {
        Self { message: Some(message.to_string()), ..Self::default() }
    }
}

impl From<String> for FaultPayload {
    fn from(message: String) -> Self {
        Self { message: Some(message), ..Self::default() }
    }
}

/// Converts raw fault material into canonical `ErrorEvent`s.
///
/// Holds the process-fixed service context and a clock for timestamps.
/// Pure and infallible: every input produces an event with a non-empty
/// message.
#[derive(Debug, Clone)]
pub struct Normalizer {
    service_context: ServiceContext,
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    /// Creates a normalizer for the given service context.
    pub fn new(service_context: ServiceContext, clock: Arc<dyn Clock>) -> Self {
        Self { service_context, clock }
    }

    /// Normalizes a fault payload and optional request context into an
    /// `ErrorEvent`.
    ///
    /// Missing or empty messages coerce to a placeholder; unparseable
    /// stack text yields an event without frames. Never fails.
    pub fn normalize(&self, payload: FaultPayload, request: Option<HttpContext>) -> ErrorEvent {
        let message = match payload.message {
            Some(message) if !message.trim().is_empty() => message,
            _ => UNKNOWN_ERROR_MESSAGE.to_string(),
        };

        let stack_frames = payload
            .stack
            .as_deref()
            .map(parse_stack)
            .filter(|frames| !frames.is_empty());

        let http_request = request.filter(|context| !context.is_empty());

        ErrorEvent {
            id: EventId::new(),
            message,
            stack_frames,
            event_time: chrono::DateTime::from(self.clock.now_system()),
            service_context: self.service_context.clone(),
            http_request,
            user: payload.user,
        }
    }
}

/// Parses Rust backtrace text into ordered stack frames.
///
/// Recognizes numbered symbol lines (`  3: module::function`) optionally
/// followed by an `at path:line:column` continuation. Unrecognized lines
/// are skipped; a fully unparseable trace yields no frames.
fn parse_stack(text: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut pending: Option<StackFrame> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(location) = trimmed.strip_prefix("at ") {
            if let Some(frame) = pending.as_mut() {
                let (file, line_number) = parse_location(location);
                frame.file = file;
                frame.line = line_number;
            }
            continue;
        }

        if let Some(function) = parse_symbol_line(trimmed) {
            if let Some(frame) = pending.take() {
                frames.push(frame);
            }
            pending = Some(StackFrame { function, file: None, line: None });
        }
    }

    if let Some(frame) = pending.take() {
        frames.push(frame);
    }

    frames
}

/// Extracts the symbol from a `N: symbol` backtrace line.
fn parse_symbol_line(line: &str) -> Option<String> {
    let (index, symbol) = line.split_once(':')?;
    if index.trim().parse::<u32>().is_err() {
        return None;
    }
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return None;
    }
    Some(symbol.to_string())
}

/// Splits `path:line[:column]` into file and line number.
fn parse_location(location: &str) -> (Option<String>, Option<u32>) {
    let location = location.trim();
    if location.is_empty() {
        return (None, None);
    }

    let mut parts = location.rsplitn(3, ':');
    let last = parts.next().unwrap_or_default();
    let middle = parts.next();
    let rest = parts.next();

    // path:line:column
    if let (Some(middle), Some(rest)) = (middle, rest) {
        if last.parse::<u32>().is_ok() {
            if let Ok(line) = middle.parse::<u32>() {
                return (Some(rest.to_string()), Some(line));
            }
        }
        return (Some(format!("{rest}:{middle}:{last}")), None);
    }

    // path:line
    if let Some(middle) = middle {
        if let Ok(line) = last.parse::<u32>() {
            return (Some(middle.to_string()), Some(line));
        }
        return (Some(location.to_string()), None);
    }

    (Some(location.to_string()), None)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::time::TestClock;

    fn test_normalizer() -> Normalizer {
        let clock = TestClock::with_start_time(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        );
        Normalizer::new(ServiceContext::new("api", "1.0"), Arc::new(clock))
    }

    #[test]
    fn message_is_preserved() {
        let event = test_normalizer().normalize(FaultPayload::from("disk full"), None);
        assert_eq!(event.message, "disk full");
        assert_eq!(event.service_context, ServiceContext::new("api", "1.0"));
    }

    #[test]
    fn missing_message_coerces_to_placeholder() {
        let normalizer = test_normalizer();

        let empty = normalizer.normalize(FaultPayload::default(), None);
        assert_eq!(empty.message, UNKNOWN_ERROR_MESSAGE);

        let blank = normalizer.normalize(FaultPayload::from("   "), None);
        assert_eq!(blank.message, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn timestamp_comes_from_clock() {
        let event = test_normalizer().normalize(FaultPayload::from("x"), None);
        assert_eq!(event.event_time.timestamp(), 1_700_000_000);
    }

    #[test]
    fn backtrace_text_parses_into_ordered_frames() {
        let stack = "\
   0: app::orders::charge
             at src/orders.rs:88:13
   1: app::handler::run
             at src/handler.rs:42:5
   2: app::main
";
        let payload =
            FaultPayload { message: Some("boom".to_string()), stack: Some(stack.to_string()), user: None };
        let event = test_normalizer().normalize(payload, None);

        let frames = event.stack_frames.expect("frames parsed");
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].function, "app::orders::charge");
        assert_eq!(frames[0].file.as_deref(), Some("src/orders.rs"));
        assert_eq!(frames[0].line, Some(88));
        assert_eq!(frames[1].function, "app::handler::run");
        assert_eq!(frames[1].line, Some(42));
        assert_eq!(frames[2].function, "app::main");
        assert!(frames[2].file.is_none());
    }

    #[test]
    fn unparseable_stack_yields_no_frames() {
        let payload = FaultPayload {
            message: Some("boom".to_string()),
            stack: Some("not a backtrace at all".to_string()),
            user: None,
        };
        let event = test_normalizer().normalize(payload, None);
        assert!(event.stack_frames.is_none());
    }

    #[test]
    fn empty_request_context_is_dropped() {
        let event =
            test_normalizer().normalize(FaultPayload::from("x"), Some(HttpContext::default()));
        assert!(event.http_request.is_none());
    }

    #[test]
    fn populated_request_context_is_attached() {
        let context = HttpContext {
            method: Some("POST".to_string()),
            url: Some("https://example.com/pay".to_string()),
            ..HttpContext::default()
        };
        let event = test_normalizer().normalize(FaultPayload::from("x"), Some(context.clone()));
        assert_eq!(event.http_request, Some(context));
    }

    #[test]
    fn error_values_carry_their_display_message() {
        let error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let payload = FaultPayload::from_error(&error);
        let event = test_normalizer().normalize(payload, None);
        assert_eq!(event.message, "disk full");
    }

    #[test]
    fn user_metadata_survives_normalization() {
        let payload = FaultPayload {
            message: Some("custom failure".to_string()),
            stack: None,
            user: Some("u1".to_string()),
        };
        let event = test_normalizer().normalize(payload, None);
        assert_eq!(event.user.as_deref(), Some("u1"));
    }

    #[test]
    fn location_without_column_still_parses() {
        let (file, line) = parse_location("src/lib.rs:10");
        assert_eq!(file.as_deref(), Some("src/lib.rs"));
        assert_eq!(line, Some(10));
    }
}
