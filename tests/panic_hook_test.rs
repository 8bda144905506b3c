//! Uncaught-fault hook behavior.
//!
//! Lives in its own test binary because the panic hook is process-wide
//! state; sharing a process with other integration tests would make the
//! hook's reporter ambiguous.

use std::time::Duration;

use faultline::{ConfigOptions, Reporter, UncaughtMode};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn panics_are_reported_and_do_not_break_unwinding() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/projects/proj-hook/events:report"))
        .and(body_partial_json(serde_json::json!({
            "events": [{"serviceContext": {"service": "hook-test"}}]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = Reporter::init(ConfigOptions {
        project_id: Some("proj-hook".to_string()),
        key: Some("k".to_string()),
        service: Some("hook-test".to_string()),
        endpoint: Some(server.uri()),
        on_uncaught: Some(UncaughtMode::LogAndContinue),
        ..ConfigOptions::default()
    })
    .expect("reporter initializes");

    let outcome = std::thread::spawn(|| {
        panic!("worker thread exploded");
    })
    .join();
    assert!(outcome.is_err(), "panic must still propagate to join");

    reporter.flush(Duration::from_secs(2)).await.expect("flush completes");
    assert_eq!(reporter.stats().delivered(), 1);

    // The received event carries the panic message and source location.
    let requests = server.received_requests().await.expect("requests recorded");
    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("body is json");
    let message = body["events"][0]["message"].as_str().expect("message is a string");
    assert!(message.contains("worker thread exploded"));
    assert!(message.contains("panic at "));

    reporter.shutdown(Duration::from_secs(2)).await.expect("shutdown completes");
}
