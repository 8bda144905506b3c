//! End-to-end tests for the reporter facade.
//!
//! Each test runs a full pipeline against a local mock of the report
//! endpoint: resolve config, capture, flush, verify the wire payload.

use std::time::Duration;

use faultline::{ConfigOptions, ReportMetadata, Reporter};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_options(server: &MockServer) -> ConfigOptions {
    ConfigOptions {
        project_id: Some("proj-e2e".to_string()),
        key: Some("k-e2e".to_string()),
        service: Some("orders".to_string()),
        service_version: Some("2.0.0".to_string()),
        endpoint: Some(server.uri()),
        queue_capacity: Some(8),
        batch_size: Some(4),
        max_attempts: Some(2),
        ..ConfigOptions::default()
    }
}

#[tokio::test]
async fn report_with_user_is_delivered_exactly_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/projects/proj-e2e/events:report"))
        .and(query_param("key", "k-e2e"))
        .and(body_partial_json(serde_json::json!({
            "events": [{
                "message": "payment declined",
                "user": "u1",
                "serviceContext": {"service": "orders", "version": "2.0.0"}
            }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = Reporter::init(test_options(&server)).expect("reporter initializes");

    let id = reporter.report_with("payment declined", ReportMetadata::for_user("u1"));
    assert!(id.is_some());

    reporter.flush(Duration::from_secs(2)).await.expect("flush completes");
    assert_eq!(reporter.stats().delivered(), 1);

    reporter.shutdown(Duration::from_secs(2)).await.expect("shutdown completes");
}

#[tokio::test]
async fn error_values_are_reported_with_their_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "events": [{"message": "connection reset by peer"}]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = Reporter::init(test_options(&server)).expect("reporter initializes");

    let error =
        std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset by peer");
    assert!(reporter.report_error(&error).is_some());

    reporter.flush(Duration::from_secs(2)).await.expect("flush completes");
    reporter.shutdown(Duration::from_secs(2)).await.expect("shutdown completes");
}

#[tokio::test]
async fn missing_identity_disables_reporting_without_network_calls() {
    let server = MockServer::start().await;

    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    // No project id and no credential anywhere.
    let options = ConfigOptions {
        endpoint: Some(server.uri()),
        service: Some("orders".to_string()),
        ..ConfigOptions::default()
    };
    let reporter = Reporter::init(options).expect("initialization is lazy about identity");

    assert!(reporter.report("first fault").is_some());
    let _ = reporter.flush(Duration::from_secs(2)).await;

    assert!(!reporter.is_reporting_enabled());
    assert!(reporter.report("after identity failure").is_none());
    assert_eq!(reporter.stats().delivered(), 0);

    reporter.shutdown(Duration::from_secs(2)).await.expect("shutdown completes");
}

#[tokio::test]
async fn disabled_reporting_turns_captures_into_no_ops() {
    let server = MockServer::start().await;

    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    let options =
        ConfigOptions { reporting_enabled: Some(false), ..test_options(&server) };
    let reporter = Reporter::init(options).expect("reporter initializes");

    assert!(reporter.report("discarded").is_none());
    assert_eq!(reporter.stats().enqueued(), 0);

    reporter.shutdown(Duration::from_secs(2)).await.expect("shutdown completes");
}

#[tokio::test]
async fn shutdown_flushes_queued_events() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&server)
        .await;

    let reporter = Reporter::init(test_options(&server)).expect("reporter initializes");

    for i in 0..5 {
        assert!(reporter.report(format!("pending fault {i}")).is_some());
    }

    reporter.shutdown(Duration::from_secs(2)).await.expect("shutdown completes");
    assert_eq!(reporter.stats().delivered(), 5);

    // The gate closed with shutdown; later captures are discarded.
    assert!(reporter.report("too late").is_none());
}

#[tokio::test]
async fn queue_overflow_keeps_newest_events() {
    let server = MockServer::start().await;

    // Slow responses hold the single-flight loop in its first delivery
    // while the burst below overflows the queue.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(2)
        .mount(&server)
        .await;

    let mut options = test_options(&server);
    options.queue_capacity = Some(2);
    options.batch_size = Some(2);
    let reporter = Reporter::init(options).expect("reporter initializes");

    // First capture goes in flight on its own; wait until the server has
    // seen it so the loop is pinned inside the delayed response.
    assert!(reporter.report("fault 0").is_some());
    for _ in 0..100 {
        let seen = server.received_requests().await.expect("requests recorded").len();
        if seen == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Burst past capacity: five more captures against a queue of two.
    // The three oldest are evicted; the two newest survive in order.
    for i in 1..=5 {
        assert!(reporter.report(format!("fault {i}")).is_some());
    }

    reporter.flush(Duration::from_secs(5)).await.expect("flush completes");

    let requests = server.received_requests().await.expect("requests recorded");
    let last = requests.last().expect("at least one request");
    let body: serde_json::Value = serde_json::from_slice(&last.body).expect("body is json");
    let messages: Vec<&str> = body["events"]
        .as_array()
        .expect("events is an array")
        .iter()
        .map(|event| event["message"].as_str().expect("message is a string"))
        .collect();
    assert_eq!(messages, vec!["fault 4", "fault 5"]);

    let stats = reporter.stats();
    assert_eq!(stats.enqueued(), 6);
    assert_eq!(stats.delivered(), 3);
    assert_eq!(stats.dropped(), 3);

    reporter.shutdown(Duration::from_secs(2)).await.expect("shutdown completes");
}
