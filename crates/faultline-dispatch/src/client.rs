//! HTTP client for delivering event batches to the aggregation service.
//!
//! Wraps reqwest with the wire contract of the report endpoint and maps
//! transport and status failures onto [`DispatchError`] so the retry
//! logic can classify them.

use std::time::Duration;

use faultline_core::ErrorEvent;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{DispatchError, Result};
use crate::identity::{Credential, Identity};

/// Configuration for the report client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the aggregation service, without a trailing slash.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: faultline_core::config::DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            connect_timeout: Duration::from_secs(5),
            user_agent: concat!("faultline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Serialize)]
struct ReportBody<'a> {
    events: &'a [ErrorEvent],
}

/// HTTP client for report delivery.
///
/// Cheap to clone; the underlying reqwest client shares its connection
/// pool across clones.
#[derive(Debug, Clone)]
pub struct ReportClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ReportClient {
    /// Creates a report client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DispatchError::configuration(format!("http client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Delivers a batch of events under the given identity.
    ///
    /// Sends `{"events": [...]}` to the project report endpoint with the
    /// identity's credential attached. Success requires a 2xx response;
    /// every other outcome maps to a classified [`DispatchError`].
    #[instrument(skip(self, identity, events), fields(
        project_id = %identity.project_id,
        batch_len = events.len(),
    ))]
    pub async fn report_batch(&self, identity: &Identity, events: &[ErrorEvent]) -> Result<()> {
        let url = format!(
            "{}/projects/{}/events:report",
            self.config.endpoint.trim_end_matches('/'),
            identity.project_id
        );

        let mut request = self.client.post(&url).json(&ReportBody { events });
        request = match &identity.credential {
            Credential::Bearer(token) => request.bearer_auth(token),
            Credential::ApiKey(key) => request.query(&[("key", key.as_str())]),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::timeout(self.config.timeout.as_secs())
            } else {
                DispatchError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "batch accepted");
            return Ok(());
        }

        let retry_after = parse_retry_after(&response);
        let body = truncate_body(response.text().await.unwrap_or_default());

        Err(classify_status(status, body, retry_after))
    }

    /// Endpoint this client reports to.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

fn classify_status(status: StatusCode, body: String, retry_after: Option<u64>) -> DispatchError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DispatchError::auth_rejected(status.as_u16())
        },
        StatusCode::TOO_MANY_REQUESTS => {
            DispatchError::rate_limited(retry_after.unwrap_or(60))
        },
        s if s.is_client_error() => DispatchError::rejected(s.as_u16(), body),
        s if s.is_server_error() => DispatchError::server(s.as_u16(), body),
        s => DispatchError::network(format!("unexpected status: {s}")),
    }
}

fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// Caps stored response bodies so a chatty server cannot bloat logs.
fn truncate_body(body: String) -> String {
    const MAX_BODY_LEN: usize = 4096;
    if body.len() <= MAX_BODY_LEN {
        return body;
    }
    let mut end = MAX_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
