/*!
 * HTTP transport used by the remote provider.
 *
 * Uses `ureq` — a pure-Rust blocking HTTP client with no async runtime.
 * Dispatch already runs on the worker thread (or the thread that called
 * `flush`), so blocking I/O is fine there.
 *
 * The transport performs exactly one request per call and classifies the
 * result. Retrying is the provider's decision.
 */

use std::time::Duration;

use ureq::Agent;

use crate::protocol::constants::API_KEY_HEADER;
use crate::protocol::types::ErrorReport;

/**
 * Result of a single POST.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The endpoint answered with a 2xx status.
    Accepted(u16),

    /// The endpoint answered with a non-2xx status.
    Rejected(u16),

    /// No response: DNS, connect, TLS, timeout or I/O failure.
    Failed(String),
}

impl Delivery {
    /**
     * Whether another attempt could plausibly succeed.
     *
     * Network failures and 5xx/429 answers are transient; other 4xx
     * answers mean the request itself is wrong.
     */
    pub fn is_retryable(&self) -> bool {
        match self {
            Delivery::Accepted(_) => false,
            Delivery::Rejected(status) => *status >= 500 || *status == 429,
            Delivery::Failed(_) => true,
        }
    }
}

/**
 * Thin wrapper around `ureq::Agent` that POSTs reports as JSON.
 */
pub struct HttpTransport {
    agent: Agent,
}

impl HttpTransport {
    /**
     * Creates a transport whose requests are bounded by `timeout`
     * (connect and whole request).
     *
     * Non-2xx statuses are returned as responses, not errors, so they can
     * be classified.
     */
    pub fn new(timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_connect(Some(timeout))
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self { agent }
    }

    /**
     * POSTs `report` to `endpoint` with the API key header.
     *
     * `send_json` sets `Content-Type: application/json`.
     */
    pub fn post_report(&self, endpoint: &str, api_key: &str, report: &ErrorReport) -> Delivery {
        let result = self
            .agent
            .post(endpoint)
            .header(API_KEY_HEADER, api_key)
            .send_json(report);

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if (200..300).contains(&status) {
                    Delivery::Accepted(status)
                } else {
                    Delivery::Rejected(status)
                }
            }
            Err(err) => Delivery::Failed(err.to_string()),
        }
    }
}
