/**
 * Remote provider — POSTs each report to the configured endpoint.
 *
 * Success means a 2xx answer. Network failures and 5xx/429 answers are
 * retried up to `max_retries` times with `retry_delay` in between; any
 * other status fails immediately. Every request is bounded by the
 * transport timeout, so a hung endpoint cannot stall a batch forever.
 */
use std::thread;
use std::time::Duration;

use super::ReportingProvider;
use crate::config::RemoteSettings;
use crate::protocol::types::ErrorReport;
use crate::transport::{Delivery, HttpTransport};

pub const REMOTE_PROVIDER: &str = "remote";
const REMOTE_PRIORITY: i32 = 3;

pub struct RemoteProvider {
    settings: RemoteSettings,
    transport: HttpTransport,
    enabled: bool,
    max_retries: u32,
    retry_delay: Duration,
}

impl RemoteProvider {
    pub fn new(
        settings: RemoteSettings,
        enabled: bool,
        max_retries: u32,
        retry_delay: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            settings,
            transport: HttpTransport::new(request_timeout),
            enabled,
            max_retries,
            retry_delay,
        }
    }
}

impl ReportingProvider for RemoteProvider {
    fn name(&self) -> &str {
        REMOTE_PROVIDER
    }

    fn priority(&self) -> i32 {
        REMOTE_PRIORITY
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn report(&self, report: &ErrorReport) -> bool {
        let attempts = self.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            let delivery =
                self.transport
                    .post_report(&self.settings.endpoint, &self.settings.api_key, report);

            match delivery {
                Delivery::Accepted(_) => return true,
                ref failed if failed.is_retryable() && attempt < attempts => {
                    tracing::debug!(
                        report_id = %report.id,
                        attempt,
                        outcome = ?failed,
                        "Remote delivery failed, retrying"
                    );
                    thread::sleep(self.retry_delay);
                }
                failed => {
                    tracing::warn!(
                        report_id = %report.id,
                        attempt,
                        outcome = ?failed,
                        endpoint = %self.settings.endpoint,
                        "Remote delivery failed"
                    );
                    return false;
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    /**
     * Serves one canned status per incoming connection and forwards the
     * raw request (head + body) to the returned channel.
     */
    fn serve(statuses: Vec<u16>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/ingest", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for status in statuses {
                let (stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut reader = BufReader::new(stream);
                let mut head = String::new();
                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                        break;
                    }
                    if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                        content_length = v.trim().parse().unwrap_or(0);
                    }
                    head.push_str(&line);
                }
                let mut body = vec![0u8; content_length];
                let _ = reader.read_exact(&mut body);

                let mut stream = reader.into_inner();
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = tx.send(format!("{head}\r\n{}", String::from_utf8_lossy(&body)));
            }
        });

        (url, rx)
    }

    fn provider(endpoint: String, max_retries: u32) -> RemoteProvider {
        RemoteProvider::new(
            RemoteSettings { endpoint, api_key: "secret-key".into() },
            true,
            max_retries,
            Duration::from_millis(10),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_posts_json_with_api_key() {
        let (url, rx) = serve(vec![200]);
        let report = ErrorReport::builder("remote boom").category("network").build();

        assert!(provider(url, 0).report(&report));

        let request = rx.recv_timeout(Duration::from_secs(2)).expect("request seen");
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /ingest"));
        assert!(lower.contains("x-api-key: secret-key"));
        assert!(lower.contains("content-type: application/json"));
        assert!(request.contains("\"message\":\"remote boom\""));
    }

    #[test]
    fn test_retries_server_errors_then_succeeds() {
        let (url, rx) = serve(vec![503, 200]);
        assert!(provider(url, 2).report(&ErrorReport::builder("x").build()));
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
    }

    #[test]
    fn test_client_error_is_not_retried() {
        let (url, rx) = serve(vec![400, 200]);
        assert!(!provider(url, 3).report(&ErrorReport::builder("x").build()));
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_unreachable_endpoint_is_false() {
        let p = provider("http://127.0.0.1:9/ingest".into(), 1);
        assert!(!p.report(&ErrorReport::builder("x").build()));
    }
}
