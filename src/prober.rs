//! HTTP probe issued after a successful capture.
//!
//! The probe records what the server answers to a plain GET: status line,
//! headers and a short body preview. Certificate verification is disabled on
//! purpose. The tool is pointed at internal and self-signed hosts, and a probe
//! that refused them would report nothing useful. Treat the probe's results as
//! unauthenticated data.

use crate::{Config, ErrorKind, SweepError};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Marker appended when the body was longer than the preview limit.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Header placed between response headers and the body preview.
pub const BODY_PREVIEW_HEADER: &str = "\n--- Response Body (Preview) ---\n";

/// Result of probing one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The server answered with this status code.
    Code(u16),
    /// Both attempts failed; this is the first attempt's classification.
    Failed(ErrorKind),
}

impl ProbeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeStatus::Code(_))
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Code(code) => write!(f, "{code}"),
            ProbeStatus::Failed(kind) => f.write_str(kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub status: ProbeStatus,
    /// Status line, headers and body preview, or the failure description.
    pub summary: String,
    /// Number of GET requests issued, 1 or 2.
    pub attempts: u32,
}

impl ProbeReport {
    pub fn status_code(&self) -> String {
        self.status.to_string()
    }
}

/// Seam between the capture stage and the network.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeReport;
}

/// reqwest-backed prober: one GET, one retry after a fixed delay.
pub struct HttpProber {
    client: reqwest::Client,
    retry_delay: Duration,
    body_preview_limit: usize,
}

impl HttpProber {
    pub fn new(config: &Config) -> Result<Self, SweepError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .danger_accept_invalid_certs(true);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder
            .build()
            .map_err(|e| SweepError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            retry_delay: config.probe_retry_delay,
            body_preview_limit: config.body_preview_limit,
        })
    }

    async fn fetch(&self, url: &str) -> Result<(u16, String), reqwest::Error> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();

        let mut summary = format!("{:?} {}\n", response.version(), status);
        for (name, value) in response.headers() {
            summary.push_str(name.as_str());
            summary.push_str(": ");
            summary.push_str(&String::from_utf8_lossy(value.as_bytes()));
            summary.push('\n');
        }

        // Read at most one byte past the limit, enough to know truncation happened.
        let mut body: Vec<u8> = Vec::new();
        let mut truncated = false;
        // The status is already known; a broken body only shortens the preview.
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() > self.body_preview_limit {
                        truncated = true;
                        body.truncate(self.body_preview_limit);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(url, error = %crate::error::error_chain_text(&e), "body read interrupted");
                    break;
                }
            }
        }

        if !body.is_empty() {
            summary.push_str(BODY_PREVIEW_HEADER);
            summary.push_str(&String::from_utf8_lossy(&body));
            if truncated {
                summary.push_str(TRUNCATION_MARKER);
            }
        }

        Ok((status.as_u16(), summary))
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, url: &str) -> ProbeReport {
        let first_error = match self.fetch(url).await {
            Ok((code, summary)) => {
                debug!(url, status = code, "probe succeeded");
                return ProbeReport {
                    status: ProbeStatus::Code(code),
                    summary,
                    attempts: 1,
                };
            }
            Err(e) => e,
        };

        let kind = ErrorKind::from_reqwest(&first_error);
        let detail = crate::error::error_chain_text(&first_error);
        warn!(url, kind = %kind, error = %detail, "probe failed, retrying");

        tokio::time::sleep(self.retry_delay).await;

        match self.fetch(url).await {
            Ok((code, summary)) => {
                debug!(url, status = code, "probe retry succeeded");
                ProbeReport {
                    status: ProbeStatus::Code(code),
                    summary,
                    attempts: 2,
                }
            }
            Err(retry_error) => {
                warn!(
                    url,
                    error = %crate::error::error_chain_text(&retry_error),
                    "probe retry failed"
                );
                ProbeReport {
                    status: ProbeStatus::Failed(kind),
                    summary: format!("{}: {}", kind.describe(), detail),
                    attempts: 2,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fast_config() -> Config {
        Config {
            probe_timeout: Duration::from_secs(5),
            probe_retry_delay: Duration::ZERO,
            body_preview_limit: 16,
            ..Default::default()
        }
    }

    /// Serve `responses` raw HTTP responses, one per connection.
    async fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/")
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nX-Test: yes\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn summary_contains_status_line_headers_and_body() {
        let url = serve(vec![http_response("200 OK", "hello")]).await;
        let prober = HttpProber::new(&fast_config()).unwrap();

        let report = prober.probe(&url).await;

        assert_eq!(report.status, ProbeStatus::Code(200));
        assert_eq!(report.status_code(), "200");
        assert_eq!(report.attempts, 1);
        assert!(report.summary.starts_with("HTTP/1.1 200 OK\n"));
        assert!(report.summary.contains("x-test: yes\n"));
        assert!(report.summary.contains(BODY_PREVIEW_HEADER));
        assert!(report.summary.ends_with("hello"));
        assert!(!report.summary.contains(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn long_body_is_truncated_with_marker() {
        let body = "x".repeat(64);
        let url = serve(vec![http_response("404 Not Found", &body)]).await;
        let prober = HttpProber::new(&fast_config()).unwrap();

        let report = prober.probe(&url).await;

        assert_eq!(report.status_code(), "404");
        let expected = format!("{}{}{}", BODY_PREVIEW_HEADER, "x".repeat(16), TRUNCATION_MARKER);
        assert!(report.summary.ends_with(&expected));
    }

    #[tokio::test]
    async fn body_exactly_at_limit_is_not_marked() {
        let body = "y".repeat(16);
        let url = serve(vec![http_response("200 OK", &body)]).await;
        let prober = HttpProber::new(&fast_config()).unwrap();

        let report = prober.probe(&url).await;

        assert!(report.summary.ends_with(&body));
        assert!(!report.summary.contains(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn status_kept_when_body_is_cut_short() {
        let url = serve(vec![
            "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\nhello".to_string(),
        ])
        .await;
        let prober = HttpProber::new(&fast_config()).unwrap();

        let report = prober.probe(&url).await;

        assert_eq!(report.status_code(), "200");
        assert_eq!(report.attempts, 1);
        assert!(report.summary.starts_with("HTTP/1.1 200 OK\n"));
    }

    #[tokio::test]
    async fn refused_connection_is_classified_after_two_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = HttpProber::new(&fast_config()).unwrap();
        let report = prober.probe(&format!("http://{addr}/")).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(report.status, ProbeStatus::Failed(ErrorKind::ConnectionRefused));
        assert_eq!(report.status_code(), "CONNECTION_REFUSED");
        assert!(report.summary.starts_with("connection refused: "));
    }

    #[tokio::test]
    async fn retry_recovers_from_first_failure() {
        // First connection is closed without a response, the second answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(http_response("201 Created", "ok").as_bytes())
                .await
                .unwrap();
        });

        let prober = HttpProber::new(&fast_config()).unwrap();
        let report = prober.probe(&format!("http://{addr}/")).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(report.status, ProbeStatus::Code(201));
    }
}
