use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse failure categories shared by the prober and the capture stage.
///
/// The string forms are what end up in the report's status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    ConnectionRefused,
    DnsError,
    SslError,
    Error,
}

// Checked in order; the first table with a matching needle wins.
const TIMEOUT_NEEDLES: &[&str] = &[
    "timeout",
    "timed out",
    "deadline exceeded",
    "err_timed_out",
    "err_connection_timed_out",
];
const REFUSED_NEEDLES: &[&str] = &["connection refused", "err_connection_refused"];
const DNS_NEEDLES: &[&str] = &[
    "no such host",
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "err_name_not_resolved",
];
const SSL_NEEDLES: &[&str] = &["certificate", "tls", "ssl", "handshake", "err_cert_"];

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorKind::DnsError => "DNS_ERROR",
            ErrorKind::SslError => "SSL_ERROR",
            ErrorKind::Error => "ERROR",
        }
    }

    /// Map raw error text from the network or rendering stack onto the taxonomy.
    ///
    /// Best-effort substring matching: wording differs between hyper, the OS
    /// resolver and Chromium's `net::ERR_*` codes, so unknown phrasings fall
    /// through to [`ErrorKind::Error`].
    pub fn classify(message: &str) -> ErrorKind {
        let message = message.to_ascii_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if contains_any(TIMEOUT_NEEDLES) {
            ErrorKind::Timeout
        } else if contains_any(REFUSED_NEEDLES) {
            ErrorKind::ConnectionRefused
        } else if contains_any(DNS_NEEDLES) {
            ErrorKind::DnsError
        } else if contains_any(SSL_NEEDLES) {
            ErrorKind::SslError
        } else {
            ErrorKind::Error
        }
    }

    /// Classify a transport error from the probe client.
    ///
    /// reqwest only exposes a typed predicate for timeouts; for everything else
    /// the whole `source()` chain is flattened because the interesting text
    /// (resolver or socket error) sits below reqwest's own message.
    pub fn from_reqwest(err: &reqwest::Error) -> ErrorKind {
        if err.is_timeout() {
            return ErrorKind::Timeout;
        }
        let mut text = error_chain_text(err);
        // Host names such as `tls-timeout.example` must not decide the kind.
        if let Some(url) = err.url() {
            text = text.replace(url.as_str(), "");
        }
        ErrorKind::classify(&text)
    }

    /// Human-readable prefix used in failure summaries.
    pub fn describe(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "request timed out",
            ErrorKind::ConnectionRefused => "connection refused",
            ErrorKind::DnsError => "DNS resolution failed",
            ErrorKind::SslError => "TLS/certificate error",
            ErrorKind::Error => "request failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join an error and all of its sources into one `a: b: c` line.
pub fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

/// Failure of a single render attempt.
///
/// Never fatal to the run; the capture stage machine decides whether another
/// attempt follows.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Render timed out after {0:?}")]
    Timeout(Duration),

    #[error("Browser instance unavailable")]
    BrowserUnavailable,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Page error: {0}")]
    Page(String),

    #[error("Screenshot capture failed: {0}")]
    Capture(String),
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::Timeout(_) => ErrorKind::Timeout,
            other => ErrorKind::classify(&other.to_string()),
        }
    }
}

/// Batch-level errors. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Input path is empty")]
    EmptyInputPath,

    #[error("Cannot read input file {path}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No usable endpoints found in input")]
    NoEndpoints,

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Report generation failed: {0}")]
    Report(String),

    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
}

impl SweepError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SweepError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reqwest_kind_ignores_words_in_url() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::new()
            .get(format!("http://{addr}/timeout/tls/ssl"))
            .send()
            .await
            .unwrap_err();

        assert_eq!(ErrorKind::from_reqwest(&err), ErrorKind::ConnectionRefused);
    }

    #[test]
    fn classify_go_style_messages() {
        assert_eq!(
            ErrorKind::classify("Get \"https://x\": context deadline exceeded"),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::classify("dial tcp 10.0.0.1:443: connect: connection refused"),
            ErrorKind::ConnectionRefused
        );
        assert_eq!(
            ErrorKind::classify("dial tcp: lookup nope.example: no such host"),
            ErrorKind::DnsError
        );
        assert_eq!(
            ErrorKind::classify("x509: certificate signed by unknown authority"),
            ErrorKind::SslError
        );
    }

    #[test]
    fn classify_hyper_and_os_messages() {
        assert_eq!(
            ErrorKind::classify(
                "error sending request: error trying to connect: tcp connect error: Connection refused (os error 111)"
            ),
            ErrorKind::ConnectionRefused
        );
        assert_eq!(
            ErrorKind::classify(
                "error trying to connect: dns error: failed to lookup address information: Name or service not known"
            ),
            ErrorKind::DnsError
        );
        assert_eq!(
            ErrorKind::classify("operation timed out"),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn classify_chromium_net_errors() {
        assert_eq!(
            ErrorKind::classify("net::ERR_NAME_NOT_RESOLVED"),
            ErrorKind::DnsError
        );
        assert_eq!(
            ErrorKind::classify("net::ERR_CONNECTION_REFUSED"),
            ErrorKind::ConnectionRefused
        );
        assert_eq!(
            ErrorKind::classify("net::ERR_CONNECTION_TIMED_OUT"),
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorKind::classify("net::ERR_CERT_AUTHORITY_INVALID"),
            ErrorKind::SslError
        );
    }

    #[test]
    fn timeout_wins_over_later_categories() {
        assert_eq!(
            ErrorKind::classify("tls handshake timeout"),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn unknown_text_is_generic_error() {
        assert_eq!(ErrorKind::classify("something odd"), ErrorKind::Error);
        assert_eq!(ErrorKind::classify(""), ErrorKind::Error);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(
            ErrorKind::classify("CONNECTION REFUSED"),
            ErrorKind::ConnectionRefused
        );
    }

    #[test]
    fn render_timeout_kind_is_typed() {
        let err = RenderError::Timeout(Duration::from_secs(30));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(
            RenderError::Navigation("net::ERR_NAME_NOT_RESOLVED".into()).kind(),
            ErrorKind::DnsError
        );
        assert_eq!(RenderError::BrowserUnavailable.kind(), ErrorKind::Error);
    }

    #[test]
    fn kind_strings_match_report_values() {
        assert_eq!(ErrorKind::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ErrorKind::ConnectionRefused.as_str(), "CONNECTION_REFUSED");
        assert_eq!(ErrorKind::DnsError.as_str(), "DNS_ERROR");
        assert_eq!(ErrorKind::SslError.as_str(), "SSL_ERROR");
        assert_eq!(ErrorKind::Error.as_str(), "ERROR");
    }
}
