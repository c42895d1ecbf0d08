//! Turns raw input lines into scheme-qualified endpoints.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, trace};

const PORT: &str = r"(6553[0-5]|655[0-2][0-9]|65[0-4][0-9]{2}|6[0-4][0-9]{3}|[1-5][0-9]{4}|[1-9][0-9]{0,3})";
const IPV4: &str = r"((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";
const DOMAIN: &str = r"([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}";

#[allow(clippy::expect_used)]
static IPV4_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{IPV4}$")).expect("IPv4 regex is valid"));

#[allow(clippy::expect_used)]
static IPV4_PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{IPV4}:{PORT}$")).expect("IPv4:port regex is valid")
});

#[allow(clippy::expect_used)]
static DOMAIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{DOMAIN}$")).expect("domain regex is valid"));

#[allow(clippy::expect_used)]
static DOMAIN_PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{DOMAIN}:{PORT}$")).expect("domain:port regex is valid")
});

/// Scheme prepended to bare hosts.
const DEFAULT_SCHEME: &str = "https://";

/// What a bare input line was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointShape {
    /// Line already carried `http://` or `https://`
    Explicit,
    Ipv4,
    Ipv4WithPort,
    Domain,
    DomainWithPort,
}

/// One endpoint to visit: the input text and its absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTask {
    pub input: String,
    pub url: String,
    pub shape: EndpointShape,
}

impl EndpointTask {
    pub fn new(input: impl Into<String>, url: impl Into<String>, shape: EndpointShape) -> Self {
        Self {
            input: input.into(),
            url: url.into(),
            shape,
        }
    }
}

/// Recognise the shape of a trimmed, scheme-less line.
///
/// Patterns are tried in priority order: IPv4, IPv4:port, domain, domain:port.
pub fn detect_shape(line: &str) -> Option<EndpointShape> {
    if line.is_empty() {
        return None;
    }
    if IPV4_PATTERN.is_match(line) {
        Some(EndpointShape::Ipv4)
    } else if IPV4_PORT_PATTERN.is_match(line) {
        Some(EndpointShape::Ipv4WithPort)
    } else if DOMAIN_PATTERN.is_match(line) {
        Some(EndpointShape::Domain)
    } else if DOMAIN_PORT_PATTERN.is_match(line) {
        Some(EndpointShape::DomainWithPort)
    } else {
        None
    }
}

/// Classify one input line.
///
/// Blank lines and `#` comments yield nothing. A line containing an explicit
/// `http://` or `https://` is taken verbatim; otherwise a recognised bare host
/// gets `https://` prepended. Unrecognised lines are skipped silently.
///
/// # Examples
///
/// ```rust
/// use endpoint_snapshot::classify_line;
///
/// let tasks = classify_line("example.com:8443");
/// assert_eq!(tasks[0].url, "https://example.com:8443");
/// assert!(classify_line("# a comment").is_empty());
/// ```
pub fn classify_line(line: &str) -> Vec<EndpointTask> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Vec::new();
    }

    if trimmed.contains("http://") || trimmed.contains("https://") {
        return vec![EndpointTask::new(trimmed, trimmed, EndpointShape::Explicit)];
    }

    match detect_shape(trimmed) {
        Some(shape) => vec![EndpointTask::new(
            trimmed,
            format!("{DEFAULT_SCHEME}{trimmed}"),
            shape,
        )],
        None => {
            trace!(line = %trimmed, "skipping unrecognised input line");
            Vec::new()
        }
    }
}

/// Classify a whole input, preserving order. Duplicates are kept.
pub fn classify_lines<'a, I>(lines: I) -> Vec<EndpointTask>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut tasks = Vec::new();
    for (index, line) in lines.into_iter().enumerate() {
        for task in classify_line(line) {
            debug!(line = index + 1, url = %task.url, "extracted endpoint");
            tasks.push(task);
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ip_gets_https() {
        let tasks = classify_line("192.168.1.1");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].url, "https://192.168.1.1");
        assert_eq!(tasks[0].shape, EndpointShape::Ipv4);
    }

    #[test]
    fn ip_with_port() {
        let tasks = classify_line("10.0.0.7:8080");
        assert_eq!(tasks[0].url, "https://10.0.0.7:8080");
        assert_eq!(tasks[0].shape, EndpointShape::Ipv4WithPort);
    }

    #[test]
    fn domain_and_domain_with_port() {
        assert_eq!(classify_line("example.com")[0].shape, EndpointShape::Domain);
        let tasks = classify_line("sub.example.co.uk:443");
        assert_eq!(tasks[0].url, "https://sub.example.co.uk:443");
        assert_eq!(tasks[0].shape, EndpointShape::DomainWithPort);
    }

    #[test]
    fn explicit_scheme_is_verbatim() {
        let tasks = classify_line("  http://example.com/login?next=/  ");
        assert_eq!(tasks[0].url, "http://example.com/login?next=/");
        assert_eq!(tasks[0].shape, EndpointShape::Explicit);
    }

    #[test]
    fn comments_blank_and_garbage_are_skipped() {
        assert!(classify_line("").is_empty());
        assert!(classify_line("   ").is_empty());
        assert!(classify_line("# https://commented.example").is_empty());
        assert!(classify_line("not a host").is_empty());
        assert!(classify_line("localhost").is_empty());
        assert!(classify_line("300.1.1.1").is_empty());
        assert!(classify_line("example.com:70000").is_empty());
        assert!(classify_line("example.com:0").is_empty());
    }

    #[test]
    fn classification_is_idempotent() {
        for line in ["example.com", "1.2.3.4:80", "https://x.io", "junk"] {
            assert_eq!(classify_line(line), classify_line(line));
        }
    }

    #[test]
    fn classify_lines_keeps_order_and_duplicates() {
        let input = "a.com\n# skip\nb.com\n\na.com\n";
        let urls: Vec<String> = classify_lines(input.lines())
            .into_iter()
            .map(|t| t.url)
            .collect();
        assert_eq!(urls, vec!["https://a.com", "https://b.com", "https://a.com"]);
    }
}
