use std::time::Duration;

/// Fallback stem when nothing filesystem-safe is left of a URL.
pub const UNKNOWN_STEM: &str = "unknown";

/// Derive a filesystem-safe stem from a URL.
///
/// Strips the scheme, maps `:` and `/` to `_` and `..` to `__`, then drops
/// anything outside `[A-Za-z0-9._-]`. Different URLs can collapse to the same
/// stem (`a.com/x:y` and `a.com/x/y`); callers writing files accept that.
///
/// # Examples
///
/// ```rust
/// use endpoint_snapshot::safe_file_stem;
///
/// assert_eq!(safe_file_stem("https://example.com:8443/admin"), "example.com_8443_admin");
/// ```
pub fn safe_file_stem(url: &str) -> String {
    let stripped = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);

    let stem: String = stripped
        .replace([':', '/'], "_")
        .replace("..", "__")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if stem.is_empty() {
        UNKNOWN_STEM.to_string()
    } else {
        stem
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

/// Shorten `s` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}
