//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration object handed to the capture
//! pipeline at construction time: worker pool size, timeouts, retry delays,
//! viewport, output layout and browser launch settings.

use crate::SweepError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a snapshot run
///
/// Every knob of the pipeline lives here so nothing in the library depends on
/// process-wide mutable state. The binary builds one `Config` (defaults, then an
/// optional JSON file, then CLI overrides) and passes it down.
///
/// # Examples
///
/// ```rust
/// use endpoint_snapshot::Config;
///
/// // Use default configuration
/// let config = Config::default();
/// assert_eq!(config.pool_size, 5);
///
/// // Create custom configuration
/// let config = Config {
///     pool_size: 10,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on concurrent workers (default: 5)
    ///
    /// The pool actually spawned is `min(pool_size, task_count)`. Zero is a
    /// valid value and turns the run into a no-op.
    pub pool_size: usize,

    /// Overall budget for one render attempt (default: 30 seconds)
    ///
    /// Expiry aborts the attempt and feeds the retry/fallback sequence.
    pub render_timeout: Duration,

    /// Fixed delay after navigation before the page is inspected (default: 3 seconds)
    pub settle_delay: Duration,

    /// Backoff before the second render attempt on the same URL (default: 2 seconds)
    pub capture_retry_delay: Duration,

    /// Client-level timeout for the HTTP probe (default: 10 seconds)
    pub probe_timeout: Duration,

    /// Backoff before the single probe retry (default: 1 second)
    pub probe_retry_delay: Duration,

    /// Maximum number of response body bytes kept in the probe summary (default: 1024)
    pub body_preview_limit: usize,

    /// Retry a failed `https://` capture over plain `http://` (default: true)
    pub scheme_fallback: bool,

    /// Browser viewport used for every render
    pub viewport: Viewport,

    /// Image encoding for persisted screenshots (default: PNG)
    pub image_format: ImageFormat,

    /// Directory under which run directories and reports are created (default: `./result`)
    pub output_root: PathBuf,

    /// Console verbosity (default: info)
    pub log_level: LogLevel,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for the browser and the probe client
    pub user_agent: Option<String>,

    /// Port for the Prometheus exporter listener (default: disabled)
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: 5,
            render_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(3),
            capture_retry_delay: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(10),
            probe_retry_delay: Duration::from_secs(1),
            body_preview_limit: 1024,
            scheme_fallback: true,
            viewport: Viewport::default(),
            image_format: ImageFormat::Png,
            output_root: PathBuf::from("./result"),
            log_level: LogLevel::default(),
            chrome_path: None,
            user_agent: None,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take their defaults.
    pub async fn from_json_file(path: &std::path::Path) -> Result<Self, SweepError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|source| {
            SweepError::Configuration(format!("cannot read {}: {source}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.render_timeout.is_zero() {
            return Err(SweepError::Configuration(
                "render timeout must be greater than 0".to_string(),
            ));
        }

        if self.probe_timeout.is_zero() {
            return Err(SweepError::Configuration(
                "probe timeout must be greater than 0".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(SweepError::Configuration(
                "viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if self.body_preview_limit == 0 {
            return Err(SweepError::Configuration(
                "body preview limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Browser viewport configuration for screenshots
///
/// # Examples
///
/// ```rust
/// use endpoint_snapshot::Viewport;
///
/// let desktop = Viewport::default();
/// assert_eq!((desktop.width, desktop.height), (1920, 1080));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
        }
    }
}

/// Supported encodings for persisted screenshots
///
/// The browser always captures PNG; other formats are re-encoded before
/// the file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format - lossless, written as captured
    Png,
    /// JPEG format - lossy, smaller files
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = SweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(SweepError::Configuration(format!(
                "unsupported image format: {other}"
            ))),
        }
    }
}

/// Console verbosity, on the 1..=5 scale used by the command line
///
/// 1=error, 2=warn, 3=info, 4=debug, 5=trace. Out-of-range values clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(from = "u8", into = "u8")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

impl From<u8> for LogLevel {
    fn from(value: u8) -> Self {
        match value {
            0 | 1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl From<LogLevel> for u8 {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => 1,
            LogLevel::Warn => 2,
            LogLevel::Info => 3,
            LogLevel::Debug => 4,
            LogLevel::Trace => 5,
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// The target hosts are frequently self-signed or misconfigured, so every
/// certificate check the browser would perform is switched off. Each launch
/// gets its own user-data directory to avoid profile singleton clashes.
///
/// # Examples
///
/// ```rust
/// use endpoint_snapshot::{Config, get_chrome_args};
///
/// let config = Config::default();
/// let args = get_chrome_args(&config);
/// assert!(args.contains(&"--ignore-certificate-errors".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-features=VizDisplayCompositor".to_string(),
        "--disable-ipc-flooding-protection".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-plugins".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-web-security".to_string(),
        "--no-first-run".to_string(),
        "--allow-running-insecure-content".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--ignore-ssl-errors".to_string(),
        "--ignore-certificate-errors-spki-list".to_string(),
        "--ignore-certificate-errors-skip-list".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir=/tmp/endpoint-snapshot-{unique_id}"),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

/// Build the chromiumoxide launch configuration for the shared browser.
pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, SweepError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(SweepError::BrowserLaunchFailed)
}
