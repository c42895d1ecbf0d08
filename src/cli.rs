use crate::{
    ChromeRenderer, Config, ConsoleProgress, HttpProber, ImageFormat, LogLevel, NoopProgress,
    PipelineMetrics, ProgressSink, ResultRecord, SnapshotService, SweepError, TracingProgress,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

#[derive(Parser)]
#[command(name = "endpoint-snapshot")]
#[command(about = "Probe and screenshot a list of web endpoints")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Log level: 1=error 2=warn 3=info 4=debug 5=trace")]
    pub log_level: Option<u8>,

    #[arg(long, global = true, help = "Number of concurrent workers")]
    pub pool_size: Option<usize>,

    #[arg(long, global = true, help = "Render timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, global = true, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, global = true, help = "Root directory for run output")]
    pub output: Option<PathBuf>,

    #[arg(long, global = true, help = "Screenshot format (png, jpeg)")]
    pub format: Option<ImageFormat>,

    #[arg(long, global = true, help = "Serve Prometheus metrics on this port")]
    pub metrics_port: Option<u16>,

    #[arg(long, global = true, help = "Disable the progress bar")]
    pub no_progress: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture every endpoint listed in a file
    Batch {
        #[arg(short = 'f', long = "file", help = "Input file with one endpoint per line")]
        input: PathBuf,
    },

    /// Capture one endpoint through the same pipeline
    Single {
        #[arg(short, long, help = "URL, domain or IP to capture")]
        url: String,
    },

    /// Validate the file given with --config
    Validate,
}

impl Cli {
    /// Apply command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(level) = self.log_level {
            config.log_level = LogLevel::from(level);
        }
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(timeout) = self.timeout {
            config.render_timeout = Duration::from_secs(timeout);
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
        if let Some(output) = &self.output {
            config.output_root = output.clone();
        }
        if let Some(format) = self.format {
            config.image_format = format;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = Some(port);
        }
    }
}

/// Defaults, then the `--config` file, then flags, then validation.
pub async fn load_config(args: &Cli) -> Result<Config, SweepError> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path).await?,
        None => Config::default(),
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

pub struct CliRunner {
    pub config: Config,
    config_path: Option<PathBuf>,
    no_progress: bool,
    metrics: Arc<PipelineMetrics>,
    // Launched on first use so `validate` never starts a browser.
    renderer: OnceCell<Arc<ChromeRenderer>>,
}

impl CliRunner {
    pub fn new(config: Config, args: &Cli, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            config,
            config_path: args.config.clone(),
            no_progress: args.no_progress,
            metrics,
            renderer: OnceCell::new(),
        }
    }

    pub async fn run(&self, command: Commands) -> Result<(), SweepError> {
        match command {
            Commands::Batch { input } => self.run_batch(input).await,
            Commands::Single { url } => self.run_single(url).await,
            Commands::Validate => self.validate_config(),
        }
    }

    async fn service(&self, progress: Arc<dyn ProgressSink>) -> Result<SnapshotService, SweepError> {
        let renderer = self
            .renderer
            .get_or_try_init(|| async { ChromeRenderer::launch(&self.config).await.map(Arc::new) })
            .await?
            .clone();
        let prober = Arc::new(HttpProber::new(&self.config)?);

        Ok(SnapshotService::new(self.config.clone(), renderer, prober)
            .with_metrics(self.metrics.clone())
            .with_progress(progress))
    }

    pub async fn run_batch(&self, input: PathBuf) -> Result<(), SweepError> {
        info!("Processing endpoints from {}", input.display());

        let progress: Arc<dyn ProgressSink> = if self.no_progress {
            Arc::new(NoopProgress)
        } else {
            // Length is set from the first progress event.
            Arc::new(ConsoleProgress::new(0))
        };
        let report = self.service(progress).await?.run_file(&input).await?;

        let counters = report.results.counters;
        println!("Batch {} complete:", report.layout.batch_name());
        println!("  Endpoints: {}", counters.processed);
        println!("  Succeeded: {}", counters.succeeded);
        println!("  Failed: {}", counters.failed());
        println!("  Duration: {}", crate::format_duration(report.elapsed));
        println!("  CSV report: {}", report.layout.csv_report_path().display());
        println!("  HTML report: {}", report.layout.html_report_path().display());
        Ok(())
    }

    pub async fn run_single(&self, url: String) -> Result<(), SweepError> {
        let report = self
            .service(Arc::new(TracingProgress))
            .await?
            .run_lines([url.as_str()])
            .await?;

        for (endpoint, record) in &report.results.results {
            print_record(endpoint, record);
        }
        println!("  Run directory: {}", report.layout.batch_dir().display());
        Ok(())
    }

    /// Report the configuration loaded from `--config`.
    ///
    /// Loading already validated it, so reaching this point means it is usable.
    pub fn validate_config(&self) -> Result<(), SweepError> {
        let Some(path) = &self.config_path else {
            return Err(SweepError::Configuration(
                "no configuration file given, use --config <file>".to_string(),
            ));
        };
        let config = &self.config;

        println!("Configuration {} is valid:", path.display());
        println!("  Pool size: {}", config.pool_size);
        println!("  Render timeout: {:?}", config.render_timeout);
        println!("  Probe timeout: {:?}", config.probe_timeout);
        println!(
            "  Viewport: {}x{}",
            config.viewport.width, config.viewport.height
        );
        println!("  Image format: {:?}", config.image_format);
        println!("  Output root: {}", config.output_root.display());
        Ok(())
    }

    /// Close the browser if one was launched.
    pub async fn shutdown(&self) {
        if let Some(renderer) = self.renderer.get() {
            renderer.shutdown().await;
        }
    }
}

fn print_record(url: &str, record: &ResultRecord) {
    let [title, status, screenshot, response] = record.columns();
    println!("{} {}", if record.success { "[+]" } else { "[x]" }, url);
    println!("  Title: {title}");
    println!("  Status: {status}");
    println!("  Screenshot: {screenshot}");
    println!("  Response:");
    for line in response.lines() {
        println!("    {line}");
    }
}

pub fn setup_logging(level: LogLevel) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::from(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "endpoint-snapshot",
            "--pool-size",
            "2",
            "--timeout",
            "12",
            "--log-level",
            "4",
            "--format",
            "jpeg",
            "batch",
            "-f",
            "targets.txt",
        ]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.pool_size, 2);
        assert_eq!(config.render_timeout, Duration::from_secs(12));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.image_format, ImageFormat::Jpeg);
        assert!(matches!(cli.command, Commands::Batch { ref input } if input == &PathBuf::from("targets.txt")));
    }

    #[test]
    fn global_flags_accepted_after_subcommand() {
        let cli = Cli::parse_from([
            "endpoint-snapshot",
            "single",
            "--url",
            "example.com",
            "--no-progress",
        ]);
        assert!(cli.no_progress);
        assert!(matches!(cli.command, Commands::Single { ref url } if url == "example.com"));
    }

    #[test]
    fn validate_requires_config_file() {
        let cli = Cli::parse_from(["endpoint-snapshot", "validate"]);
        let runner = CliRunner::new(Config::default(), &cli, Arc::new(PipelineMetrics::noop()));
        assert!(matches!(cli.command, Commands::Validate));
        assert!(matches!(
            runner.validate_config(),
            Err(SweepError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn config_file_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"pool_size": 9, "scheme_fallback": false}"#).unwrap();

        let cli = Cli::parse_from([
            "endpoint-snapshot",
            "validate",
            "--config",
            path.to_str().unwrap(),
            "--pool-size",
            "3",
        ]);
        let config = load_config(&cli).await.unwrap();
        assert_eq!(config.pool_size, 3);
        assert!(!config.scheme_fallback);

        let runner = CliRunner::new(config, &cli, Arc::new(PipelineMetrics::noop()));
        assert!(runner.validate_config().is_ok());
    }

    #[tokio::test]
    async fn zero_timeout_fails_validation() {
        let cli = Cli::parse_from(["endpoint-snapshot", "--timeout", "0", "batch", "-f", "x"]);
        let err = load_config(&cli).await.unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));
    }
}
