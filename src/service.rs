//! Batch pipeline: input file to classified tasks, through the worker pool,
//! into reports.
//!
//! # Examples
//!
//! ```rust,no_run
//! use endpoint_snapshot::{ChromeRenderer, Config, HttpProber, SnapshotService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let renderer = Arc::new(ChromeRenderer::launch(&config).await?);
//!     let prober = Arc::new(HttpProber::new(&config)?);
//!
//!     let service = SnapshotService::new(config, renderer.clone(), prober);
//!     let report = service.run_file("targets.txt".as_ref()).await?;
//!     println!("{} endpoints captured", report.results.counters.succeeded);
//!
//!     renderer.shutdown().await;
//!     Ok(())
//! }
//! ```

use crate::{
    classify_lines, generate_reports, BatchResults, CaptureOrchestrator, CaptureSettings, Config,
    EndpointTask, NoopProgress, PipelineMetrics, Probe, ProgressSink, Renderer, ResultAggregator,
    RunLayout, SweepError, WorkerPool,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What a finished batch produced.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub layout: RunLayout,
    pub results: BatchResults,
    pub elapsed: Duration,
}

pub struct SnapshotService {
    config: Config,
    renderer: Arc<dyn Renderer>,
    prober: Arc<dyn Probe>,
    metrics: Arc<PipelineMetrics>,
    progress: Arc<dyn ProgressSink>,
}

impl SnapshotService {
    pub fn new(config: Config, renderer: Arc<dyn Renderer>, prober: Arc<dyn Probe>) -> Self {
        Self {
            config,
            renderer,
            prober,
            metrics: Arc::new(PipelineMetrics::noop()),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read `path`, classify its lines and run the batch.
    pub async fn run_file(&self, path: &Path) -> Result<BatchReport, SweepError> {
        let content = read_endpoint_file(path).await?;
        self.run_lines(content.lines()).await
    }

    pub async fn run_lines<'a, I>(&self, lines: I) -> Result<BatchReport, SweepError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let tasks = classify_lines(lines);
        if tasks.is_empty() {
            return Err(SweepError::NoEndpoints);
        }
        self.run_tasks(tasks).await
    }

    /// Run already classified tasks. Only directory setup and report writing
    /// can fail; per-endpoint failures end up in the results.
    pub async fn run_tasks(&self, tasks: Vec<EndpointTask>) -> Result<BatchReport, SweepError> {
        let started = Instant::now();
        let total = tasks.len();

        let layout = RunLayout::for_today(&self.config.output_root, self.config.image_format);
        layout.prepare().await?;
        info!(
            batch = layout.batch_name(),
            endpoints = total,
            "Starting batch in {}",
            layout.batch_dir().display()
        );

        let orchestrator = Arc::new(CaptureOrchestrator::new(
            self.renderer.clone(),
            self.prober.clone(),
            Arc::new(layout.clone()),
            CaptureSettings::from(&self.config),
            self.metrics.clone(),
        ));
        let pool = WorkerPool::new(orchestrator, self.config.pool_size);
        let aggregator = ResultAggregator::new(self.progress.clone());

        let results = pool.run(tasks, &aggregator).await;
        if results.results.len() < results.counters.processed {
            warn!(
                "{} duplicate endpoint outcomes replaced by later ones",
                results.counters.processed - results.results.len()
            );
        }

        generate_reports(&layout, &results.results).await?;

        let elapsed = started.elapsed();
        info!(
            "Batch {} finished in {}: {} succeeded, {} failed",
            layout.batch_name(),
            crate::format_duration(elapsed),
            results.counters.succeeded,
            results.counters.failed()
        );

        Ok(BatchReport {
            layout,
            results,
            elapsed,
        })
    }
}

pub async fn read_endpoint_file(path: &Path) -> Result<String, SweepError> {
    if path.as_os_str().is_empty() {
        return Err(SweepError::EmptyInputPath);
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SweepError::InputUnreadable {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_path_is_rejected() {
        let err = read_endpoint_file(Path::new("")).await.unwrap_err();
        assert!(matches!(err, SweepError::EmptyInputPath));
    }

    #[tokio::test]
    async fn missing_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_endpoint_file(&dir.path().join("nope.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::InputUnreadable { .. }));
    }
}
