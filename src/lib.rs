//! # Endpoint Snapshot
//!
//! Visits a list of network endpoints (URLs, bare IPs, domains, with or without
//! a port), captures a full-page screenshot of each one in headless Chrome,
//! probes its HTTP behaviour and writes CSV and HTML reports for the batch.
//!
//! ## Pipeline
//!
//! | Stage | Module | Notes |
//! |-------|--------|-------|
//! | Classify input lines | [`classifier`] | IPv4, IPv4:port, domain, domain:port get `https://` |
//! | Dispatch | [`worker`] | `min(pool_size, tasks)` workers on one shared queue |
//! | Capture | [`capture`] | attempt, retry, `http://` fallback, retry; at most 4 renders |
//! | Probe | [`prober`] | one GET, one retry, status line + headers + body preview |
//! | Aggregate | [`aggregator`] | URL-keyed result set under a single lock |
//! | Report | [`report`] | `result_<date><NNNN>.csv` / `.html` |
//!
//! Per-endpoint failures never abort a batch. Only an unreadable or empty input,
//! an input with no usable endpoints, or a failed report write end the run with
//! an error.
//!
//! ## Quick Start
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
//!     let report = service.run_lines(["example.com", "10.0.0.1:8080"]).await?;
//!     println!("Report: {}", report.layout.html_report_path().display());
//!
//!     renderer.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! endpoint-snapshot batch -f targets.txt --pool-size 8
//! endpoint-snapshot single --url https://example.com
//! endpoint-snapshot validate --config snapshot.json
//! ```

/// Configuration for a snapshot run
pub mod config;

/// Error taxonomy and error types
pub mod error;

/// Input line classification into endpoint tasks
pub mod classifier;

/// HTTP probing of captured endpoints
pub mod prober;

/// Headless browser rendering
pub mod renderer;

/// Run directory layout and screenshot persistence
pub mod storage;

/// Per-endpoint capture with retry and scheme fallback
pub mod capture;

/// Worker pool draining the task queue
pub mod worker;

/// Outcome aggregation into the result set
pub mod aggregator;

/// Progress sinks
pub mod progress;

/// CSV and HTML report emission
pub mod report;

/// Batch pipeline wiring
pub mod service;

/// Command-line interface implementation
pub mod cli;

/// Pipeline metrics and the Prometheus exporter
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use self::metrics::*;
pub use aggregator::*;
pub use capture::*;
pub use classifier::*;
pub use cli::*;
pub use config::*;
pub use error::*;
pub use prober::*;
pub use progress::*;
pub use renderer::*;
pub use report::*;
pub use service::*;
pub use storage::*;
pub use utils::*;
pub use worker::*;
