use metrics::{register_counter, register_histogram, Counter, Histogram};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::info;

/// Pipeline counters, registered against whatever recorder is installed.
///
/// Without a recorder every handle is a no-op, so library users pay nothing.
pub struct PipelineMetrics {
    pub render_attempts: Counter,
    pub render_failures: Counter,
    pub scheme_fallbacks: Counter,
    pub probe_requests: Counter,
    pub probe_retries: Counter,
    pub outcomes_succeeded: Counter,
    pub outcomes_failed: Counter,
    pub capture_duration: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            render_attempts: register_counter!("endpoint_snapshot_render_attempts_total"),
            render_failures: register_counter!("endpoint_snapshot_render_failures_total"),
            scheme_fallbacks: register_counter!("endpoint_snapshot_scheme_fallbacks_total"),
            probe_requests: register_counter!("endpoint_snapshot_probe_requests_total"),
            probe_retries: register_counter!("endpoint_snapshot_probe_retries_total"),
            outcomes_succeeded: register_counter!("endpoint_snapshot_outcomes_succeeded_total"),
            outcomes_failed: register_counter!("endpoint_snapshot_outcomes_failed_total"),
            capture_duration: register_histogram!("endpoint_snapshot_capture_duration_seconds"),
        }
    }

    pub fn noop() -> Self {
        Self {
            render_attempts: Counter::noop(),
            render_failures: Counter::noop(),
            scheme_fallbacks: Counter::noop(),
            probe_requests: Counter::noop(),
            probe_retries: Counter::noop(),
            outcomes_succeeded: Counter::noop(),
            outcomes_failed: Counter::noop(),
            capture_duration: Histogram::noop(),
        }
    }

    pub fn record_outcome(&self, duration: Duration, success: bool) {
        if success {
            self.outcomes_succeeded.increment(1);
        } else {
            self.outcomes_failed.increment(1);
        }

        self.capture_duration.record(duration.as_secs_f64());
    }

    pub fn record_probe(&self, attempts: u32) {
        self.probe_requests.increment(u64::from(attempts));
        if attempts > 1 {
            self.probe_retries.increment(1);
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from inside a tokio runtime and before [`PipelineMetrics::new`],
/// otherwise the handles register against the no-op recorder.
pub fn install_prometheus_exporter(port: u16) -> Result<(), crate::SweepError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| crate::SweepError::Configuration(format!("metrics exporter: {e}")))?;

    info!("Serving Prometheus metrics on {}", addr);
    Ok(())
}
