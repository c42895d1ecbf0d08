//! Per-endpoint capture: render with retry and scheme fallback, persist the
//! image, then probe the URL that rendered.

use crate::renderer::DEFAULT_TITLE;
use crate::{
    Config, EndpointTask, ErrorKind, PipelineMetrics, Probe, RenderError, Renderer, RunLayout,
    Viewport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Screenshot reference recorded when nothing was captured.
pub const SCREENSHOT_NONE: &str = "none";

/// Normalized result of one endpoint.
///
/// `success` implies a real `screenshot_ref`; a failure always carries a
/// non-empty `error_detail`. Use the constructors to keep that true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Endpoint URL as classified from the input (the result key).
    pub url: String,
    pub success: bool,
    pub title: String,
    /// Numeric HTTP status or a taxonomy value such as `TIMEOUT`.
    pub status_code: String,
    pub screenshot_ref: String,
    pub response_summary: String,
    pub error_detail: String,
    /// URL that actually rendered; differs from `url` after scheme fallback.
    pub final_url: String,
    pub render_attempts: u32,
    pub probe_attempts: u32,
}

impl CaptureOutcome {
    pub fn failed(
        url: impl Into<String>,
        kind: ErrorKind,
        detail: impl Into<String>,
        render_attempts: u32,
    ) -> Self {
        let url = url.into();
        let mut detail = detail.into();
        if detail.is_empty() {
            detail = kind.describe().to_string();
        }
        Self {
            final_url: url.clone(),
            url,
            success: false,
            title: DEFAULT_TITLE.to_string(),
            status_code: kind.as_str().to_string(),
            screenshot_ref: SCREENSHOT_NONE.to_string(),
            response_summary: detail.clone(),
            error_detail: detail,
            render_attempts,
            probe_attempts: 0,
        }
    }
}

/// Steps of the render sequence for one endpoint.
///
/// `Attempt -> Retry -> Fallback -> FallbackRetry`, where the fallback pair only
/// exists for `https://` URLs. Every path ends after at most four renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStage {
    Attempt,
    Retry,
    Fallback,
    FallbackRetry,
}

impl CaptureStage {
    pub fn next(self, fallback_allowed: bool) -> Option<CaptureStage> {
        match self {
            CaptureStage::Attempt => Some(CaptureStage::Retry),
            CaptureStage::Retry if fallback_allowed => Some(CaptureStage::Fallback),
            CaptureStage::Retry => None,
            CaptureStage::Fallback => Some(CaptureStage::FallbackRetry),
            CaptureStage::FallbackRetry => None,
        }
    }

    /// Whether this stage repeats the previous stage's URL after a backoff.
    pub fn is_retry(self) -> bool {
        matches!(self, CaptureStage::Retry | CaptureStage::FallbackRetry)
    }

    pub fn uses_fallback_scheme(self) -> bool {
        matches!(self, CaptureStage::Fallback | CaptureStage::FallbackRetry)
    }
}

/// The `http://` twin of an `https://` URL, if there is one.
pub fn fallback_url(url: &str) -> Option<String> {
    url.strip_prefix("https://")
        .map(|rest| format!("http://{rest}"))
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub render_timeout: Duration,
    pub retry_delay: Duration,
    pub viewport: Viewport,
    pub scheme_fallback: bool,
}

impl From<&Config> for CaptureSettings {
    fn from(config: &Config) -> Self {
        Self {
            render_timeout: config.render_timeout,
            retry_delay: config.capture_retry_delay,
            viewport: config.viewport,
            scheme_fallback: config.scheme_fallback,
        }
    }
}

pub struct CaptureOrchestrator {
    renderer: Arc<dyn Renderer>,
    prober: Arc<dyn Probe>,
    layout: Arc<RunLayout>,
    settings: CaptureSettings,
    metrics: Arc<PipelineMetrics>,
}

impl CaptureOrchestrator {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        prober: Arc<dyn Probe>,
        layout: Arc<RunLayout>,
        settings: CaptureSettings,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            renderer,
            prober,
            layout,
            settings,
            metrics,
        }
    }

    pub async fn capture(&self, task: &EndpointTask) -> CaptureOutcome {
        let started = Instant::now();
        let outcome = self.run_stages(task).await;
        self.metrics
            .record_outcome(started.elapsed(), outcome.success);
        outcome
    }

    async fn run_stages(&self, task: &EndpointTask) -> CaptureOutcome {
        let fallback = if self.settings.scheme_fallback {
            fallback_url(&task.url)
        } else {
            None
        };

        let mut stage = Some(CaptureStage::Attempt);
        let mut attempts: u32 = 0;
        let mut last_error: Option<RenderError> = None;

        while let Some(current) = stage {
            let target = match (current.uses_fallback_scheme(), &fallback) {
                (true, Some(http_url)) => http_url.as_str(),
                _ => task.url.as_str(),
            };

            if current == CaptureStage::Fallback {
                info!(url = %task.url, fallback = %target, "HTTPS capture failed, trying HTTP");
                self.metrics.scheme_fallbacks.increment(1);
            }
            if current.is_retry() {
                sleep(self.settings.retry_delay).await;
            }

            attempts += 1;
            self.metrics.render_attempts.increment(1);

            match self
                .renderer
                .render(target, self.settings.render_timeout, self.settings.viewport)
                .await
            {
                Ok(page) => {
                    if current.is_retry() {
                        info!(url = %target, "retry succeeded");
                    }
                    return self.finish(task, target, page, attempts).await;
                }
                Err(e) => {
                    self.metrics.render_failures.increment(1);
                    warn!(
                        url = %target,
                        stage = ?current,
                        kind = %e.kind(),
                        "render attempt failed: {}",
                        e
                    );
                    last_error = Some(e);
                    stage = current.next(fallback.is_some());
                }
            }
        }

        let (kind, detail) = match &last_error {
            Some(e) => (
                e.kind(),
                format!("capture failed after {attempts} attempts: {e}"),
            ),
            None => (ErrorKind::Error, "capture failed".to_string()),
        };
        CaptureOutcome::failed(&task.url, kind, detail, attempts)
    }

    async fn finish(
        &self,
        task: &EndpointTask,
        rendered_url: &str,
        page: crate::RenderedPage,
        attempts: u32,
    ) -> CaptureOutcome {
        let screenshot_ref = self.layout.screenshot_ref(rendered_url);
        if let Err(e) = self.layout.write_image(&screenshot_ref, &page.image).await {
            warn!(url = %rendered_url, "failed to save screenshot: {}", e);
            return CaptureOutcome::failed(
                &task.url,
                ErrorKind::Error,
                format!("failed to save screenshot: {e}"),
                attempts,
            );
        }

        let report = self.prober.probe(rendered_url).await;
        self.metrics.record_probe(report.attempts);

        let error_detail = if report.status.is_success() {
            String::new()
        } else {
            report.summary.clone()
        };

        debug!(
            url = %task.url,
            title = %page.title,
            status = %report.status,
            "endpoint processed"
        );

        CaptureOutcome {
            url: task.url.clone(),
            success: true,
            title: page.title,
            status_code: report.status_code(),
            screenshot_ref,
            response_summary: report.summary,
            error_detail,
            final_url: rendered_url.to_string(),
            render_attempts: attempts,
            probe_attempts: report.attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_sequence_with_fallback() {
        let mut stages = vec![CaptureStage::Attempt];
        while let Some(next) = stages.last().and_then(|s| s.next(true)) {
            stages.push(next);
        }
        assert_eq!(
            stages,
            vec![
                CaptureStage::Attempt,
                CaptureStage::Retry,
                CaptureStage::Fallback,
                CaptureStage::FallbackRetry
            ]
        );
    }

    #[test]
    fn stage_sequence_without_fallback() {
        assert_eq!(CaptureStage::Attempt.next(false), Some(CaptureStage::Retry));
        assert_eq!(CaptureStage::Retry.next(false), None);
    }

    #[test]
    fn fallback_only_for_https() {
        assert_eq!(
            fallback_url("https://example.com:8443/x").as_deref(),
            Some("http://example.com:8443/x")
        );
        assert_eq!(fallback_url("http://example.com"), None);
    }

    #[test]
    fn failed_outcome_upholds_invariants() {
        let outcome = CaptureOutcome::failed("https://x.io", ErrorKind::DnsError, "", 4);
        assert!(!outcome.success);
        assert_eq!(outcome.screenshot_ref, SCREENSHOT_NONE);
        assert_eq!(outcome.status_code, "DNS_ERROR");
        assert!(!outcome.error_detail.is_empty());
        assert_eq!(outcome.title, DEFAULT_TITLE);
    }
}
