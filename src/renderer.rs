//! Rendering collaborator: loads a page in headless Chrome and captures it.
//!
//! The capture stage only sees the [`Renderer`] trait. [`ChromeRenderer`] is
//! the chromiumoxide implementation, sharing one browser process between all
//! workers and opening a fresh page per attempt.

use crate::{create_browser_config, Config, RenderError, SweepError, Viewport};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, error, info};

/// Title recorded when the document has none.
pub const DEFAULT_TITLE: &str = "No Title";

const TITLE_SCRIPT: &str = "document.title || 'No Title'";

const BODY_VISIBLE_SCRIPT: &str = "(() => { const b = document.body; \
    if (!b) return false; \
    const s = getComputedStyle(b); \
    return s.display !== 'none' && s.visibility !== 'hidden' && b.getClientRects().length > 0; })()";

const BODY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on closing a page once its attempt is over.
const PAGE_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Run `check` every `interval` until it reports true.
///
/// Never gives up on its own; callers bound it with a deadline.
pub(crate) async fn poll_until<F, Fut>(interval: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    while !check().await {
        sleep(interval).await;
    }
}

/// Drive `fut` on its own task for at most `limit`.
///
/// The handle resolves to `false` when the limit was hit.
pub(crate) fn detach_with_timeout<F>(limit: Duration, fut: F) -> tokio::task::JoinHandle<bool>
where
    F: Future + Send + 'static,
{
    tokio::spawn(async move { timeout(limit, fut).await.is_ok() })
}

/// Output of one successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub title: String,
    /// PNG bytes of the full page.
    pub image: Vec<u8>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url`, let it settle, and capture it, all within `timeout`.
    async fn render(
        &self,
        url: &str,
        timeout: Duration,
        viewport: Viewport,
    ) -> Result<RenderedPage, RenderError>;
}

pub struct ChromeRenderer {
    browser: Mutex<Browser>,
    handler: tokio::task::JoinHandle<()>,
    settle_delay: Duration,
    is_shutting_down: AtomicBool,
}

impl ChromeRenderer {
    pub async fn launch(config: &Config) -> Result<Self, SweepError> {
        let browser_config = create_browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SweepError::BrowserLaunchFailed(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the
        // browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
            info!("Browser handler stream ended");
        });

        info!("Browser launched");

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
            settle_delay: config.settle_delay,
            is_shutting_down: AtomicBool::new(false),
        })
    }

    async fn open_page(&self) -> Result<Page, RenderError> {
        if self.is_shutting_down.load(Ordering::Relaxed) || self.handler.is_finished() {
            return Err(RenderError::BrowserUnavailable);
        }
        let browser = self.browser.lock().await;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Page(e.to_string()))
    }

    async fn capture(
        &self,
        page: &Page,
        url: &str,
        viewport: Viewport,
    ) -> Result<RenderedPage, RenderError> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width)
            .height(viewport.height)
            .device_scale_factor(viewport.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(RenderError::Page)?;
        page.execute(metrics)
            .await
            .map_err(|e| RenderError::Page(e.to_string()))?;

        page.goto(url)
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;

        sleep(self.settle_delay).await;

        poll_until(BODY_POLL_INTERVAL, move || async move {
            match page.evaluate(BODY_VISIBLE_SCRIPT).await {
                Ok(result) => result.into_value::<bool>().unwrap_or(false),
                Err(e) => {
                    debug!(url, "body visibility check failed: {}", e);
                    false
                }
            }
        })
        .await;

        let title = match page.evaluate(TITLE_SCRIPT).await {
            Ok(result) => result
                .into_value::<String>()
                .unwrap_or_else(|_| DEFAULT_TITLE.to_string()),
            Err(e) => {
                debug!(url, "title evaluation failed: {}", e);
                DEFAULT_TITLE.to_string()
            }
        };

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        let image = page
            .screenshot(params)
            .await
            .map_err(|e| RenderError::Capture(e.to_string()))?;

        Ok(RenderedPage { title, image })
    }

    pub async fn shutdown(&self) {
        if self.is_shutting_down.swap(true, Ordering::Relaxed) {
            return;
        }
        info!("Shutting down browser...");
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            error!("Failed to close browser: {}", e);
        }
        let _ = browser.wait().await;
        self.handler.abort();
        info!("Browser shutdown complete");
    }
}

#[async_trait]
impl Renderer for ChromeRenderer {
    async fn render(
        &self,
        url: &str,
        budget: Duration,
        viewport: Viewport,
    ) -> Result<RenderedPage, RenderError> {
        // One deadline covers opening the page and the capture itself.
        let deadline = Instant::now() + budget;

        let page = timeout_at(deadline, self.open_page())
            .await
            .map_err(|_| RenderError::Timeout(budget))??;

        let result = match timeout_at(deadline, self.capture(&page, url, viewport)).await {
            Ok(result) => result,
            Err(_) => Err(RenderError::Timeout(budget)),
        };

        // Closing talks to the same browser that may have wedged the attempt.
        detach_with_timeout(PAGE_CLOSE_TIMEOUT, async move {
            if let Err(e) = page.close().await {
                debug!("page close failed: {}", e);
            }
        });
        result
    }
}
