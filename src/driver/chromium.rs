//! chromiumoxide-backed driver.
//!
//! Page interaction goes through injected JavaScript wherever possible;
//! the only CDP-level call is the file attach, which cannot be done from
//! page script.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::driver::{Driver, DriverFactory, ElementHandle};
use crate::error::{AppError, AutomationError, Result};
use crate::selectors::{SelectorEntry, SelectorKind};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Launches one headless browser per job attempt.
pub struct ChromiumFactory {
    config: Arc<Config>,
}

impl ChromiumFactory {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    async fn create(&self) -> Result<Box<dyn Driver>> {
        let driver = ChromiumDriver::launch(&self.config).await?;
        Ok(Box::new(driver))
    }
}

/// One live chromiumoxide session (browser + page + event handler task).
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    locate_timeout: Duration,
    navigation_timeout: Duration,
}

impl ChromiumDriver {
    /// Launch a browser session per the configuration.
    pub async fn launch(config: &Config) -> Result<Self> {
        info!("🚀 launching browser session...");

        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .args(vec![
                "--disable-gpu",
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--remote-debugging-port=0",
            ]);
        if config.headless {
            builder = builder.new_headless_mode();
        } else {
            builder = builder.with_head();
        }
        if let Some(exe) = &config.chrome_executable {
            builder = builder.chrome_executable(exe.as_path());
        }
        let browser_config = builder.build().map_err(|e| {
            error!("browser configuration failed: {}", e);
            AppError::Automation(AutomationError::LaunchFailed {
                source: e.into(),
            })
        })?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            error!("browser launch failed: {}", e);
            AppError::Automation(AutomationError::LaunchFailed {
                source: Box::new(e),
            })
        })?;
        debug!("browser launched");

        // Drain browser events in the background
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // Short delay to let the browser state settle
        sleep(Duration::from_millis(300)).await;

        let page = browser.new_page("about:blank").await.map_err(|e| {
            error!("page creation failed: {}", e);
            AppError::Automation(AutomationError::LaunchFailed {
                source: Box::new(e),
            })
        })?;

        Ok(Self {
            browser,
            page,
            handler_task,
            locate_timeout: config.step_timeout(),
            navigation_timeout: config.navigation_timeout(),
        })
    }

    /// Execute JS and return its JSON result.
    async fn eval(&self, js_code: String) -> Result<JsonValue> {
        let result = self
            .page
            .evaluate(js_code)
            .await
            .map_err(|e| AppError::step_failed("eval", e))?;
        let value = result
            .into_value()
            .map_err(|e| AppError::step_failed("eval", e))?;
        Ok(value)
    }

    async fn exists(&self, entry: &SelectorEntry) -> Result<bool> {
        let js = format!("!!({})", element_expr(entry));
        let value = self.eval(js).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

/// Bound a driver step by a wall-clock limit; expiry becomes a
/// `StepTimeout` so the retry policy treats it like any failed attempt.
async fn with_deadline<T>(
    step: &'static str,
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AutomationError::StepTimeout {
            step,
            waited_ms: limit.as_millis() as u64,
        }
        .into()),
    }
}

/// JS expression resolving a catalog entry to an element or null.
fn element_expr(entry: &SelectorEntry) -> String {
    let quoted = serde_json::to_string(&entry.selector).unwrap_or_default();
    match entry.kind {
        SelectorKind::Css => format!("document.querySelector({})", quoted),
        SelectorKind::Xpath => format!(
            "document.evaluate({}, document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            quoted
        ),
    }
}

#[async_trait]
impl Driver for ChromiumDriver {
    async fn open(&mut self, url: &str) -> Result<()> {
        debug!("navigating to {}", url);
        with_deadline("navigate", self.navigation_timeout, async {
            self.page
                .goto(url)
                .await
                .map_err(|e| AppError::navigation_failed(url, e))?;
            Ok(())
        })
        .await?;
        info!("✓ page opened: {}", url);
        Ok(())
    }

    async fn locate(&mut self, entry: &SelectorEntry) -> Result<ElementHandle> {
        let deadline = Instant::now() + self.locate_timeout;
        loop {
            if self.exists(entry).await? {
                debug!("✓ located: {}", entry.selector);
                return Ok(ElementHandle {
                    entry: entry.clone(),
                });
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::ElementNotFound {
                    selector: entry.selector.clone(),
                }
                .into());
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&mut self, handle: &ElementHandle, value: &str) -> Result<()> {
        let js = format!(
            r#"
            (() => {{
                const el = {};
                if (!el) return false;
                el.value = {};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            element_expr(&handle.entry),
            serde_json::to_string(value)?
        );
        let result = self.eval(js).await?;
        if result.as_bool().unwrap_or(false) {
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound {
                selector: handle.entry.selector.clone(),
            }
            .into())
        }
    }

    async fn click(&mut self, handle: &ElementHandle) -> Result<()> {
        let js = format!(
            r#"
            (() => {{
                const el = {};
                if (!el) return false;
                el.click();
                return true;
            }})()
            "#,
            element_expr(&handle.entry)
        );
        let result = self.eval(js).await?;
        if result.as_bool().unwrap_or(false) {
            debug!("✓ clicked: {}", handle.entry.selector);
            Ok(())
        } else {
            Err(AutomationError::ElementNotFound {
                selector: handle.entry.selector.clone(),
            }
            .into())
        }
    }

    async fn select_option(&mut self, handle: &ElementHandle, preferred: &str) -> Result<()> {
        // Priority: exact value, then label (case-insensitive), then the
        // first enabled non-empty option.
        let js = format!(
            r#"
            (() => {{
                const el = {};
                if (!el) return {{ ok: false, reason: 'missing' }};
                const preferred = {};
                const options = Array.from(el.options).map(o => ({{
                    value: o.value ?? '',
                    label: (o.textContent || '').trim(),
                    disabled: !!o.disabled
                }}));
                let chosen = options.find(o => o.value === preferred);
                if (!chosen) {{
                    chosen = options.find(
                        o => o.label.toLowerCase() === preferred.toLowerCase());
                }}
                if (!chosen) {{
                    chosen = options.find(o => !o.disabled && o.value !== '');
                }}
                if (!chosen) return {{ ok: false, reason: 'no-valid-option' }};
                el.value = chosen.value;
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return {{ ok: true, value: chosen.value, label: chosen.label }};
            }})()
            "#,
            element_expr(&handle.entry),
            serde_json::to_string(preferred)?
        );
        let result = self.eval(js).await?;
        if result.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            info!(
                "✔️ option chosen: '{}' (value '{}')",
                result.get("label").and_then(|v| v.as_str()).unwrap_or(""),
                result.get("value").and_then(|v| v.as_str()).unwrap_or("")
            );
            Ok(())
        } else {
            warn!(
                "no selectable option in {} (wanted '{}')",
                handle.entry.selector, preferred
            );
            Err(AutomationError::ElementNotFound {
                selector: handle.entry.selector.clone(),
            }
            .into())
        }
    }

    async fn upload(&mut self, handle: &ElementHandle, file: &Path) -> Result<()> {
        if handle.entry.kind == SelectorKind::Xpath {
            return Err(AppError::Other(
                "file upload requires a CSS selector entry".to_string(),
            ));
        }
        let element = self
            .page
            .find_element(&handle.entry.selector)
            .await
            .map_err(|e| AppError::step_failed("upload", e))?;
        let params = SetFileInputFilesParams::builder()
            .file(file.to_string_lossy().to_string())
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(|e| AppError::Other(format!("upload params: {}", e)))?;
        self.page
            .execute(params)
            .await
            .map_err(|e| AppError::step_failed("upload", e))?;
        info!(
            "📎 file attached: {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        );
        Ok(())
    }

    async fn wait_for(&mut self, entry: &SelectorEntry, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.exists(entry).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                debug!("wait expired for {}", entry.selector);
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn capture(&mut self) -> Result<Vec<u8>> {
        let bytes = self
            .page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| AppError::step_failed("capture", e))?;
        debug!("📸 captured {} bytes", bytes.len());
        Ok(bytes)
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("browser close reported: {}", e);
        }
        self.handler_task.abort();
        debug!("session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deadline_expiry_maps_to_step_timeout() {
        let err = with_deadline::<()>(
            "navigate",
            Duration::from_millis(20),
            std::future::pending(),
        )
        .await
        .unwrap_err();
        match err {
            AppError::Automation(AutomationError::StepTimeout { step, waited_ms }) => {
                assert_eq!(step, "navigate");
                assert_eq!(waited_ms, 20);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn deadline_passes_through_a_prompt_result() {
        let value = with_deadline("navigate", Duration::from_secs(1), async { Ok(7u32) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
