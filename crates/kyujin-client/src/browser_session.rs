use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::element::Element;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use kyujin_core::error::AppError;
use kyujin_core::source::ControlStrategy;
use kyujin_core::traits::{BrowserSession, PageControl, SessionLauncher};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const DEFAULT_NAV_TIMEOUT_SECS: u64 = 30;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Chromium launch settings.
#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub headless: bool,
    /// Bound on navigation and readiness waits.
    pub nav_timeout: Duration,
    /// Explicit browser binary; otherwise well-known install paths are probed.
    pub chrome_bin: Option<PathBuf>,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            nav_timeout: Duration::from_secs(DEFAULT_NAV_TIMEOUT_SECS),
            chrome_bin: None,
        }
    }
}

impl ChromeConfig {
    /// Reads `KYUJIN_HEADLESS`, `KYUJIN_NAV_TIMEOUT_SECS` and `CHROME_BIN`.
    pub fn from_env() -> Result<Self, AppError> {
        let headless = match std::env::var("KYUJIN_HEADLESS") {
            Ok(v) => parse_bool(&v).ok_or_else(|| {
                AppError::ConfigError(format!("KYUJIN_HEADLESS must be true or false, got {v:?}"))
            })?,
            Err(_) => true,
        };

        let nav_timeout_secs = match std::env::var("KYUJIN_NAV_TIMEOUT_SECS") {
            Ok(v) => v.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                AppError::ConfigError(format!(
                    "KYUJIN_NAV_TIMEOUT_SECS must be a positive integer, got {v:?}"
                ))
            })?,
            Err(_) => DEFAULT_NAV_TIMEOUT_SECS,
        };

        let chrome_bin = std::env::var("CHROME_BIN")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            headless,
            nav_timeout: Duration::from_secs(nav_timeout_secs),
            chrome_bin,
        })
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// The snap wrapper at `/snap/bin/chromium` strips unknown flags, so the
    /// binary inside the snap is preferred. `None` lets `chromiumoxide` search.
    fn find_chrome_binary(&self) -> Option<PathBuf> {
        if let Some(path) = self.chrome_bin.as_ref().filter(|p| p.exists()) {
            return Some(path.clone());
        }

        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];
        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Launches one Chromium process per crawl run.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: ChromeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(self.config.nav_timeout);

        if let Some(bin) = self.config.find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        builder = if self.config.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };

        builder
            .window_size(1920, 1080)
            .arg("--window-size=1920,1080")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={USER_AGENT}"))
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))
    }
}

impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession, AppError> {
        let config = self.browser_config()?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(AppError::BrowserError(format!("Failed to open tab: {e}")));
            }
        };

        tracing::debug!(headless = self.config.headless, "Browser session opened");
        Ok(ChromeSession {
            browser: Mutex::new(Some(browser)),
            page,
            handler,
            timeout: self.config.nav_timeout,
        })
    }
}

/// A located element plus whether it accepts interaction.
pub struct ChromeControl {
    element: Element,
    enabled: bool,
}

impl PageControl for ChromeControl {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// One Chromium process driven through a single tab.
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    timeout: Duration,
}

impl ChromeSession {
    async fn bounded<T, F>(&self, what: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, chromiumoxide::error::CdpError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AppError::BrowserError(format!("{what}: {e}"))),
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }

    async fn ready_state(&self) -> Option<String> {
        match self.page.evaluate("document.readyState").await {
            Ok(result) => result.into_value::<String>().ok(),
            Err(e) => {
                tracing::debug!(error = %e, "readyState check failed, retrying");
                None
            }
        }
    }
}

impl BrowserSession for ChromeSession {
    type Control = ChromeControl;

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        tracing::debug!(%url, "Navigating");
        self.bounded(&format!("Failed to navigate to {url}"), async {
            self.page.goto(url).await.map(|_| ())
        })
        .await
    }

    async fn apply_constraint(&self, selector_id: &str, value: &str) -> Result<(), AppError> {
        let script = format!(
            r#"(() => {{
                const el = document.getElementById({id});
                if (!el) return false;
                el.value = {value};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return el.value === {value};
            }})()"#,
            id = serde_json::to_string(selector_id)?,
            value = serde_json::to_string(value)?,
        );

        let applied = self
            .bounded("Failed to apply search constraint", async {
                self.page.evaluate(script.as_str()).await
            })
            .await?
            .into_value::<bool>()
            .map_err(|e| AppError::BrowserError(format!("Unexpected constraint result: {e}")))?;

        if applied {
            Ok(())
        } else {
            Err(AppError::BrowserError(format!(
                "Element #{selector_id} missing or rejected value {value:?}"
            )))
        }
    }

    async fn wait_until_ready(&self) -> Result<(), AppError> {
        let wait = async {
            loop {
                if self.ready_state().await.as_deref() == Some("complete") {
                    return;
                }
                tokio::time::sleep(READY_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(self.timeout, wait)
            .await
            .map_err(|_| AppError::Timeout(self.timeout.as_secs()))
    }

    async fn current_markup(&self) -> Result<String, AppError> {
        self.bounded("Failed to read page content", async {
            self.page.content().await
        })
        .await
    }

    async fn find_control(
        &self,
        strategy: &ControlStrategy,
    ) -> Result<Option<ChromeControl>, AppError> {
        let found = match strategy {
            ControlStrategy::Css(selector) => self.page.find_element(*selector).await,
            ControlStrategy::XPath(xpath) => self.page.find_xpath(*xpath).await,
        };
        let element = match found {
            Ok(element) => element,
            Err(e) => {
                tracing::debug!(%strategy, error = %e, "Control not found");
                return Ok(None);
            }
        };

        let disabled = element
            .attribute("disabled")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to inspect control: {e}")))?
            .is_some();
        let aria_disabled = element
            .attribute("aria-disabled")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to inspect control: {e}")))?
            .is_some_and(|v| v == "true");

        Ok(Some(ChromeControl {
            element,
            enabled: !disabled && !aria_disabled,
        }))
    }

    async fn trigger_navigation(&self, control: ChromeControl) -> Result<(), AppError> {
        control
            .element
            .scroll_into_view()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to scroll to control: {e}")))?;
        control
            .element
            .click()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to click control: {e}")))?;

        // Script-driven pagination may never fire a navigation event; readiness
        // is checked by the caller afterwards.
        match self
            .bounded("Navigation after click failed", async {
                self.page.wait_for_navigation().await.map(|_| ())
            })
            .await
        {
            Err(AppError::Timeout(secs)) => {
                tracing::debug!(secs, "No navigation event after click");
                Ok(())
            }
            other => other,
        }
    }

    async fn close(&self) {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return;
        };
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Failed to close browser cleanly");
        }
        if let Err(e) = browser.wait().await {
            tracing::warn!(error = %e, "Failed to reap browser process");
        }
        self.handler.abort();
        tracing::debug!("Browser session closed");
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
