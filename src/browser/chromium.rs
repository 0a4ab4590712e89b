//! Chromium binding over CDP via chromiumoxide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{
    BrowserError, BrowserOptions, BrowserSession, FeedElement, SessionBuildError, SessionLauncher,
};
use crate::models::CookieEntry;

/// Poll interval for page-level queries while the implicit wait runs.
const IMPLICIT_POLL: Duration = Duration::from_millis(250);

/// Launch flags: no automation banner or blink automation flag, no
/// notification or password prompts, quiet logging, fixed window.
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-notifications",
    "--disable-save-password-bubble",
    "--password-store=basic",
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-infobars",
    "--disable-extensions",
    "--disable-features=site-per-process,TranslateUI",
    "--mute-audio",
    "--log-level=3",
    "--no-first-run",
    "--no-default-browser-check",
];

impl From<CdpError> for BrowserError {
    fn from(e: CdpError) -> Self {
        BrowserError::Protocol(e.to_string())
    }
}

/// Launches a local Chromium process per session.
pub struct ChromiumLauncher;

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        options: &BrowserOptions,
    ) -> Result<Arc<dyn BrowserSession>, SessionBuildError> {
        let mut builder = BrowserConfig::builder()
            .disable_default_args()
            .no_sandbox()
            .window_size(1400, 900)
            .args(LAUNCH_ARGS.iter().copied());

        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(ref ua) = options.user_agent {
            builder = builder.arg(format!("--user-agent={}", ua));
        }
        if let Some(ref path) = options.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(SessionBuildError::Config)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionBuildError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    trace!("Browser handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SessionBuildError::Launch(format!("failed to open tab: {}", e)))?;

        debug!(headless = options.headless, "Chromium session ready");

        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(Some(browser)),
            page,
            implicit_wait: options.implicit_wait,
            closed: AtomicBool::new(false),
            handler_task: std::sync::Mutex::new(Some(handler_task)),
        }))
    }
}

/// One Chromium process with a single tab.
pub struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    page: Page,
    implicit_wait: Duration,
    closed: AtomicBool,
    handler_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumSession {
    fn ensure_open(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }
}

fn wrap(elements: Vec<Element>) -> Vec<Box<dyn FeedElement>> {
    elements
        .into_iter()
        .map(|e| Box::new(ChromiumElement(e)) as Box<dyn FeedElement>)
        .collect()
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.ensure_open()?;
        self.page.goto(url).await?;
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn FeedElement>>, BrowserError> {
        let deadline = tokio::time::Instant::now() + self.implicit_wait;
        loop {
            self.ensure_open()?;
            let found = self.page.find_elements(selector).await?;
            if !found.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(wrap(found));
            }
            tokio::time::sleep(IMPLICIT_POLL).await;
        }
    }

    async fn run_script(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn set_cookie(&self, cookie: &CookieEntry) -> Result<(), BrowserError> {
        self.ensure_open()?;
        let mut builder = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone())
            .path(cookie.path.clone());

        // CDP needs either a domain or a URL to scope the cookie
        builder = match cookie.domain {
            Some(ref domain) => builder.domain(domain.clone()),
            None => match self.page.url().await? {
                Some(url) => builder.url(url),
                None => return Err(BrowserError::CookieRejected(cookie.name.clone())),
            },
        };
        if let Some(expiry) = cookie.expiry {
            builder = builder.expires(TimeSinceEpoch::new(expiry as f64));
        }

        let param = builder.build().map_err(BrowserError::CookieRejected)?;
        self.page.set_cookie(param).await?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieEntry>, BrowserError> {
        self.ensure_open()?;
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| CookieEntry {
                name: c.name,
                value: c.value,
                domain: Some(c.domain),
                path: c.path,
                expiry: (c.expires > 0.0).then(|| c.expires as i64),
            })
            .collect())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close failed, killing process: {}", e);
                let _ = browser.kill().await;
            }
            let _ = browser.wait().await;
        }
        let task = self
            .handler_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        debug!("Chromium session closed");
    }
}

struct ChromiumElement(Element);

#[async_trait]
impl FeedElement for ChromiumElement {
    async fn text(&self) -> Result<String, BrowserError> {
        Ok(self.0.inner_text().await?.unwrap_or_default())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        Ok(self.0.attribute(name).await?)
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn FeedElement>>, BrowserError> {
        Ok(wrap(self.0.find_elements(selector).await?))
    }
}
