//! Session bootstrap: launch a configured browser and inject cookies.

use std::sync::Arc;
use std::time::Duration;

use super::{BrowserOptions, BrowserSession, SessionBuildError, SessionLauncher};
use crate::events::EventBus;
use crate::models::CookieEntry;

/// Builds sessions for the crawl worker and prepares them with cookies.
#[derive(Clone)]
pub struct SessionBootstrapper {
    launcher: Arc<dyn SessionLauncher>,
    events: EventBus,
    /// Pause after landing on the site and after the reload.
    settle_delay: Duration,
}

impl SessionBootstrapper {
    pub fn new(launcher: Arc<dyn SessionLauncher>, events: EventBus) -> Self {
        Self {
            launcher,
            events,
            settle_delay: Duration::from_secs(1),
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Launch a browser session. Failure is fatal for the run.
    pub async fn build(
        &self,
        options: &BrowserOptions,
    ) -> Result<Arc<dyn BrowserSession>, SessionBuildError> {
        self.events
            .info(format!("Building browser (headless={})", options.headless));
        self.launcher.launch(options).await
    }

    /// Inject cookies into `session`, scoped to `base_url`.
    ///
    /// Browsers only accept cookies for the page currently loaded, so this
    /// lands on `base_url` first and reloads it afterwards so the cookies
    /// take effect. Bad or rejected cookies are skipped with a warning.
    /// Returns how many cookies were applied.
    pub async fn inject_cookies(
        &self,
        session: &dyn BrowserSession,
        cookies: &[CookieEntry],
        base_url: &str,
    ) -> usize {
        if cookies.is_empty() {
            return 0;
        }

        if let Err(e) = session.navigate(base_url).await {
            self.events
                .warn(format!("Could not open {} to set cookies: {}", base_url, e));
            return 0;
        }
        tokio::time::sleep(self.settle_delay).await;

        let mut applied = 0;
        for (index, cookie) in cookies.iter().enumerate() {
            if let Err(e) = cookie.validate() {
                self.events
                    .warn(format!("Skipping cookie #{}: {}", index + 1, e));
                continue;
            }
            match session.set_cookie(cookie).await {
                Ok(()) => applied += 1,
                Err(e) => self
                    .events
                    .warn(format!("Skipping cookie '{}': {}", cookie.name, e)),
            }
        }

        if let Err(e) = session.navigate(base_url).await {
            self.events
                .warn(format!("Reload after setting cookies failed: {}", e));
        }
        tokio::time::sleep(self.settle_delay).await;

        applied
    }
}
