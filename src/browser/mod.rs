//! Browser automation capability consumed by the crawler.
//!
//! The crawler only ever talks to a [`BrowserSession`]. The production
//! implementation drives Chromium over CDP (feature `browser`); tests use a
//! scripted in-memory session that implements the same traits.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::CookieEntry;

pub mod bootstrap;
#[cfg(feature = "browser")]
mod chromium;

pub use bootstrap::SessionBootstrapper;
#[cfg(feature = "browser")]
pub use chromium::{ChromiumLauncher, ChromiumSession};

/// Errors raised by browser calls.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser session is closed")]
    Closed,
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("cookie rejected: {0}")]
    CookieRejected(String),
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// Errors raised while launching a session. Always fatal for a run.
#[derive(Debug, Error)]
pub enum SessionBuildError {
    #[error("invalid browser configuration: {0}")]
    Config(String),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser support was not compiled in (enable the `browser` feature)")]
    Unsupported,
}

/// Launch options for a browser session.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserOptions {
    pub headless: bool,
    pub user_agent: Option<String>,
    /// How long page-level element queries keep polling for a first match.
    pub implicit_wait: Duration,
    /// Explicit Chrome/Chromium binary; auto-detected when `None`.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            implicit_wait: Duration::from_secs(5),
            chrome_executable: None,
        }
    }
}

/// A DOM element handle.
#[async_trait]
pub trait FeedElement: Send + Sync {
    /// Rendered text of the element.
    async fn text(&self) -> Result<String, BrowserError>;

    /// Attribute value, `None` when the attribute is absent.
    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError>;

    /// Descendants matching a CSS selector, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn FeedElement>>, BrowserError>;
}

/// A live browser tab the crawl worker drives.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Elements matching a CSS selector, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn FeedElement>>, BrowserError>;

    /// Evaluate a JavaScript expression and return its JSON value
    /// (`Null` for `undefined`).
    async fn run_script(&self, script: &str) -> Result<serde_json::Value, BrowserError>;

    async fn set_cookie(&self, cookie: &CookieEntry) -> Result<(), BrowserError>;

    async fn cookies(&self) -> Result<Vec<CookieEntry>, BrowserError>;

    /// Tear the session down. Idempotent; calls made afterwards fail with
    /// [`BrowserError::Closed`].
    async fn close(&self);
}

/// Builds browser sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(
        &self,
        options: &BrowserOptions,
    ) -> Result<Arc<dyn BrowserSession>, SessionBuildError>;
}

/// Launcher used when the crate is built without browser support.
pub struct UnavailableLauncher;

#[async_trait]
impl SessionLauncher for UnavailableLauncher {
    async fn launch(
        &self,
        _options: &BrowserOptions,
    ) -> Result<Arc<dyn BrowserSession>, SessionBuildError> {
        Err(SessionBuildError::Unsupported)
    }
}

/// The launcher matching the compiled feature set.
pub fn default_launcher() -> Arc<dyn SessionLauncher> {
    #[cfg(feature = "browser")]
    {
        Arc::new(ChromiumLauncher)
    }
    #[cfg(not(feature = "browser"))]
    {
        Arc::new(UnavailableLauncher)
    }
}

/// Read a numeric script result such as `document.body.scrollHeight`.
pub fn script_number(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
}
