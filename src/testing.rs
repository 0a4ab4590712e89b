//! Scripted in-memory browser used by the test suite.
//!
//! A [`ScriptedSession`] replays a fixed sequence of feed snapshots: the
//! feed query returns the current snapshot, and each scroll-to-bottom script
//! advances to the next one (staying on the last). Scroll height grows with
//! each snapshot unless overridden, so running off the end reads as a
//! stagnant feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::browser::{
    BrowserError, BrowserOptions, BrowserSession, FeedElement, SessionBuildError, SessionLauncher,
};
use crate::models::CookieEntry;
use crate::scrapers::selectors;

/// A fake DOM node.
#[derive(Debug, Clone, Default)]
pub struct ScriptedElement {
    label: String,
    text: String,
    attrs: HashMap<String, String>,
    children: Vec<(String, ScriptedElement)>,
    broken: bool,
}

impl ScriptedElement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Register `child` as a match for `selector`.
    pub fn child(mut self, selector: &str, child: ScriptedElement) -> Self {
        self.children.push((selector.to_string(), child));
        self
    }

    /// Every call on this node fails, as with a detached element.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

/// A complete post article: text, author, handle, timestamp and permalink.
pub fn post_element(id: u32, user: &str, text: &str) -> ScriptedElement {
    ScriptedElement::new(format!("{}\n@{}\n{}", user, user, text))
        .labeled(format!("post-{}", id))
        .child(selectors::TEXT, ScriptedElement::new(text))
        .child(selectors::USERNAME, ScriptedElement::new(user))
        .child(selectors::HANDLE, ScriptedElement::new(format!("@{}", user)))
        .child(
            selectors::TIME,
            ScriptedElement::new("").attr("datetime", "2026-10-16T09:30:00.000Z"),
        )
        .child(
            selectors::PERMALINK,
            ScriptedElement::new("").attr("href", format!("https://x.com/{}/status/{}", user, id)),
        )
}

struct ScriptedNode {
    element: ScriptedElement,
    closed: Arc<AtomicBool>,
    touched: Arc<Mutex<Vec<String>>>,
}

impl ScriptedNode {
    fn check(&self) -> Result<(), BrowserError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrowserError::Closed);
        }
        if self.element.broken {
            return Err(BrowserError::Protocol("stale element".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedElement for ScriptedNode {
    async fn text(&self) -> Result<String, BrowserError> {
        self.check()?;
        Ok(self.element.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, BrowserError> {
        self.check()?;
        Ok(self.element.attrs.get(name).cloned())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn FeedElement>>, BrowserError> {
        self.check()?;
        if !self.element.label.is_empty() {
            let mut touched = self.touched.lock().unwrap();
            if !touched.contains(&self.element.label) {
                touched.push(self.element.label.clone());
            }
        }
        Ok(self
            .element
            .children
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, child)| {
                Box::new(ScriptedNode {
                    element: child.clone(),
                    closed: self.closed.clone(),
                    touched: self.touched.clone(),
                }) as Box<dyn FeedElement>
            })
            .collect())
    }
}

type ScrollHook = Box<dyn Fn(usize) + Send + Sync>;

/// Scripted browser session.
pub struct ScriptedSession {
    snapshots: Vec<Vec<ScriptedElement>>,
    heights: Vec<i64>,
    cursor: AtomicUsize,
    logged_in: bool,
    rejected_cookies: Vec<String>,
    closed: Arc<AtomicBool>,
    touched: Arc<Mutex<Vec<String>>>,
    navigations: Mutex<Vec<String>>,
    cookies: Mutex<Vec<CookieEntry>>,
    scrolls: AtomicUsize,
    scroll_gate: Option<Arc<Semaphore>>,
    on_scroll: Option<ScrollHook>,
}

impl ScriptedSession {
    pub fn new(snapshots: Vec<Vec<ScriptedElement>>) -> Self {
        let heights = (1..=snapshots.len().max(1) as i64).map(|i| i * 1000).collect();
        Self {
            snapshots,
            heights,
            cursor: AtomicUsize::new(0),
            logged_in: true,
            rejected_cookies: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
            touched: Arc::new(Mutex::new(Vec::new())),
            navigations: Mutex::new(Vec::new()),
            cookies: Mutex::new(Vec::new()),
            scrolls: AtomicUsize::new(0),
            scroll_gate: None,
            on_scroll: None,
        }
    }

    /// Override the scroll height reported for each snapshot.
    pub fn with_heights(mut self, heights: Vec<i64>) -> Self {
        self.heights = heights;
        self
    }

    pub fn logged_out(mut self) -> Self {
        self.logged_in = false;
        self
    }

    pub fn reject_cookie(mut self, name: &str) -> Self {
        self.rejected_cookies.push(name.to_string());
        self
    }

    /// Each scroll waits for a permit from `gate`.
    pub fn gate_scrolls(mut self, gate: Arc<Semaphore>) -> Self {
        self.scroll_gate = Some(gate);
        self
    }

    /// Call `hook` with the 1-based scroll number as each scroll starts.
    pub fn on_scroll(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_scroll = Some(Box::new(hook));
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn cookie_names(&self) -> Vec<String> {
        self.cookies
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn scroll_count(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Labels of the articles the extractor looked into, in first-touch order.
    pub fn touched(&self) -> Vec<String> {
        self.touched.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), BrowserError> {
        if self.is_closed() {
            return Err(BrowserError::Closed);
        }
        Ok(())
    }

    fn current_height(&self) -> i64 {
        let cursor = self.cursor.load(Ordering::SeqCst);
        self.heights
            .get(cursor)
            .or_else(|| self.heights.last())
            .copied()
            .unwrap_or(0)
    }

    fn node(&self, element: ScriptedElement) -> Box<dyn FeedElement> {
        Box::new(ScriptedNode {
            element,
            closed: self.closed.clone(),
            touched: self.touched.clone(),
        })
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.check()?;
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Box<dyn FeedElement>>, BrowserError> {
        self.check()?;
        if selector == selectors::FEED_ITEM {
            let cursor = self.cursor.load(Ordering::SeqCst);
            let snapshot = self.snapshots.get(cursor).cloned().unwrap_or_default();
            return Ok(snapshot.into_iter().map(|e| self.node(e)).collect());
        }
        if selector == selectors::LOGIN_SIGNAL && self.logged_in {
            return Ok(vec![self.node(ScriptedElement::new("Post"))]);
        }
        Ok(Vec::new())
    }

    async fn run_script(&self, script: &str) -> Result<serde_json::Value, BrowserError> {
        self.check()?;
        if script == selectors::SCROLL_HEIGHT_JS {
            return Ok(serde_json::json!(self.current_height()));
        }
        if script == selectors::SCROLL_TO_BOTTOM_JS {
            let number = self.scrolls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(ref hook) = self.on_scroll {
                hook(number);
            }
            if let Some(ref gate) = self.scroll_gate {
                let permit = gate.acquire().await.map_err(|_| BrowserError::Closed)?;
                permit.forget();
            }
            self.check()?;
            let last = self.snapshots.len().saturating_sub(1);
            let cursor = self.cursor.load(Ordering::SeqCst);
            self.cursor.store((cursor + 1).min(last), Ordering::SeqCst);
            return Ok(serde_json::Value::Null);
        }
        Err(BrowserError::Script(format!("unscripted: {}", script)))
    }

    async fn set_cookie(&self, cookie: &CookieEntry) -> Result<(), BrowserError> {
        self.check()?;
        if self.rejected_cookies.contains(&cookie.name) {
            return Err(BrowserError::CookieRejected(cookie.name.clone()));
        }
        self.cookies.lock().unwrap().push(cookie.clone());
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieEntry>, BrowserError> {
        self.check()?;
        Ok(self.cookies.lock().unwrap().clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(ref gate) = self.scroll_gate {
            gate.close();
        }
    }
}

/// Hands out a prepared scripted session, fails to launch, or never
/// finishes launching.
pub struct ScriptedLauncher {
    session: Option<Arc<ScriptedSession>>,
    hang: bool,
}

impl ScriptedLauncher {
    pub fn new(session: Arc<ScriptedSession>) -> Self {
        Self {
            session: Some(session),
            hang: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            session: None,
            hang: false,
        }
    }

    /// Launch blocks forever, as with a browser that never comes up.
    pub fn hanging() -> Self {
        Self {
            session: None,
            hang: true,
        }
    }
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        _options: &BrowserOptions,
    ) -> Result<Arc<dyn BrowserSession>, SessionBuildError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        match self.session {
            Some(ref session) => Ok(session.clone() as Arc<dyn BrowserSession>),
            None => Err(SessionBuildError::Launch("chrome not found".to_string())),
        }
    }
}
