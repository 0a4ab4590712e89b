//! State of one crawl run, shared between the control plane and its worker.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::browser::BrowserSession;
use crate::models::Post;

/// One crawl run.
///
/// `collected` only grows and never passes `target_count`; `cancelled` only
/// goes from false to true. Posts are appended by the worker alone.
pub struct Run {
    pub id: Uuid,
    pub keyword: String,
    pub target_count: usize,
    pub started_at: DateTime<Utc>,
    collected: AtomicUsize,
    cancelled: AtomicBool,
    cancel_signal: Notify,
    posts: RwLock<Vec<Post>>,
    /// Live browser session while the worker holds one.
    session: Mutex<Option<Arc<dyn BrowserSession>>>,
}

impl Run {
    pub fn new(keyword: impl Into<String>, target_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            keyword: keyword.into(),
            target_count,
            started_at: Utc::now(),
            collected: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            cancel_signal: Notify::new(),
            posts: RwLock::new(Vec::new()),
            session: Mutex::new(None),
        }
    }

    pub fn collected(&self) -> usize {
        self.collected.load(Ordering::SeqCst)
    }

    pub fn target_reached(&self) -> bool {
        self.collected() >= self.target_count
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation and close the armed session, if any.
    ///
    /// Closing makes any browser call the worker is blocked in fail fast.
    /// Before a session is armed (still launching) the worker is woken
    /// through [`Run::cancelled`] instead. Returns `false` when the run was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        self.cancel_signal.notify_waiters();
        if let Some(session) = self.disarm() {
            tokio::spawn(async move { session.close().await });
        }
        first
    }

    /// Resolves once the run is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.cancel_signal.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Register the worker's session so [`Run::cancel`] can close it.
    ///
    /// Returns `false` without arming when the run is already cancelled.
    pub fn arm(&self, session: Arc<dyn BrowserSession>) -> bool {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            return false;
        }
        *slot = Some(session);
        true
    }

    pub fn disarm(&self) -> Option<Arc<dyn BrowserSession>> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Append an accepted post and return the new count.
    ///
    /// Returns `None` (and stores nothing) once the target is reached.
    pub fn append(&self, post: Post) -> Option<usize> {
        let mut posts = self.posts.write().unwrap_or_else(PoisonError::into_inner);
        if posts.len() >= self.target_count {
            return None;
        }
        posts.push(post);
        let count = posts.len();
        self.collected.store(count, Ordering::SeqCst);
        Some(count)
    }

    /// Copy of the posts collected so far.
    pub fn posts(&self) -> Vec<Post> {
        self.posts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.id)
            .field("keyword", &self.keyword)
            .field("target_count", &self.target_count)
            .field("collected", &self.collected())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
