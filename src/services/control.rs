//! Control plane: owns the run lifecycle and keeps at most one run active.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use super::run::Run;
use super::worker::{run_worker, WorkerConfig};
use crate::browser::SessionLauncher;
use crate::events::EventBus;
use crate::models::{CookieEntry, Post};

/// Lifecycle of the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }

    /// A worker exists for the run in this state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunState::Starting | RunState::Running | RunState::Stopping
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("Scraper already running")]
    AlreadyRunning,
    #[error("Scraper not running")]
    NotRunning,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Parameters for a new run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartRequest {
    pub keyword: String,
    #[serde(default)]
    pub max_tweets: Option<usize>,
    /// Cookies to inject; the configured cookie file is used when absent.
    #[serde(default)]
    pub cookies: Option<Vec<CookieEntry>>,
}

/// Point-in-time view of the control plane.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub run_id: Option<Uuid>,
    pub keyword: Option<String>,
    pub collected: usize,
    pub target_count: usize,
}

struct Slot {
    state: RunState,
    run: Option<Arc<Run>>,
}

struct Inner {
    config: WorkerConfig,
    launcher: Arc<dyn SessionLauncher>,
    events: EventBus,
    slot: Mutex<Slot>,
    state_tx: watch::Sender<RunState>,
}

/// Cloneable handle shared by the HTTP layer, the CLI and the worker.
#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<Inner>,
}

impl ControlPlane {
    pub fn new(config: WorkerConfig, launcher: Arc<dyn SessionLauncher>, events: EventBus) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                launcher,
                events,
                slot: Mutex::new(Slot {
                    state: RunState::Idle,
                    run: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub(crate) fn launcher(&self) -> Arc<dyn SessionLauncher> {
        self.inner.launcher.clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, slot: &mut Slot, state: RunState) {
        slot.state = state;
        self.inner.state_tx.send_replace(state);
    }

    /// Start a new run and spawn its worker.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self, request: StartRequest) -> Result<Arc<Run>, ControlError> {
        let mut slot = self.slot();
        if slot.state.is_active() {
            return Err(ControlError::AlreadyRunning);
        }

        let keyword = request.keyword.trim();
        if keyword.is_empty() {
            return Err(ControlError::InvalidRequest("keyword is required".to_string()));
        }
        let target = request
            .max_tweets
            .unwrap_or(self.inner.config.default_target);
        if target == 0 {
            return Err(ControlError::InvalidRequest(
                "max_tweets must be at least 1".to_string(),
            ));
        }

        let run = Arc::new(Run::new(keyword, target));
        slot.run = Some(run.clone());
        self.set_state(&mut slot, RunState::Starting);
        drop(slot);

        self.inner.events.info(format!(
            "Started scraper for '{}' max {}",
            run.keyword, run.target_count
        ));
        tokio::spawn(run_worker(self.clone(), run.clone(), request.cookies));
        Ok(run)
    }

    /// Cancel the active run and close its browser session.
    pub fn stop(&self) -> Result<(), ControlError> {
        let mut slot = self.slot();
        if !slot.state.is_active() {
            return Err(ControlError::NotRunning);
        }
        if let Some(ref run) = slot.run {
            if run.cancel() {
                self.inner.events.info("Stop requested");
            }
        }
        self.set_state(&mut slot, RunState::Stopping);
        Ok(())
    }

    pub fn status(&self) -> RunStatus {
        let slot = self.slot();
        match slot.run {
            Some(ref run) => RunStatus {
                state: slot.state,
                run_id: Some(run.id),
                keyword: Some(run.keyword.clone()),
                collected: run.collected(),
                target_count: run.target_count,
            },
            None => RunStatus {
                state: slot.state,
                run_id: None,
                keyword: None,
                collected: 0,
                target_count: 0,
            },
        }
    }

    pub fn current_run(&self) -> Option<Arc<Run>> {
        self.slot().run.clone()
    }

    /// Copy of the current run's posts.
    pub fn posts(&self) -> Vec<Post> {
        self.current_run().map(|run| run.posts()).unwrap_or_default()
    }

    /// Notifications of state changes.
    pub fn watch(&self) -> watch::Receiver<RunState> {
        self.inner.state_tx.subscribe()
    }

    pub(crate) fn mark_running(&self, run_id: Uuid) {
        let mut slot = self.slot();
        let current = slot.run.as_ref().map(|r| r.id);
        if current == Some(run_id) && slot.state == RunState::Starting {
            self.set_state(&mut slot, RunState::Running);
        }
    }

    pub(crate) fn finish(&self, run_id: Uuid, state: RunState) {
        let mut slot = self.slot();
        let current = slot.run.as_ref().map(|r| r.id);
        if current == Some(run_id) {
            self.set_state(&mut slot, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use super::*;
    use crate::events::Level;
    use crate::repository::{json_path, read_snapshot};
    use crate::scrapers::CrawlSettings;
    use crate::testing::{post_element, ScriptedLauncher, ScriptedSession};

    struct Fixture {
        plane: ControlPlane,
        dir: tempfile::TempDir,
    }

    fn fixture(launcher: ScriptedLauncher) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            crawl: CrawlSettings {
                feed_wait: Duration::ZERO,
                login_wait: Duration::ZERO,
                login_grace: Duration::ZERO,
                initial_feed_delay: Duration::ZERO,
                scroll_delay: Duration::ZERO,
                poll_interval: Duration::ZERO,
                ..Default::default()
            },
            output_dir: dir.path().to_path_buf(),
            settle_delay: Duration::ZERO,
            ..Default::default()
        };
        let plane = ControlPlane::new(config, Arc::new(launcher), EventBus::new(256));
        Fixture { plane, dir }
    }

    fn request(keyword: &str, max: usize) -> StartRequest {
        StartRequest {
            keyword: keyword.to_string(),
            max_tweets: Some(max),
            cookies: None,
        }
    }

    async fn wait_for_state(plane: &ControlPlane, state: RunState) {
        let mut rx = plane.watch();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("state change timed out")
            .unwrap();
    }

    fn three_posts() -> Arc<ScriptedSession> {
        Arc::new(ScriptedSession::new(vec![(1..=3)
            .map(|id| post_element(id, "alice", &format!("post {}", id)))
            .collect()]))
    }

    #[tokio::test]
    async fn test_run_completes() {
        let session = three_posts();
        let f = fixture(ScriptedLauncher::new(session.clone()));

        let run = f.plane.start(request("rust", 3)).unwrap();
        wait_for_state(&f.plane, RunState::Completed).await;

        let status = f.plane.status();
        assert_eq!(status.run_id, Some(run.id));
        assert_eq!(status.keyword.as_deref(), Some("rust"));
        assert_eq!(status.collected, 3);
        assert_eq!(status.target_count, 3);
        assert_eq!(f.plane.posts().len(), 3);
        assert_eq!(read_snapshot(&json_path(f.dir.path())).unwrap().len(), 3);
        assert!(session.is_closed());
        assert!(f
            .plane
            .events()
            .recent()
            .iter()
            .any(|e| e.message == "No cookies found. You may be redirected to login."));
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let session = Arc::new(
            ScriptedSession::new(vec![vec![post_element(1, "alice", "hello")]])
                .gate_scrolls(gate.clone()),
        );
        let f = fixture(ScriptedLauncher::new(session.clone()));

        let first = f.plane.start(request("rust", 10)).unwrap();
        wait_for_state(&f.plane, RunState::Running).await;

        assert_eq!(
            f.plane.start(request("other", 10)).unwrap_err(),
            ControlError::AlreadyRunning
        );
        assert_eq!(f.plane.status().run_id, Some(first.id));
        assert_eq!(f.plane.status().state, RunState::Running);

        // The worker is parked in a scroll; stopping closes the session under it
        f.plane.stop().unwrap();
        wait_for_state(&f.plane, RunState::Stopped).await;
        assert!(first.is_cancelled());
        assert!(session.is_closed());
        assert!(!f
            .plane
            .events()
            .recent()
            .iter()
            .any(|e| e.level == Level::Error));
    }

    #[tokio::test]
    async fn test_stop_during_launch_ends_run() {
        let f = fixture(ScriptedLauncher::hanging());
        f.plane.start(request("rust", 5)).unwrap();

        f.plane.stop().unwrap();
        wait_for_state(&f.plane, RunState::Stopped).await;
        assert!(f
            .plane
            .events()
            .recent()
            .iter()
            .any(|e| e.message == "Scraper stopped on request"));
    }

    #[tokio::test]
    async fn test_stop_without_run() {
        let f = fixture(ScriptedLauncher::failing());
        assert_eq!(f.plane.stop().unwrap_err(), ControlError::NotRunning);
        assert_eq!(f.plane.status().state, RunState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let f = fixture(ScriptedLauncher::failing());
        assert!(matches!(
            f.plane.start(request("   ", 10)),
            Err(ControlError::InvalidRequest(_))
        ));
        assert!(matches!(
            f.plane.start(request("rust", 0)),
            Err(ControlError::InvalidRequest(_))
        ));
        assert_eq!(f.plane.status().state, RunState::Idle);
    }

    #[tokio::test]
    async fn test_launch_failure_fails_run() {
        let f = fixture(ScriptedLauncher::failing());
        f.plane.start(request("rust", 5)).unwrap();
        wait_for_state(&f.plane, RunState::Failed).await;

        let errors: Vec<String> = f
            .plane
            .events()
            .recent()
            .into_iter()
            .filter(|e| e.level == Level::Error)
            .map(|e| e.message)
            .collect();
        assert_eq!(
            errors,
            vec!["Fatal error in scraper: failed to launch browser: chrome not found"]
        );

        // A finished run does not block the next one
        assert!(f.plane.start(request("rust", 5)).is_ok());
    }

    #[tokio::test]
    async fn test_new_run_replaces_results() {
        let session = three_posts();
        let f = fixture(ScriptedLauncher::new(session));

        f.plane.start(request("first", 3)).unwrap();
        wait_for_state(&f.plane, RunState::Completed).await;
        assert_eq!(f.plane.posts().len(), 3);

        // Same session is closed now, so the second run fails early
        let second = f.plane.start(request("second", 3)).unwrap();
        assert_eq!(second.collected(), 0);
        assert!(f.plane.posts().is_empty());
        wait_for_state(&f.plane, RunState::Failed).await;
    }

    #[test]
    fn test_start_request_accepts_dashboard_payload() {
        let request: StartRequest = serde_json::from_str(
            r#"{"keyword": "rust", "max_tweets": 20, "cookies": [{"name": "ct0", "value": "x"}]}"#,
        )
        .unwrap();
        assert_eq!(request.max_tweets, Some(20));
        assert_eq!(request.cookies.unwrap().len(), 1);

        let minimal: StartRequest = serde_json::from_str(r#"{"keyword": "rust"}"#).unwrap();
        assert!(minimal.max_tweets.is_none());
        assert!(minimal.cookies.is_none());

        let mixed: StartRequest = serde_json::from_str(
            r#"{"keyword": "rust", "cookies": [{"name": 5, "value": null}, {"name": "ct0", "value": "x"}]}"#,
        )
        .unwrap();
        let cookies = mixed.cookies.unwrap();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].validate().is_err());
        assert!(cookies[1].validate().is_ok());
    }
}
