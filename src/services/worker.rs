//! The task that carries one run from browser launch to final snapshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use super::control::{ControlPlane, RunState};
use super::run::Run;
use crate::browser::{BrowserOptions, BrowserSession, SessionBootstrapper, SessionBuildError};
use crate::events::EventBus;
use crate::models::{load_cookie_file, CookieEntry};
use crate::repository::PostSink;
use crate::scrapers::{CrawlError, CrawlSettings, FeedCrawler};

/// Everything a worker needs besides the run itself.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub browser: BrowserOptions,
    pub crawl: CrawlSettings,
    pub output_dir: PathBuf,
    /// Fallback cookie file when a start request carries no cookies.
    pub cookies_file: Option<PathBuf>,
    /// Target used when a start request gives none.
    pub default_target: usize,
    /// Pause around cookie injection.
    pub settle_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            browser: BrowserOptions::default(),
            crawl: CrawlSettings::default(),
            output_dir: PathBuf::from("downloads"),
            cookies_file: None,
            default_target: 100,
            settle_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error)]
enum WorkerError {
    #[error(transparent)]
    Session(#[from] SessionBuildError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
}

/// Run to completion and publish the final state.
pub(crate) async fn run_worker(
    plane: ControlPlane,
    run: Arc<Run>,
    cookies: Option<Vec<CookieEntry>>,
) {
    let events = plane.events().clone();
    let outcome = execute(&plane, &run, cookies).await;

    let state = match outcome {
        Ok(_) if run.is_cancelled() => {
            events.info("Scraper stopped on request");
            RunState::Stopped
        }
        Ok(_) => RunState::Completed,
        Err(e) if run.is_cancelled() => {
            debug!("Run {} ended after stop: {}", run.id, e);
            events.info("Scraper stopped on request");
            RunState::Stopped
        }
        Err(e) => {
            events.error(format!("Fatal error in scraper: {}", e));
            events.debug(format!("{:?}", e));
            RunState::Failed
        }
    };

    info!(
        "Run {} finished as {:?} with {} posts",
        run.id,
        state,
        run.collected()
    );
    plane.finish(run.id, state);
}

async fn execute(
    plane: &ControlPlane,
    run: &Arc<Run>,
    cookies: Option<Vec<CookieEntry>>,
) -> Result<usize, WorkerError> {
    let config = plane.config();
    let events = plane.events();

    events.info(format!(
        "Starting scrape for '{}' (target {} tweets)",
        run.keyword, run.target_count
    ));

    let bootstrapper = SessionBootstrapper::new(plane.launcher(), events.clone())
        .with_settle_delay(config.settle_delay);
    let session = tokio::select! {
        built = bootstrapper.build(&config.browser) => built?,
        _ = run.cancelled() => {
            debug!("Run {} cancelled while the browser was launching", run.id);
            return Ok(0);
        }
    };

    if !run.arm(session.clone()) {
        session.close().await;
        return Ok(0);
    }
    plane.mark_running(run.id);

    let result = drive(&bootstrapper, session.as_ref(), config, events, run, cookies).await;

    run.disarm();
    session.close().await;
    result
}

async fn drive(
    bootstrapper: &SessionBootstrapper,
    session: &dyn BrowserSession,
    config: &WorkerConfig,
    events: &EventBus,
    run: &Run,
    cookies: Option<Vec<CookieEntry>>,
) -> Result<usize, WorkerError> {
    let cookies = cookies.filter(|c| !c.is_empty()).or_else(|| {
        config
            .cookies_file
            .as_deref()
            .and_then(load_cookie_file)
            .filter(|c| !c.is_empty())
    });

    match cookies {
        Some(cookies) => {
            let applied = bootstrapper
                .inject_cookies(session, &cookies, &config.crawl.base_url)
                .await;
            events.info(format!("Applied {} of {} cookies", applied, cookies.len()));
        }
        None => events.warn("No cookies found. You may be redirected to login."),
    }

    let crawler = FeedCrawler::new(config.crawl.clone(), events.clone());
    crawler.confirm_login(session).await?;

    if run.is_cancelled() {
        return Ok(run.collected());
    }

    let mut sink = PostSink::open(&config.output_dir, events.clone());
    let crawled = crawler.crawl(session, run, &mut sink).await;
    sink.finish(run.posts()).await;

    Ok(crawled?)
}
