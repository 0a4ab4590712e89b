//! Search navigation, scroll pagination and deduplication over the live feed.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::extract::read_post;
use super::selectors;
use crate::browser::{script_number, BrowserError, BrowserSession};
use crate::events::EventBus;
use crate::repository::PostSink;
use crate::services::Run;

/// Characters of post text shown in the TWEET log line.
const PREVIEW_CHARS: usize = 80;

/// Session-level failures that end a crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("navigation to {url} failed: {source}")]
    Navigation {
        url: String,
        #[source]
        source: BrowserError,
    },
    #[error("feed query failed: {0}")]
    Query(#[source] BrowserError),
    #[error("scrolling failed: {0}")]
    Scroll(#[source] BrowserError),
}

/// Timing and limits for a crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSettings {
    pub base_url: String,
    /// How long to wait for the first feed item after the search loads.
    pub feed_wait: Duration,
    /// How long to wait for the compose button on the home page.
    pub login_wait: Duration,
    /// Extra pause when login could not be confirmed.
    pub login_grace: Duration,
    pub initial_feed_delay: Duration,
    pub scroll_delay: Duration,
    /// Scroll budget per run.
    pub max_scrolls: usize,
    /// Poll interval for the explicit waits.
    pub poll_interval: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            base_url: "https://x.com".to_string(),
            feed_wait: Duration::from_secs(15),
            login_wait: Duration::from_secs(15),
            login_grace: Duration::from_secs(5),
            initial_feed_delay: Duration::from_secs(2),
            scroll_delay: Duration::from_secs(2),
            max_scrolls: 40,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Live search URL for `keyword`.
pub fn search_url(base_url: &str, keyword: &str) -> String {
    format!(
        "{}/search?q={}&f=live",
        base_url.trim_end_matches('/'),
        urlencoding::encode(keyword)
    )
}

/// Poll until `selector` matches at least once or `timeout` elapses.
///
/// The page is always checked at least once. A closed session ends the wait
/// immediately.
pub async fn wait_for_element(
    session: &dyn BrowserSession,
    selector: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match session.find_all(selector).await {
            Ok(found) if !found.is_empty() => return true,
            Ok(_) => {}
            Err(BrowserError::Closed) => return false,
            Err(e) => debug!("Waiting for {}: {}", selector, e),
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(poll_interval).await;
    }
}

/// Drives one search crawl for a run.
#[derive(Clone)]
pub struct FeedCrawler {
    settings: CrawlSettings,
    events: EventBus,
}

impl FeedCrawler {
    pub fn new(settings: CrawlSettings, events: EventBus) -> Self {
        Self { settings, events }
    }

    /// Check the session is logged in by looking for the compose button.
    ///
    /// An unconfirmed login only warns and pauses for the grace period.
    pub async fn confirm_login(&self, session: &dyn BrowserSession) -> Result<bool, CrawlError> {
        let url = format!("{}/home", self.settings.base_url.trim_end_matches('/'));
        session
            .navigate(&url)
            .await
            .map_err(|source| CrawlError::Navigation { url, source })?;

        let confirmed = wait_for_element(
            session,
            selectors::LOGIN_SIGNAL,
            self.settings.login_wait,
            self.settings.poll_interval,
        )
        .await;

        if confirmed {
            self.events.ok("Login confirmed, compose button detected");
        } else {
            self.events.warn(
                "Login not confirmed (compose button not found). Continuing anyway, results may be limited.",
            );
            sleep(self.settings.login_grace).await;
        }
        Ok(confirmed)
    }

    /// Crawl the live search feed for `run.keyword` until the target is
    /// reached, the run is cancelled, the scroll budget runs out, or the
    /// feed stops growing. Returns the number of posts collected.
    pub async fn crawl(
        &self,
        session: &dyn BrowserSession,
        run: &Run,
        sink: &mut PostSink,
    ) -> Result<usize, CrawlError> {
        let url = search_url(&self.settings.base_url, &run.keyword);
        self.events.info(format!("Searching: {}", url));
        session
            .navigate(&url)
            .await
            .map_err(|source| CrawlError::Navigation {
                url: url.clone(),
                source,
            })?;

        let feed_ready = wait_for_element(
            session,
            selectors::FEED_ITEM,
            self.settings.feed_wait,
            self.settings.poll_interval,
        )
        .await;
        if !feed_ready {
            self.events.warn("Tweet feed not detected, proceeding anyway");
        }
        sleep(self.settings.initial_feed_delay).await;

        let mut seen = HashSet::new();
        let mut scrolls = 0;

        while !run.target_reached() && !run.is_cancelled() && scrolls < self.settings.max_scrolls
        {
            let elements = session
                .find_all(selectors::FEED_ITEM)
                .await
                .map_err(CrawlError::Query)?;
            self.events.info(format!(
                "Found {} articles on current view (scraped so far {})",
                elements.len(),
                run.collected()
            ));

            for element in elements {
                if run.target_reached() || run.is_cancelled() {
                    break;
                }

                let post = match read_post(element.as_ref(), &self.settings.base_url).await {
                    Ok(post) => post,
                    Err(e) => {
                        self.events.error(format!("Error extracting tweet: {}", e));
                        self.events.debug(format!("Unreadable element: {:?}", e));
                        continue;
                    }
                };
                if !seen.insert(post.dedup_key()) {
                    continue;
                }

                let preview = post.preview(PREVIEW_CHARS);
                let Some(count) = run.append(post.clone()) else {
                    break;
                };
                sink.record(post, run.posts()).await;
                self.events.tweet(format!("#{} {}", count, preview));
            }

            if run.target_reached() || run.is_cancelled() {
                break;
            }

            let before = self.scroll_height(session).await?;
            session
                .run_script(selectors::SCROLL_TO_BOTTOM_JS)
                .await
                .map_err(CrawlError::Scroll)?;
            sleep(self.settings.scroll_delay).await;
            let after = self.scroll_height(session).await?;
            scrolls += 1;

            if before == after {
                self.events.info("Reached page end or no more content.");
                break;
            }
        }

        let collected = run.collected();
        self.events
            .info(format!("Scraping finished: tweets collected: {}", collected));
        Ok(collected)
    }

    async fn scroll_height(&self, session: &dyn BrowserSession) -> Result<i64, CrawlError> {
        let value = session
            .run_script(selectors::SCROLL_HEIGHT_JS)
            .await
            .map_err(CrawlError::Scroll)?;
        script_number(&value).ok_or_else(|| {
            CrawlError::Scroll(BrowserError::Script(format!(
                "scroll height is not a number: {}",
                value
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::events::Level;
    use crate::repository::{json_path, read_snapshot};
    use crate::testing::{post_element, ScriptedElement, ScriptedSession};

    fn instant() -> CrawlSettings {
        CrawlSettings {
            feed_wait: Duration::ZERO,
            login_wait: Duration::ZERO,
            login_grace: Duration::ZERO,
            initial_feed_delay: Duration::ZERO,
            scroll_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    struct Harness {
        events: EventBus,
        crawler: FeedCrawler,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(settings: CrawlSettings) -> Self {
            let events = EventBus::new(256);
            Self {
                crawler: FeedCrawler::new(settings, events.clone()),
                events,
                dir: tempfile::tempdir().unwrap(),
            }
        }

        async fn crawl(&self, session: &ScriptedSession, run: &Run) -> Result<usize, CrawlError> {
            let mut sink = PostSink::open(self.dir.path(), self.events.clone());
            self.crawler.crawl(session, run, &mut sink).await
        }

        fn messages(&self, level: Level) -> Vec<String> {
            self.events
                .recent()
                .into_iter()
                .filter(|e| e.level == level)
                .map(|e| e.message)
                .collect()
        }
    }

    fn posts(ids: std::ops::RangeInclusive<u32>) -> Vec<ScriptedElement> {
        ids.map(|id| post_element(id, "alice", &format!("post number {}", id)))
            .collect()
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        assert_eq!(
            search_url("https://x.com/", "rust lang #async"),
            "https://x.com/search?q=rust%20lang%20%23async&f=live"
        );
    }

    #[tokio::test]
    async fn test_limit_reached_mid_batch() {
        let harness = Harness::new(instant());
        let mut second = posts(3..=4);
        second.extend(posts(5..=7));
        let session = ScriptedSession::new(vec![posts(1..=4), second]);
        let run = Run::new("rust", 5);

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(collected, 5);
        assert_eq!(session.scroll_count(), 1);
        let touched = session.touched();
        assert!(touched.contains(&"post-5".to_string()));
        assert!(!touched.contains(&"post-6".to_string()));
        assert!(!touched.contains(&"post-7".to_string()));

        let urls: Vec<String> = run.posts().into_iter().map(|p| p.url).collect();
        assert_eq!(
            urls,
            (1..=5)
                .map(|id| format!("https://x.com/alice/status/{}", id))
                .collect::<Vec<_>>()
        );
        assert_eq!(read_snapshot(&json_path(harness.dir.path())).unwrap().len(), 5);
        assert_eq!(
            harness.messages(Level::Tweet).last().unwrap(),
            "#5 post number 5"
        );
    }

    #[tokio::test]
    async fn test_stagnant_feed_ends_crawl() {
        let harness = Harness::new(instant());
        let session =
            ScriptedSession::new(vec![posts(1..=2), posts(1..=2)]).with_heights(vec![2000, 2000]);
        let run = Run::new("rust", 50);

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(collected, 2);
        assert_eq!(session.scroll_count(), 1);
        assert!(harness
            .messages(Level::Info)
            .contains(&"Reached page end or no more content.".to_string()));
        assert!(harness
            .messages(Level::Info)
            .contains(&"Scraping finished: tweets collected: 2".to_string()));
    }

    #[tokio::test]
    async fn test_duplicates_across_batches_are_skipped() {
        let harness = Harness::new(instant());
        let session = ScriptedSession::new(vec![posts(1..=3), posts(2..=4)])
            .with_heights(vec![1000, 2000, 2000]);
        let run = Run::new("rust", 50);

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(collected, 4);
        assert_eq!(harness.messages(Level::Tweet).len(), 4);
        let keys: HashSet<_> = run.posts().iter().map(|p| p.dedup_key()).collect();
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test]
    async fn test_scroll_budget_bounds_loop() {
        let harness = Harness::new(CrawlSettings {
            max_scrolls: 3,
            ..instant()
        });
        let snapshots = (0..10).map(|i| posts(i * 2 + 1..=i * 2 + 2)).collect();
        let session = ScriptedSession::new(snapshots);
        let run = Run::new("rust", 100);

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(session.scroll_count(), 3);
        // One batch read before each scroll
        assert_eq!(collected, 6);
    }

    #[tokio::test]
    async fn test_cancel_during_scroll_stops_before_next_batch() {
        let harness = Harness::new(instant());
        let run = Arc::new(Run::new("rust", 100));
        let hook_run = run.clone();
        let session = ScriptedSession::new(vec![posts(1..=2), posts(3..=4)])
            .on_scroll(move |_| {
                hook_run.cancel();
            });

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(collected, 2);
        assert_eq!(session.scroll_count(), 1);
        assert!(!session.touched().contains(&"post-3".to_string()));
    }

    #[tokio::test]
    async fn test_unreadable_element_is_skipped_with_error() {
        let harness = Harness::new(instant());
        let batch = vec![
            post_element(1, "alice", "first"),
            ScriptedElement::new("gone").broken(),
            post_element(2, "bob", "second"),
        ];
        let session = ScriptedSession::new(vec![batch]);
        let run = Run::new("rust", 50);

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(collected, 2);
        assert_eq!(harness.messages(Level::Error).len(), 1);
        assert!(harness
            .messages(Level::Debug)
            .iter()
            .any(|m| m.starts_with("Unreadable element")));
    }

    #[tokio::test]
    async fn test_post_without_identity_is_kept_once() {
        let harness = Harness::new(instant());
        let media_only = || {
            ScriptedElement::new("")
                .child(
                    selectors::TIME,
                    ScriptedElement::new("").attr("datetime", "2026-10-16T09:30:00.000Z"),
                )
                .child(
                    selectors::MEDIA_IMAGE,
                    ScriptedElement::new("").attr("src", "https://pbs.twimg.com/media/a.jpg"),
                )
        };
        let batch = vec![media_only(), post_element(1, "alice", "first"), media_only()];
        let session = ScriptedSession::new(vec![batch]);
        let run = Run::new("rust", 50);

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(collected, 2);
        assert!(harness.messages(Level::Error).is_empty());
        let posts = run.posts();
        assert_eq!(posts[0].media_urls, vec!["https://pbs.twimg.com/media/a.jpg"]);
        assert!(posts[0].dedup_key().is_empty());
    }

    #[tokio::test]
    async fn test_relative_permalinks_are_stored_absolute() {
        let harness = Harness::new(instant());
        let element = ScriptedElement::new("").child(
            selectors::PERMALINK,
            ScriptedElement::new("").attr("href", "/alice/status/9"),
        );
        let session = ScriptedSession::new(vec![vec![element]]);
        let run = Run::new("rust", 50);

        harness.crawl(&session, &run).await.unwrap();

        assert_eq!(run.posts()[0].url, "https://x.com/alice/status/9");
        let snapshot = read_snapshot(&json_path(harness.dir.path())).unwrap();
        assert_eq!(snapshot[0].url, "https://x.com/alice/status/9");
    }

    #[tokio::test]
    async fn test_missing_feed_warns_and_continues() {
        let harness = Harness::new(instant());
        let session = ScriptedSession::new(vec![vec![]]);
        let run = Run::new("rust", 5);

        let collected = harness.crawl(&session, &run).await.unwrap();

        assert_eq!(collected, 0);
        assert!(harness
            .messages(Level::Warn)
            .contains(&"Tweet feed not detected, proceeding anyway".to_string()));
        assert_eq!(session.navigations(), vec![search_url("https://x.com", "rust")]);
    }

    #[tokio::test]
    async fn test_closed_session_is_a_crawl_error() {
        let harness = Harness::new(instant());
        let session = ScriptedSession::new(vec![posts(1..=2)]);
        session.close().await;
        let run = Run::new("rust", 5);

        let err = harness.crawl(&session, &run).await.unwrap_err();
        assert!(matches!(err, CrawlError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_confirm_login() {
        let harness = Harness::new(instant());

        let session = ScriptedSession::new(vec![]);
        assert!(harness.crawler.confirm_login(&session).await.unwrap());
        assert_eq!(session.navigations(), vec!["https://x.com/home"]);
        assert_eq!(harness.messages(Level::Ok).len(), 1);

        let session = ScriptedSession::new(vec![]).logged_out();
        assert!(!harness.crawler.confirm_login(&session).await.unwrap());
        assert_eq!(harness.messages(Level::Warn).len(), 1);
    }
}
