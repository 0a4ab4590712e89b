//! Feed scraping: locators, per-element extraction and the crawl loop.

pub mod extract;
pub mod feed;
pub mod selectors;

pub use extract::extract;
pub use feed::{search_url, wait_for_element, CrawlError, CrawlSettings, FeedCrawler};
