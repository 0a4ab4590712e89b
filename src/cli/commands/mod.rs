pub mod config;
pub mod scrape;
pub mod serve;
