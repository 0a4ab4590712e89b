//! Keyword feed crawler.
//!
//! Drives a browser through a live search, scrolls the feed, extracts and
//! deduplicates posts, and persists them to CSV and JSON while streaming
//! progress events to an operator.

pub mod browser;
pub mod cli;
pub mod config;
pub mod events;
pub mod models;
pub mod repository;
pub mod scrapers;
pub mod server;
pub mod services;

#[cfg(test)]
mod testing;

pub use config::Settings;
