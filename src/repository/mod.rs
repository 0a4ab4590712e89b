//! Persistence sink for accepted posts.
//!
//! Two independent, best-effort outputs per run: an append-only CSV log and
//! a JSON snapshot of the whole collection rewritten on every accepted post.
//! They are not written transactionally; a crash between the two writes can
//! leave them one post apart. Write failures are reported on the event bus
//! and never stop the crawl.

mod csv_log;
mod snapshot;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use csv_log::{CsvLog, CSV_HEADER};
pub use snapshot::{read_snapshot, write_snapshot};

use crate::events::EventBus;
use crate::models::Post;

pub const CSV_FILENAME: &str = "tweets.csv";
pub const JSON_FILENAME: &str = "tweets.json";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn csv_path(output_dir: &Path) -> PathBuf {
    output_dir.join(CSV_FILENAME)
}

pub fn json_path(output_dir: &Path) -> PathBuf {
    output_dir.join(JSON_FILENAME)
}

/// Per-run writer for the CSV log and JSON snapshot.
pub struct PostSink {
    csv: Option<CsvLog>,
    json_path: PathBuf,
    events: EventBus,
}

impl PostSink {
    /// Prepare the output directory and start a fresh CSV log.
    ///
    /// Never fails: if the log cannot be created the error is reported and
    /// the run continues with the snapshot only.
    pub fn open(output_dir: &Path, events: EventBus) -> Self {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            events.error(format!(
                "Could not create output directory {}: {}",
                output_dir.display(),
                e
            ));
        }
        let csv = match CsvLog::create(&csv_path(output_dir)) {
            Ok(log) => Some(log),
            Err(e) => {
                events.error(format!("Could not create CSV log: {}", e));
                None
            }
        };
        Self {
            csv,
            json_path: json_path(output_dir),
            events,
        }
    }

    /// Persist one accepted post. `all_posts` is a copy of the run's full
    /// collection, already including `post`.
    ///
    /// The writes run on the blocking pool so file I/O never stalls the
    /// runtime.
    pub async fn record(&mut self, post: Post, all_posts: Vec<Post>) {
        let mut csv = self.csv.take();
        let json_path = self.json_path.clone();
        let events = self.events.clone();

        let joined = tokio::task::spawn_blocking(move || {
            if let Some(ref mut log) = csv {
                append_row(log, &post, &events);
            }
            store_snapshot(&json_path, &all_posts, &events);
            csv
        })
        .await;

        match joined {
            Ok(csv) => self.csv = csv,
            Err(e) => self
                .events
                .error(format!("Persistence task failed, CSV log closed: {}", e)),
        }
    }

    /// Final snapshot once the crawl loop has ended.
    pub async fn finish(&mut self, all_posts: Vec<Post>) {
        let json_path = self.json_path.clone();
        let events = self.events.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || {
            store_snapshot(&json_path, &all_posts, &events)
        })
        .await
        {
            self.events
                .warn(format!("Final snapshot task failed: {}", e));
        }
    }
}

fn append_row(log: &mut CsvLog, post: &Post, events: &EventBus) {
    if let Err(e) = log.append(post) {
        events.error(format!("Failed to append to {}: {}", log.path().display(), e));
    }
}

fn store_snapshot(path: &Path, all_posts: &[Post], events: &EventBus) {
    if let Err(e) = write_snapshot(path, all_posts) {
        events.warn(format!("Failed to write snapshot {}: {}", path.display(), e));
    }
}
