//! Append-only CSV log of accepted posts.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use super::SinkError;
use crate::models::Post;

pub const CSV_HEADER: [&str; 8] = [
    "Username",
    "Handle",
    "Tweet_Text",
    "Timestamp",
    "Media_URLs",
    "Hashtags",
    "Mentions",
    "URL",
];

/// CSV writer that flushes after every row.
pub struct CsvLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvLog {
    /// Create (or truncate) the log and write the header row.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, post: &Post) -> Result<(), SinkError> {
        self.writer.write_record(row(post))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Row layout matching [`CSV_HEADER`].
pub fn row(post: &Post) -> [String; 8] {
    [
        post.username.clone(),
        post.handle.clone(),
        post.text.replace('\n', " "),
        post.timestamp.clone(),
        post.media_urls.join(";"),
        post.hashtags.join(";"),
        post.mentions.join(";"),
        post.url.clone(),
    ]
}
