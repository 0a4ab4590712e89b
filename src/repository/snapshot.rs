//! Full JSON snapshot of a run's posts, replaced atomically.

use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::SinkError;
use crate::models::Post;

/// Serialize `posts` to a temp file beside `path`, then rename it over `path`.
///
/// Readers see either the previous snapshot or the new one, never a partial
/// file.
pub fn write_snapshot(path: &Path, posts: &[Post]) -> Result<(), SinkError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, posts)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| SinkError::Io(e.error))?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<Vec<Post>, SinkError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
