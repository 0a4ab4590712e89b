//! Shared helper functions for CLI commands.

use chrono::Local;
use console::style;

use crate::events::{Level, LogEvent};

/// One event as a styled console line.
pub fn format_event(event: &LogEvent) -> String {
    let time = event.timestamp.with_timezone(&Local).format("%H:%M:%S");
    let level = format!("{:<5}", event.level.as_str());
    let level = match event.level {
        Level::Error => style(level).red().bold(),
        Level::Warn => style(level).yellow(),
        Level::Ok => style(level).green(),
        Level::Tweet => style(level).cyan(),
        Level::Debug => style(level).dim(),
        Level::Info => style(level).blue(),
    };
    format!("{} {} {}", style(time).dim(), level, event.message)
}

/// Truncate a string to `max_chars`, appending "..." when shortened.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
