//! Event bus carrying operator-facing log lines from the crawl worker to
//! live stream consumers.
//!
//! Publishing never blocks. The bus is a bounded broadcast channel: a
//! subscriber that falls more than `capacity` events behind loses the oldest
//! ones and is told how many it missed. A short replay history lets a
//! consumer that connects mid-run see what just happened.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

/// Default channel capacity per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Number of recent events replayed to new subscribers.
const HISTORY_LEN: usize = 200;

/// Severity of a log event. `Ok` marks a confirmed success, `Tweet` marks
/// an accepted post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Ok,
    Error,
    Debug,
    Tweet,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Ok => "OK",
            Level::Error => "ERROR",
            Level::Debug => "DEBUG",
            Level::Tweet => "TWEET",
        }
    }
}

/// One operator-facing log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "time", with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    #[serde(rename = "msg")]
    pub message: String,
}

impl LogEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Timestamps travel as fractional Unix seconds, which is what the
/// dashboard's `new Date(time * 1000)` expects.
mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(ts.timestamp_millis() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(d)?;
        DateTime::from_timestamp_millis((secs * 1000.0) as i64)
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// What a subscriber receives from [`Subscription::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(LogEvent),
    /// Nothing arrived within the poll timeout.
    Heartbeat,
}

struct Shared {
    tx: broadcast::Sender<LogEvent>,
    history: Mutex<VecDeque<LogEvent>>,
}

/// Cloneable handle to the process-wide event bus.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                tx,
                history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
            }),
        }
    }

    /// Enqueue an event without blocking and mirror it to `tracing`.
    pub fn publish(&self, event: LogEvent) {
        mirror_to_tracing(&event);

        let mut history = self
            .shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(event.clone());
        // No live subscribers is fine; the history still has it.
        let _ = self.shared.tx.send(event);
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.publish(LogEvent::new(level, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message);
    }

    pub fn ok(&self, message: impl Into<String>) {
        self.log(Level::Ok, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    pub fn tweet(&self, message: impl Into<String>) {
        self.log(Level::Tweet, message);
    }

    /// Subscribe to events published from now on, preceded by the recent
    /// history.
    pub fn subscribe(&self) -> Subscription {
        // Holding the history lock while subscribing keeps replay and live
        // delivery free of gaps and duplicates.
        let history = self
            .shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let rx = self.shared.tx.subscribe();
        Subscription {
            backlog: history.clone(),
            rx,
        }
    }

    /// Snapshot of the replay history.
    pub fn recent(&self) -> Vec<LogEvent> {
        self.shared
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

fn mirror_to_tracing(event: &LogEvent) {
    let kind = event.level.as_str();
    match event.level {
        Level::Error => tracing::error!(target: "feedcrawl::events", kind, "{}", event.message),
        Level::Warn => tracing::warn!(target: "feedcrawl::events", kind, "{}", event.message),
        Level::Debug => tracing::debug!(target: "feedcrawl::events", kind, "{}", event.message),
        Level::Info | Level::Ok | Level::Tweet => {
            tracing::info!(target: "feedcrawl::events", kind, "{}", event.message)
        }
    }
}

/// One consumer's view of the bus.
pub struct Subscription {
    backlog: VecDeque<LogEvent>,
    rx: broadcast::Receiver<LogEvent>,
}

impl Subscription {
    /// Wait up to `timeout` for the next event.
    ///
    /// Returns a heartbeat when the timeout elapses, a synthetic WARN event
    /// when this subscriber lagged behind, and `None` once every publisher is
    /// gone.
    pub async fn poll(&mut self, timeout: Duration) -> Option<Delivery> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(Delivery::Event(event));
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Some(Delivery::Heartbeat),
            Ok(Ok(event)) => Some(Delivery::Event(event)),
            Ok(Err(RecvError::Lagged(missed))) => Some(Delivery::Event(LogEvent::new(
                Level::Warn,
                format!("Event stream lagged, {} events dropped", missed),
            ))),
            Ok(Err(RecvError::Closed)) => None,
        }
    }
}
