//! Configuration management for feedcrawl using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::BrowserOptions;
use crate::scrapers::CrawlSettings;
use crate::services::WorkerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Run the browser without a window.
    pub headless: bool,
    /// Override the browser user agent.
    pub user_agent: Option<String>,
    /// How long page queries wait for a first match.
    pub implicit_wait: Duration,
    /// Pause after the search feed appears.
    pub initial_feed_delay: Duration,
    /// Scroll budget per run.
    pub max_consecutive_scrolls: usize,
    /// Pause after each scroll.
    pub scroll_delay: Duration,
    /// Target used when a start request gives none.
    pub max_tweets_default: usize,
    pub host: String,
    pub port: u16,
    /// Where `tweets.csv` and `tweets.json` are written.
    pub output_dir: PathBuf,
    /// Fallback cookie file.
    pub cookies_file: PathBuf,
    pub base_url: String,
    pub feed_wait_timeout: Duration,
    pub login_wait_timeout: Duration,
    pub login_grace: Duration,
    /// Per-subscriber event buffer.
    pub event_buffer: usize,
    /// Idle interval before the stream sends a heartbeat.
    pub heartbeat: Duration,
    /// Chrome/Chromium binary; auto-detected when unset.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            implicit_wait: Duration::from_secs(5),
            initial_feed_delay: Duration::from_secs(2),
            max_consecutive_scrolls: 40,
            scroll_delay: Duration::from_secs(2),
            max_tweets_default: 100,
            host: "0.0.0.0".to_string(),
            port: 8000,
            output_dir: PathBuf::from("downloads"),
            cookies_file: PathBuf::from("config/cookies.json"),
            base_url: "https://x.com".to_string(),
            feed_wait_timeout: Duration::from_secs(15),
            login_wait_timeout: Duration::from_secs(15),
            login_grace: Duration::from_secs(5),
            event_buffer: crate::events::DEFAULT_CAPACITY,
            heartbeat: Duration::from_millis(500),
            chrome_executable: None,
        }
    }
}

impl Settings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            headless: self.headless,
            user_agent: self.user_agent.clone(),
            implicit_wait: self.implicit_wait,
            chrome_executable: self.chrome_executable.clone(),
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            base_url: self.base_url.clone(),
            feed_wait: self.feed_wait_timeout,
            login_wait: self.login_wait_timeout,
            login_grace: self.login_grace,
            initial_feed_delay: self.initial_feed_delay,
            scroll_delay: self.scroll_delay,
            max_scrolls: self.max_consecutive_scrolls,
            ..Default::default()
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            browser: self.browser_options(),
            crawl: self.crawl_settings(),
            output_dir: self.output_dir.clone(),
            cookies_file: Some(self.cookies_file.clone()),
            default_target: self.max_tweets_default,
            ..Default::default()
        }
    }

    /// The settings in config file form, every field filled in.
    pub fn to_config(&self) -> Config {
        Config {
            headless: Some(self.headless),
            user_agent: self.user_agent.clone(),
            implicit_wait: Some(self.implicit_wait.as_secs_f64()),
            initial_feed_delay: Some(self.initial_feed_delay.as_secs_f64()),
            max_consecutive_scrolls: Some(self.max_consecutive_scrolls),
            scroll_delay: Some(self.scroll_delay.as_secs_f64()),
            max_tweets_default: Some(self.max_tweets_default),
            host: Some(self.host.clone()),
            port: Some(self.port),
            output_dir: Some(self.output_dir.display().to_string()),
            cookies_file: Some(self.cookies_file.display().to_string()),
            base_url: Some(self.base_url.clone()),
            feed_wait_timeout: Some(self.feed_wait_timeout.as_secs_f64()),
            login_wait_timeout: Some(self.login_wait_timeout.as_secs_f64()),
            login_grace: Some(self.login_grace.as_secs_f64()),
            event_buffer: Some(self.event_buffer),
            heartbeat_ms: Some(self.heartbeat.as_millis() as u64),
            chrome_executable: self
                .chrome_executable
                .as_ref()
                .map(|p| p.display().to_string()),
            source_path: None,
        }
    }
}

/// Configuration file structure. Durations are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implicit_wait: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_feed_delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_scrolls: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tweets_default: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Output directory, relative to the config file unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_wait_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_wait_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_grace: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_buffer: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_executable: Option<String>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers feedcrawl config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("feedcrawl").await {
            Ok(pref_config) => {
                let headless: Option<bool> = pref_config.get("headless").ok();
                let user_agent: Option<String> = pref_config.get("user_agent").ok();
                let implicit_wait: Option<f64> = pref_config.get("implicit_wait").ok();
                let initial_feed_delay: Option<f64> =
                    pref_config.get("initial_feed_delay").ok();
                let max_consecutive_scrolls: Option<usize> =
                    pref_config.get("max_consecutive_scrolls").ok();
                let scroll_delay: Option<f64> = pref_config.get("scroll_delay").ok();
                let max_tweets_default: Option<usize> =
                    pref_config.get("max_tweets_default").ok();
                let host: Option<String> = pref_config.get("host").ok();
                let port: Option<u16> = pref_config.get("port").ok();
                let output_dir: Option<String> = pref_config.get("output_dir").ok();
                let cookies_file: Option<String> = pref_config.get("cookies_file").ok();
                let base_url: Option<String> = pref_config.get("base_url").ok();
                let feed_wait_timeout: Option<f64> =
                    pref_config.get("feed_wait_timeout").ok();
                let login_wait_timeout: Option<f64> =
                    pref_config.get("login_wait_timeout").ok();
                let login_grace: Option<f64> = pref_config.get("login_grace").ok();
                let event_buffer: Option<usize> = pref_config.get("event_buffer").ok();
                let heartbeat_ms: Option<u64> = pref_config.get("heartbeat_ms").ok();
                let chrome_executable: Option<String> =
                    pref_config.get("chrome_executable").ok();

                let source_path = pref_config.source_path().cloned();

                Config {
                    headless,
                    user_agent,
                    implicit_wait,
                    initial_feed_delay,
                    max_consecutive_scrolls,
                    scroll_delay,
                    max_tweets_default,
                    host,
                    port,
                    output_dir,
                    cookies_file,
                    base_url,
                    feed_wait_timeout,
                    login_wait_timeout,
                    login_grace,
                    event_buffer,
                    heartbeat_ms,
                    chrome_executable,
                    source_path,
                }
            }
            Err(e) => {
                tracing::debug!("No config file discovered: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path (TOML by extension,
    /// JSON otherwise).
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed: Result<Config, String> = if is_toml {
            toml::from_str(&contents).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&contents).map_err(|e| e.to_string())
        };

        let mut config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    /// Returns the config file's parent directory if available, otherwise None.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Reject values the crawler cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let delays = [
            ("implicit_wait", self.implicit_wait),
            ("initial_feed_delay", self.initial_feed_delay),
            ("scroll_delay", self.scroll_delay),
            ("feed_wait_timeout", self.feed_wait_timeout),
            ("login_wait_timeout", self.login_wait_timeout),
            ("login_grace", self.login_grace),
        ];
        for (name, value) in delays {
            if let Some(secs) = value {
                if !secs.is_finite() || secs < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "{} must be a non-negative number of seconds, got {}",
                        name, secs
                    )));
                }
            }
        }

        let counts = [
            ("max_consecutive_scrolls", self.max_consecutive_scrolls),
            ("max_tweets_default", self.max_tweets_default),
            ("event_buffer", self.event_buffer),
        ];
        for (name, value) in counts {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{} must be at least 1", name)));
            }
        }

        if self.host.as_deref().is_some_and(|h| h.trim().is_empty()) {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if let Some(ref base_url) = self.base_url {
            url::Url::parse(base_url)
                .map_err(|e| ConfigError::Invalid(format!("base_url {}: {}", base_url, e)))?;
        }
        Ok(())
    }

    /// Apply configuration to settings.
    /// `base_dir` is used to resolve relative paths (typically config file dir or CWD).
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(headless) = self.headless {
            settings.headless = headless;
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(secs) = self.implicit_wait {
            settings.implicit_wait = seconds(secs);
        }
        if let Some(secs) = self.initial_feed_delay {
            settings.initial_feed_delay = seconds(secs);
        }
        if let Some(max) = self.max_consecutive_scrolls {
            settings.max_consecutive_scrolls = max;
        }
        if let Some(secs) = self.scroll_delay {
            settings.scroll_delay = seconds(secs);
        }
        if let Some(max) = self.max_tweets_default {
            settings.max_tweets_default = max;
        }
        if let Some(ref host) = self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(ref dir) = self.output_dir {
            settings.output_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref file) = self.cookies_file {
            settings.cookies_file = self.resolve_path(file, base_dir);
        }
        if let Some(ref base_url) = self.base_url {
            settings.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = self.feed_wait_timeout {
            settings.feed_wait_timeout = seconds(secs);
        }
        if let Some(secs) = self.login_wait_timeout {
            settings.login_wait_timeout = seconds(secs);
        }
        if let Some(secs) = self.login_grace {
            settings.login_grace = seconds(secs);
        }
        if let Some(buffer) = self.event_buffer {
            settings.event_buffer = buffer;
        }
        if let Some(ms) = self.heartbeat_ms {
            settings.heartbeat = Duration::from_millis(ms);
        }
        if let Some(ref exe) = self.chrome_executable {
            settings.chrome_executable = Some(self.resolve_path(exe, base_dir));
        }
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Override output directory (--output-dir flag).
    pub output_dir: Option<PathBuf>,
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<Settings, ConfigError> {
    // Load config from explicit path or auto-discover
    let config = match &options.config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };
    config.validate()?;

    let mut settings = Settings::default();

    let cwd = || std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd()
    } else {
        config.base_dir().unwrap_or_else(cwd)
    };

    config.apply_to_settings(&mut settings, &base_dir);

    // --output-dir override takes precedence
    if let Some(output_dir) = options.output_dir {
        settings.output_dir = output_dir;
    }

    Ok(settings)
}
