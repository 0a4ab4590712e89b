//! Session cookies injected into the browser before crawling.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Problems with an individual cookie entry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("cookie has no name")]
    MissingName,
}

/// One cookie as exported by a browser extension or supplied over the API.
///
/// Deserialization never fails, so one bad entry never rejects the whole
/// list. A missing or non-string name (or an entry that is not an object at
/// all) becomes an empty name, which [`CookieEntry::validate`] rejects. Scalar
/// values are stringified and an unparsable expiry is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value")]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub path: String,
    /// Expiry as seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

fn default_path() -> String {
    "/".to_string()
}

impl From<serde_json::Value> for CookieEntry {
    fn from(value: serde_json::Value) -> Self {
        let Value::Object(fields) = value else {
            return Self::default();
        };
        let field = |key: &str| fields.get(key);

        Self {
            name: field("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            value: field("value").map(scalar_string).unwrap_or_default(),
            domain: field("domain")
                .and_then(Value::as_str)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            path: field("path")
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
                .map_or_else(default_path, str::to_string),
            expiry: field("expiry")
                .or_else(|| field("expirationDate"))
                .and_then(lenient_expiry),
        }
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn lenient_expiry(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f as i64),
        _ => None,
    }
}

impl CookieEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: default_path(),
            expiry: None,
        }
    }

    /// Check the entry is usable before handing it to the browser.
    pub fn validate(&self) -> Result<(), CookieError> {
        if self.name.trim().is_empty() {
            return Err(CookieError::MissingName);
        }
        Ok(())
    }
}

/// Load a cookie file (JSON array of cookie objects).
///
/// Returns `None` when the file does not exist or cannot be parsed; the
/// caller then proceeds without cookies.
pub fn load_cookie_file(path: &Path) -> Option<Vec<CookieEntry>> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read cookie file {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Vec<CookieEntry>>(&contents) {
        Ok(cookies) => Some(cookies),
        Err(e) => {
            warn!("Failed to parse cookie file {}: {}", path.display(), e);
            None
        }
    }
}
