//! Data models shared across the crawler, sink and control plane.

mod cookie;
mod post;

pub use cookie::{load_cookie_file, CookieEntry, CookieError};
pub use post::{DedupKey, Post};
