//! CSS locators and page scripts for the x.com feed.

/// One post in the search timeline.
pub const FEED_ITEM: &str = r#"article[data-testid="tweet"]"#;

/// Post body text.
pub const TEXT: &str = r#"div[data-testid="tweetText"]"#;

/// Author display name.
pub const USERNAME: &str = r#"div[dir="auto"] > span"#;

/// Author handle.
pub const HANDLE: &str = r#"div[dir="ltr"]"#;

/// Post timestamp; carries the ISO time in `datetime`.
pub const TIME: &str = "time";

/// The link wrapping the timestamp points at the post permalink.
pub const PERMALINK: &str = "a:has(time)";

/// Attached images served from the media host.
pub const MEDIA_IMAGE: &str = r#"img[src*="twimg.com/media"]"#;

/// Compose button, only rendered for a logged-in session.
pub const LOGIN_SIGNAL: &str = r#"a[href*="/compose"]"#;

pub const SCROLL_HEIGHT_JS: &str = "document.body.scrollHeight";

pub const SCROLL_TO_BOTTOM_JS: &str = "window.scrollTo(0, document.body.scrollHeight)";
