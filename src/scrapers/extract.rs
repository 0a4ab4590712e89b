//! Field extraction from a single feed element.
//!
//! Every field is read on its own. A missing locator or a failing browser
//! call leaves that field at its default (`""` or empty list) and the rest
//! of the post is still extracted. Only an element that cannot be read at
//! all (detached, session gone) is reported to the caller.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;
use url::Url;

use super::selectors;
use crate::browser::{BrowserError, FeedElement};
use crate::models::Post;

/// Fallback text length when no dedicated text node exists.
pub const FALLBACK_TEXT_CHARS: usize = 500;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\w+)").expect("valid hashtag regex"));
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));

/// Extract a post from one feed element. Never fails; an unreadable
/// element yields an empty post.
pub async fn extract(element: &dyn FeedElement, base_url: &str) -> Post {
    read_post(element, base_url).await.unwrap_or_default()
}

/// Extract a post, failing only when the element itself cannot be read.
///
/// Relative permalinks are resolved against `base_url`.
pub async fn read_post(element: &dyn FeedElement, base_url: &str) -> Result<Post, BrowserError> {
    let full_text = element.text().await?;
    let text = extract_text(element, &full_text).await;
    let (timestamp, href) = extract_time_and_link(element).await;

    Ok(Post {
        username: child_text(element, selectors::USERNAME).await,
        handle: child_text(element, selectors::HANDLE).await,
        timestamp,
        media_urls: extract_media(element).await,
        hashtags: hashtags(&text),
        mentions: mentions(&text),
        url: canonical_url(base_url, &href),
        text,
    })
}

/// Resolve `href` against `base_url`. Empty stays empty; an unparsable base
/// leaves `href` as it is.
pub fn canonical_url(base_url: &str, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }
    match Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(e) => {
            trace!("Could not resolve {} against {}: {}", href, base_url, e);
            href.to_string()
        }
    }
}

/// Hashtags in order of appearance, duplicates kept.
pub fn hashtags(text: &str) -> Vec<String> {
    captures(&HASHTAG_RE, text)
}

/// Mentions in order of appearance, duplicates kept.
pub fn mentions(text: &str) -> Vec<String> {
    captures(&MENTION_RE, text)
}

fn captures(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

async fn first_child(
    element: &dyn FeedElement,
    selector: &str,
) -> Result<Option<Box<dyn FeedElement>>, BrowserError> {
    Ok(element.find_all(selector).await?.into_iter().next())
}

async fn child_text(element: &dyn FeedElement, selector: &str) -> String {
    let result = match first_child(element, selector).await {
        Ok(Some(child)) => child.text().await,
        Ok(None) => return String::new(),
        Err(e) => Err(e),
    };
    result.unwrap_or_else(|e| {
        trace!("Field {} unavailable: {}", selector, e);
        String::new()
    })
}

async fn extract_text(element: &dyn FeedElement, full_text: &str) -> String {
    if let Ok(Some(node)) = first_child(element, selectors::TEXT).await {
        if let Ok(text) = node.text().await {
            return text;
        }
    }
    full_text.chars().take(FALLBACK_TEXT_CHARS).collect()
}

async fn extract_time_and_link(element: &dyn FeedElement) -> (String, String) {
    let timestamp = match first_child(element, selectors::TIME).await {
        Ok(Some(time)) => time.attribute("datetime").await.ok().flatten(),
        _ => None,
    };
    let url = match first_child(element, selectors::PERMALINK).await {
        Ok(Some(link)) => link.attribute("href").await.ok().flatten(),
        _ => None,
    };
    (timestamp.unwrap_or_default(), url.unwrap_or_default())
}

async fn extract_media(element: &dyn FeedElement) -> Vec<String> {
    let images = match element.find_all(selectors::MEDIA_IMAGE).await {
        Ok(images) => images,
        Err(_) => return Vec::new(),
    };
    let mut media = Vec::new();
    for image in images {
        if let Ok(Some(src)) = image.attribute("src").await {
            if !src.is_empty() && !media.contains(&src) {
                media.push(src);
            }
        }
    }
    media
}
