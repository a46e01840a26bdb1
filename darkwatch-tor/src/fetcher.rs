//! Page fetching capability
//!
//! The scan pipeline only sees the [`Fetcher`] trait, so it can run against
//! a real headless browser, a plain HTTP client, or a canned test double.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use thiserror::Error;

/// What a fetch should capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Title, HTML and a screenshot where the fetcher supports one
    Full,
    /// Title and HTML only
    ContentOnly,
}

/// A successfully retrieved page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    /// Rendered title, empty when the page has none
    pub title: String,
    pub html: String,
    /// PNG screenshot bytes
    pub screenshot: Option<Vec<u8>>,
}

/// Errors from fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timeout after {secs} seconds fetching {url}")]
    Timeout { url: String, secs: u64 },

    #[error("Failed to launch renderer: {0}")]
    Launch(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Retrieves a target's rendered content
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedPage, FetchError>;
}

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());

/// Text of the document's `<title>`, trimmed
pub fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn require_http_url(url: &str) -> Result<(), FetchError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(FetchError::InvalidUrl(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title>\n  Hidden   Market \n</title></head><body></body></html>";
        assert_eq!(extract_title(html), "Hidden Market");
        assert_eq!(extract_title("<html><body>none</body></html>"), "");
    }

    #[test]
    fn test_normalize_whitespace() {
        let input = "  hello   world  \n\t  test  ";
        assert_eq!(normalize_whitespace(input), "hello world test");
    }

    #[test]
    fn test_require_http_url() {
        assert!(require_http_url("http://a.onion").is_ok());
        assert!(require_http_url("https://example.com").is_ok());
        assert!(matches!(
            require_http_url("file:///etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));
    }
}
