//! Channel URL to feed URL resolution.
//!
//! Runs once when a source is created or imported; the resolved url is
//! persisted and never re-resolved by sync cycles.

use std::sync::{Arc, OnceLock};

use html_escape::decode_html_entities;
use regex::Regex;
use url::Url;

use crate::app::{Result, TubeshelfError};
use crate::fetcher::Fetcher;

/// Path fragment that marks a url as already being a channel feed.
pub const FEED_PATH_MARKER: &str = "videos.xml";

const FEED_LINK_TYPE: &str = "application/rss+xml";

fn link_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)<link\b[^>]*>").expect("valid link tag pattern"))
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid attribute pattern")
    })
}

pub struct SourceResolver {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
}

impl SourceResolver {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self { fetcher }
    }

    /// Turn a user-supplied channel url into its canonical feed url.
    pub async fn resolve(&self, raw_url: &str) -> Result<String> {
        let raw_url = raw_url.trim();
        if raw_url.contains(FEED_PATH_MARKER) {
            return Ok(raw_url.to_string());
        }

        let response = self
            .fetcher
            .fetch(raw_url)
            .await
            .map_err(|e| TubeshelfError::Resolution {
                url: raw_url.to_string(),
                reason: e.to_string(),
            })?;

        let html = String::from_utf8_lossy(&response.body);
        let href = find_feed_link(&html).ok_or_else(|| TubeshelfError::Resolution {
            url: raw_url.to_string(),
            reason: "no RSS feed link found on the page".to_string(),
        })?;

        let resolved = absolutize(raw_url, &href);
        tracing::debug!("Resolved {} to {}", raw_url, resolved);
        Ok(resolved)
    }
}

/// Find the href of the first `<link rel="alternate" type="application/rss+xml">`.
pub fn find_feed_link(html: &str) -> Option<String> {
    link_tag_pattern().find_iter(html).find_map(|tag| {
        let mut rel = None;
        let mut kind = None;
        let mut href = None;

        for cap in attribute_pattern().captures_iter(tag.as_str()) {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| decode_html_entities(m.as_str()).to_string())
                .unwrap_or_default();
            match cap[1].to_ascii_lowercase().as_str() {
                "rel" => rel = Some(value),
                "type" => kind = Some(value),
                "href" => href = Some(value),
                _ => {}
            }
        }

        let is_alternate = rel
            .as_deref()
            .map(|r| r.split_whitespace().any(|t| t.eq_ignore_ascii_case("alternate")))
            .unwrap_or(false);
        let is_feed = kind
            .as_deref()
            .map(|t| t.trim().eq_ignore_ascii_case(FEED_LINK_TYPE))
            .unwrap_or(false);

        if is_alternate && is_feed {
            href.filter(|h| !h.trim().is_empty())
        } else {
            None
        }
    })
}

fn absolutize(page_url: &str, href: &str) -> String {
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::fetcher::FetchResponse;

    struct PanickingFetcher;

    #[async_trait]
    impl Fetcher for PanickingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            panic!("fast path should not fetch {}", url);
        }
    }

    #[test]
    fn test_direct_feed_url_skips_network() {
        let resolver = SourceResolver::new(Arc::new(PanickingFetcher));
        let url = "https://www.youtube.com/feeds/videos.xml?channel_id=UC123";
        let resolved = tokio_test::block_on(resolver.resolve(url)).unwrap();
        assert_eq!(resolved, url);
    }

    #[test]
    fn test_find_feed_link() {
        let html = r#"<html><head>
            <link rel="canonical" href="https://www.youtube.com/@rust">
            <link rel="alternate" type="application/rss+xml" title="RSS"
                  href="https://www.youtube.com/feeds/videos.xml?channel_id=UC123&amp;x=1">
            </head></html>"#;
        assert_eq!(
            find_feed_link(html).as_deref(),
            Some("https://www.youtube.com/feeds/videos.xml?channel_id=UC123&x=1")
        );
    }

    #[test]
    fn test_find_feed_link_attribute_order_and_quotes() {
        let html = "<LINK href='/feeds/videos.xml?channel_id=UC9' TYPE='application/rss+xml' rel='alternate'/>";
        assert_eq!(
            find_feed_link(html).as_deref(),
            Some("/feeds/videos.xml?channel_id=UC9")
        );
    }

    #[test]
    fn test_find_feed_link_ignores_other_alternates() {
        let html = r#"<link rel="alternate" type="application/json+oembed" href="https://example.com/oembed">"#;
        assert_eq!(find_feed_link(html), None);
    }

    #[test]
    fn test_absolutize_relative_href() {
        assert_eq!(
            absolutize("https://www.youtube.com/@rust", "/feeds/videos.xml?channel_id=UC9"),
            "https://www.youtube.com/feeds/videos.xml?channel_id=UC9"
        );
        assert_eq!(
            absolutize("https://www.youtube.com/@rust", "https://other.example/feed"),
            "https://other.example/feed"
        );
    }
}
