use chrono::{DateTime, Utc};
use feed_rs::model::Entry as FeedEntry;
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{Result, TubeshelfError};

/// One raw record of a channel feed, prior to classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
    pub description: String,
}

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse a channel feed into entries, in document order.
    ///
    /// A feed without entries yields an empty list. Malformed documents fail
    /// with [`TubeshelfError::FeedParse`].
    pub fn parse(&self, body: &[u8]) -> Result<Vec<Entry>> {
        let feed = parser::parse(body).map_err(|e| TubeshelfError::FeedParse(e.to_string()))?;

        Ok(feed.entries.into_iter().map(Self::normalize_entry).collect())
    }

    fn normalize_entry(entry: FeedEntry) -> Entry {
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone());

        let group = entry.media.first();
        let thumbnail_url = group
            .and_then(|m| m.thumbnails.first())
            .map(|t| t.image.uri.clone());
        let description = group
            .and_then(|m| m.description.as_ref())
            .map(|d| d.content.clone())
            .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
            .unwrap_or_default();

        Entry {
            title: entry
                .title
                .map(|t| decode_html_entities(&t.content).to_string()),
            link,
            published_at: entry
                .published
                .or(entry.updated)
                .map(|dt| dt.with_timezone(&Utc)),
            thumbnail_url,
            description,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const CHANNEL_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
  <title>Test Channel</title>
  <entry>
    <id>yt:video:1</id>
    <yt:videoId>1</yt:videoId>
    <title>Regular upload &amp; more</title>
    <link rel="alternate" href="https://www.youtube.com/watch?v=1"/>
    <published>2024-03-01T12:00:00+00:00</published>
    <updated>2024-03-02T12:00:00+00:00</updated>
    <media:group>
      <media:title>Regular upload</media:title>
      <media:content url="https://www.youtube.com/v/1" type="application/x-shockwave-flash" width="640" height="390"/>
      <media:thumbnail url="https://i.ytimg.com/vi/1/hqdefault.jpg" width="480" height="360"/>
      <media:description>First description</media:description>
    </media:group>
  </entry>
  <entry>
    <id>yt:video:2</id>
    <title>A short</title>
    <link rel="alternate" href="https://www.youtube.com/shorts/2"/>
    <published>2024-03-01T11:00:00+00:00</published>
    <media:group>
      <media:thumbnail url="https://i.ytimg.com/vi/2/hqdefault.jpg" width="480" height="360"/>
      <media:description>Second description</media:description>
    </media:group>
  </entry>
</feed>"#;

    const SINGLE_ENTRY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:media="http://search.yahoo.com/mrss/" xmlns="http://www.w3.org/2005/Atom">
  <title>Single</title>
  <entry>
    <id>yt:video:9</id>
    <title>Only one</title>
    <link rel="alternate" href="https://www.youtube.com/live/9"/>
    <published>2024-03-01T10:00:00+00:00</published>
  </entry>
</feed>"#;

    const EMPTY_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Nothing yet</title>
</feed>"#;

    #[test]
    fn test_parse_channel_feed() {
        let entries = Normalizer::new().parse(CHANNEL_FEED.as_bytes()).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("Regular upload & more"));
        assert_eq!(
            entries[0].link.as_deref(),
            Some("https://www.youtube.com/watch?v=1")
        );
        assert_eq!(
            entries[0].thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/1/hqdefault.jpg")
        );
        assert_eq!(entries[0].description, "First description");
        assert_eq!(
            entries[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(
            entries[1].link.as_deref(),
            Some("https://www.youtube.com/shorts/2")
        );
    }

    #[test]
    fn test_single_entry_is_a_sequence_of_one() {
        let entries = Normalizer::new()
            .parse(SINGLE_ENTRY_FEED.as_bytes())
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title.as_deref(), Some("Only one"));
        assert_eq!(entries[0].thumbnail_url, None);
        assert_eq!(entries[0].description, "");
    }

    #[test]
    fn test_feed_without_entries_is_empty() {
        let entries = Normalizer::new().parse(EMPTY_FEED.as_bytes()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err = Normalizer::new()
            .parse(b"<html><body>not a feed")
            .unwrap_err();
        assert!(matches!(err, TubeshelfError::FeedParse(_)));
    }
}
