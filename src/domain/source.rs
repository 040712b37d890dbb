use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::TubeshelfError;
use crate::domain::ContentType;

/// Maximum length, in characters, of a recorded sync error message.
pub const MAX_ERROR_MESSAGE_LEN: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    Youtube,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Youtube => "YOUTUBE",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = TubeshelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "YOUTUBE" => Ok(SourceType::Youtube),
            _ => Err(TubeshelfError::InvalidSourceType(s.to_string())),
        }
    }
}

/// Which classified entry types a source accepts. The flags are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPreferences {
    pub want_videos: bool,
    pub want_shorts: bool,
    pub want_lives: bool,
}

impl Default for ContentPreferences {
    fn default() -> Self {
        Self {
            want_videos: true,
            want_shorts: false,
            want_lives: true,
        }
    }
}

impl ContentPreferences {
    pub fn all() -> Self {
        Self {
            want_videos: true,
            want_shorts: true,
            want_lives: true,
        }
    }

    pub fn accepts(&self, content_type: ContentType) -> bool {
        match content_type {
            ContentType::Video => self.want_videos,
            ContentType::Short => self.want_shorts,
            ContentType::Live => self.want_lives,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub rss_url: Option<String>,
    pub source_type: SourceType,
    pub preferences: ContentPreferences,
    pub active: bool,
    pub category_id: i64,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_http_status: Option<u16>,
    pub error_message: Option<String>,
    pub fail_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// The feed url to sync from, if one was resolved.
    pub fn feed_url(&self) -> Option<&str> {
        self.rss_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// A source about to be persisted.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub rss_url: String,
    pub source_type: SourceType,
    pub preferences: ContentPreferences,
    pub category_id: i64,
}

/// Explicit edits. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub category_id: Option<i64>,
    pub want_videos: Option<bool>,
    pub want_shorts: Option<bool>,
    pub want_lives: Option<bool>,
}

/// Truncate a failure message to what the health fields keep.
pub fn truncate_error_message(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}
