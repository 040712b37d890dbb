use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::app::TubeshelfError;
use crate::domain::ItemStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Video,
    Short,
    Live,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "VIDEO",
            ContentType::Short => "SHORT",
            ContentType::Live => "LIVE",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = TubeshelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VIDEO" => Ok(ContentType::Video),
            "SHORT" => Ok(ContentType::Short),
            "LIVE" => Ok(ContentType::Live),
            _ => Err(TubeshelfError::InvalidContentType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub source_id: i64,
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub duration: Option<u32>,
    pub content_type: ContentType,
}

impl Item {
    /// Generate a deterministic ID from the dedup key (source, link)
    pub fn generate_id(source_id: i64, link: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_id.to_be_bytes());
        hasher.update(link.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// One classified entry headed for an upsert keyed by (source_id, link).
///
/// On conflict the stored title, thumbnail, description and type are
/// refreshed; `pub_date` is only written when the row is created.
#[derive(Debug, Clone)]
pub struct ItemUpsert {
    pub source_id: i64,
    pub link: String,
    pub title: Option<String>,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    pub thumbnail: Option<String>,
    pub content_type: ContentType,
}

impl ItemUpsert {
    pub fn id(&self) -> String {
        Item::generate_id(self.source_id, &self.link)
    }
}

/// An item as served to a profile, annotated with its viewing state.
#[derive(Debug, Clone, Serialize)]
pub struct ListedItem {
    #[serde(flatten)]
    pub item: Item,
    pub source_name: String,
    pub source_category_id: i64,
    pub status: Option<ItemStatus>,
}
