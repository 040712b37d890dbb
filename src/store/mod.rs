pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::Result;
use crate::domain::{
    Category, CategoryUpdate, ContentType, Item, ItemStatus, ItemUpsert, ListedItem, NewCategory,
    NewSource, Source, SourceUpdate, StatusUpdate,
};

pub use sqlite::SqliteStore;

/// Position of an item in the listing order `pub_date DESC, id DESC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    pub pub_date: DateTime<Utc>,
    pub id: String,
}

impl From<&Item> for ItemKey {
    fn from(item: &Item) -> Self {
        Self {
            pub_date: item.pub_date,
            id: item.id.clone(),
        }
    }
}

/// Fully resolved item listing predicate. All conditions are conjunctive.
#[derive(Debug, Clone)]
pub struct ItemListQuery {
    pub profile_id: i64,
    pub source_id: Option<i64>,
    /// Owning categories to match, already widened to their families.
    pub category_ids: Option<Vec<i64>>,
    pub content_type: Option<ContentType>,
    pub search: Option<String>,
    pub search_source_names: bool,
    pub unread_only: bool,
    /// Resume strictly after this key.
    pub after: Option<ItemKey>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    #[serde(flatten)]
    pub source: Source,
    pub item_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

pub trait Store {
    // Category operations
    fn add_category(&self, category: &NewCategory) -> Result<i64>;
    fn get_category(&self, id: i64) -> Result<Option<Category>>;
    fn find_category_by_name(&self, profile_id: i64, name: &str) -> Result<Option<Category>>;
    fn get_categories(&self, profile_id: i64, include_inactive: bool) -> Result<Vec<Category>>;
    fn update_category(&self, id: i64, update: &CategoryUpdate) -> Result<()>;
    fn set_category_active(&self, id: i64, active: bool) -> Result<()>;

    // Source operations
    fn add_source(&self, source: &NewSource) -> Result<i64>;
    /// Insert by (category_id, rss_url) or re-activate the existing row.
    fn upsert_source(&self, source: &NewSource) -> Result<UpsertOutcome>;
    fn get_source(&self, id: i64) -> Result<Option<Source>>;
    fn get_all_sources(&self) -> Result<Vec<SourceSummary>>;
    /// Active sources of a syncable type.
    fn get_syncable_sources(&self) -> Result<Vec<Source>>;
    fn update_source(&self, id: i64, update: &SourceUpdate) -> Result<()>;
    fn set_source_active(&self, id: i64, active: bool) -> Result<()>;
    fn record_sync_success(&self, id: i64, http_status: u16, at: DateTime<Utc>) -> Result<()>;
    fn record_sync_failure(
        &self,
        id: i64,
        http_status: u16,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // Item operations
    fn upsert_items(&self, items: &[ItemUpsert]) -> Result<usize>;
    fn get_item(&self, id: &str) -> Result<Option<Item>>;
    fn get_items_by_source(&self, source_id: i64) -> Result<Vec<Item>>;
    fn set_item_duration(&self, id: &str, seconds: u32) -> Result<()>;
    fn list_items(&self, query: &ItemListQuery) -> Result<Vec<ListedItem>>;

    // Status operations
    fn get_item_status(&self, profile_id: i64, item_id: &str) -> Result<Option<ItemStatus>>;
    fn upsert_item_status(
        &self,
        profile_id: i64,
        item_id: &str,
        update: &StatusUpdate,
    ) -> Result<ItemStatus>;
}
