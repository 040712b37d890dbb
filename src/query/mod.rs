//! Filtered, cursor-paginated item listing.

use std::sync::Arc;

use serde::Serialize;

use crate::app::{Result, TubeshelfError};
use crate::category::CategoryService;
use crate::domain::{ContentType, ListedItem};
use crate::store::{ItemKey, ItemListQuery, Store};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

/// Optional, conjunctive item filters for one requesting profile.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub profile_id: i64,
    pub source_id: Option<i64>,
    /// Matches sources owned by this category or any category nested under it.
    pub category_id: Option<i64>,
    pub content_type: Option<ContentType>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    /// Let `search` also match the source name.
    pub search_source_names: bool,
    pub unread_only: bool,
}

impl ItemFilter {
    pub fn for_profile(profile_id: i64) -> Self {
        Self {
            profile_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemPage {
    pub items: Vec<ListedItem>,
    pub next_cursor: Option<String>,
}

pub struct ItemQueryService<S> {
    store: Arc<S>,
    categories: CategoryService<S>,
}

impl<S: Store> ItemQueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            categories: CategoryService::new(store.clone()),
            store,
        }
    }

    /// List items newest first, resuming after `cursor` when given.
    ///
    /// `next_cursor` is the id of the last item when a full page was
    /// returned. A `limit` of zero selects [`DEFAULT_PAGE_SIZE`].
    pub fn list(&self, filter: &ItemFilter, cursor: Option<&str>, limit: usize) -> Result<ItemPage> {
        let limit = match limit {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        };

        let after = match cursor {
            Some(id) => {
                let item = self
                    .store
                    .get_item(id)?
                    .ok_or_else(|| TubeshelfError::InvalidCursor(id.to_string()))?;
                Some(ItemKey::from(&item))
            }
            None => None,
        };

        let category_ids = match filter.category_id {
            Some(id) => Some(self.categories.family_ids(id)?.into_iter().collect()),
            None => None,
        };

        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let items = self.store.list_items(&ItemListQuery {
            profile_id: filter.profile_id,
            source_id: filter.source_id,
            category_ids,
            content_type: filter.content_type,
            search,
            search_source_names: filter.search_source_names,
            unread_only: filter.unread_only,
            after,
            limit,
        })?;

        let next_cursor = if items.len() == limit {
            items.last().map(|i| i.item.id.clone())
        } else {
            None
        };

        Ok(ItemPage { items, next_cursor })
    }
}
