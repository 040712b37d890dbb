//! Source subscriptions: add, bulk import, edit, soft removal, plus the
//! per-profile item side-state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::app::{Result, TubeshelfError};
use crate::domain::{
    ContentPreferences, ItemStatus, NewCategory, NewSource, Source, SourceType, SourceUpdate,
    StatusUpdate,
};
use crate::fetcher::Fetcher;
use crate::resolver::SourceResolver;
use crate::store::{SourceSummary, Store, UpsertOutcome};

#[derive(Debug, Clone)]
pub struct NewSourceRequest {
    pub name: String,
    pub url: String,
    pub category_id: i64,
    pub source_type: SourceType,
    /// Defaults to videos and lives without shorts.
    pub preferences: Option<ContentPreferences>,
}

/// One row of a bulk import document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportEntry {
    pub name: String,
    pub url: String,
    pub category_name: String,
    #[serde(default, rename = "type")]
    pub source_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum ImportOutcome {
    Created(i64),
    Updated(i64),
    Failed(String),
}

pub struct Catalog<S> {
    store: Arc<S>,
    resolver: SourceResolver,
}

impl<S: Store> Catalog<S> {
    pub fn new(store: Arc<S>, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self {
            store,
            resolver: SourceResolver::new(fetcher),
        }
    }

    /// Resolve the channel's feed and subscribe it. Nothing is stored when
    /// resolution fails.
    pub async fn add_source(&self, request: NewSourceRequest) -> Result<Source> {
        if self.store.get_category(request.category_id)?.is_none() {
            return Err(TubeshelfError::CategoryNotFound(request.category_id));
        }

        let rss_url = self.resolver.resolve(&request.url).await?;

        let id = self.store.add_source(&NewSource {
            name: request.name,
            url: request.url,
            rss_url,
            source_type: request.source_type,
            preferences: request.preferences.unwrap_or_default(),
            category_id: request.category_id,
        })?;

        tracing::info!("Added source {} ({})", id, request.source_type);
        self.store
            .get_source(id)?
            .ok_or(TubeshelfError::SourceNotFound(id))
    }

    /// Import entries one by one; a failing entry is reported and skipped.
    pub async fn import_sources(
        &self,
        profile_id: i64,
        entries: Vec<ImportEntry>,
    ) -> Vec<ImportOutcome> {
        let mut outcomes = Vec::with_capacity(entries.len());

        for entry in entries {
            let name = entry.name.clone();
            let outcome = match self.import_one(profile_id, entry).await {
                Ok(UpsertOutcome::Created(id)) => ImportOutcome::Created(id),
                Ok(UpsertOutcome::Updated(id)) => ImportOutcome::Updated(id),
                Err(e) => {
                    tracing::warn!("Import of {} failed: {}", name, e);
                    ImportOutcome::Failed(e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn import_one(&self, profile_id: i64, entry: ImportEntry) -> Result<UpsertOutcome> {
        let source_type = match entry.source_type.as_deref() {
            Some(raw) => raw.parse::<SourceType>()?,
            None => SourceType::Youtube,
        };

        let category_id = self.find_or_create_category(profile_id, &entry.category_name)?;
        let rss_url = self.resolver.resolve(&entry.url).await?;

        self.store.upsert_source(&NewSource {
            name: entry.name,
            url: entry.url,
            rss_url,
            source_type,
            preferences: ContentPreferences::all(),
            category_id,
        })
    }

    fn find_or_create_category(&self, profile_id: i64, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TubeshelfError::Other("category name is empty".into()));
        }

        match self.store.find_category_by_name(profile_id, name)? {
            Some(category) => {
                if !category.active {
                    self.store.set_category_active(category.id, true)?;
                }
                Ok(category.id)
            }
            None => self.store.add_category(&NewCategory {
                name: name.to_string(),
                parent_id: None,
                profile_id,
            }),
        }
    }

    pub fn update_source(&self, id: i64, update: &SourceUpdate) -> Result<Source> {
        if self.store.get_source(id)?.is_none() {
            return Err(TubeshelfError::SourceNotFound(id));
        }
        if let Some(category_id) = update.category_id {
            if self.store.get_category(category_id)?.is_none() {
                return Err(TubeshelfError::CategoryNotFound(category_id));
            }
        }

        self.store.update_source(id, update)?;
        self.store
            .get_source(id)?
            .ok_or(TubeshelfError::SourceNotFound(id))
    }

    /// Soft removal; the source's items stay queryable.
    pub fn remove_source(&self, id: i64) -> Result<()> {
        self.store.set_source_active(id, false)
    }

    pub fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        self.store.get_all_sources()
    }

    pub fn set_item_status(
        &self,
        profile_id: i64,
        item_id: &str,
        update: &StatusUpdate,
    ) -> Result<ItemStatus> {
        if self.store.get_item(item_id)?.is_none() {
            return Err(TubeshelfError::ItemNotFound(item_id.to_string()));
        }
        self.store.upsert_item_status(profile_id, item_id, update)
    }

    pub fn set_item_duration(&self, item_id: &str, seconds: u32) -> Result<()> {
        self.store.set_item_duration(item_id, seconds)
    }
}
