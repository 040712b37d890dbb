//! Feed synchronization: fetch, parse, classify and upsert per source, with
//! health bookkeeping and failure isolation across bulk runs.

pub mod single_flight;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::app::{Result, TubeshelfError};
use crate::classifier::{classify, should_skip};
use crate::domain::source::truncate_error_message;
use crate::domain::{ItemUpsert, Source};
use crate::fetcher::Fetcher;
use crate::normalizer::{Entry, Normalizer};
use crate::store::Store;

pub use single_flight::SourceLocks;

pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub items_processed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub success_count: usize,
    pub failure_count: usize,
}

pub struct SyncOrchestrator<S> {
    store: Arc<S>,
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    normalizer: Normalizer,
    semaphore: Arc<Semaphore>,
    locks: Arc<SourceLocks>,
}

impl<S> Clone for SyncOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            fetcher: self.fetcher.clone(),
            normalizer: self.normalizer.clone(),
            semaphore: self.semaphore.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<S: Store + Send + Sync + 'static> SyncOrchestrator<S> {
    pub fn new(store: Arc<S>, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Self {
        Self::with_workers(store, fetcher, DEFAULT_WORKERS)
    }

    pub fn with_workers(
        store: Arc<S>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        workers: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            normalizer: Normalizer::new(),
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            locks: Arc::new(SourceLocks::new()),
        }
    }

    /// Run one sync cycle for a source.
    ///
    /// Failures are recorded into the source's health fields and then
    /// returned. A source without a feed url is a no-op.
    pub async fn sync_source(&self, source: &Source) -> Result<SyncReport> {
        let Some(feed_url) = source.feed_url() else {
            tracing::debug!("Source {} has no feed url, nothing to sync", source.id);
            return Ok(SyncReport { items_processed: 0 });
        };

        let _guard = self.locks.acquire(source.id).await;

        match self.run_cycle(source, feed_url).await {
            Ok((http_status, items_processed)) => {
                self.store
                    .record_sync_success(source.id, http_status, Utc::now())?;
                tracing::info!(
                    "[{}] Synced. Items processed: {}",
                    source.name,
                    items_processed
                );
                Ok(SyncReport { items_processed })
            }
            Err(e) => {
                tracing::warn!("[{}] Sync failed: {}", source.name, e);
                let message = truncate_error_message(&e.to_string());
                if let Err(record_err) =
                    self.store
                        .record_sync_failure(source.id, e.http_status(), &message, Utc::now())
                {
                    tracing::error!(
                        "[{}] Could not record sync failure: {}",
                        source.name,
                        record_err
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn sync_source_by_id(&self, source_id: i64) -> Result<SyncReport> {
        let source = self
            .store
            .get_source(source_id)?
            .ok_or(TubeshelfError::SourceNotFound(source_id))?;
        self.sync_source(&source).await
    }

    /// Sync every given source concurrently and tally the outcomes once
    /// all of them have settled. One source failing never affects another.
    pub async fn sync_all(&self, sources: Vec<Source>) -> SyncSummary {
        let mut handles = Vec::with_capacity(sources.len());

        for source in sources {
            let this = self.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match this.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return Err(TubeshelfError::Other(e.to_string())),
                };
                this.sync_source(&source).await
            }));
        }

        let mut summary = SyncSummary::default();
        for outcome in join_all(handles).await {
            match outcome {
                Ok(Ok(_)) => summary.success_count += 1,
                Ok(Err(_)) => summary.failure_count += 1,
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                    summary.failure_count += 1;
                }
            }
        }

        summary
    }

    /// Sync all active sources of a supported type.
    pub async fn sync_catalog(&self) -> Result<SyncSummary> {
        let sources = self.store.get_syncable_sources()?;
        if sources.is_empty() {
            tracing::info!("No sources to sync");
            return Ok(SyncSummary::default());
        }

        let start = Utc::now();
        let summary = self.sync_all(sources).await;
        let elapsed = Utc::now().signed_duration_since(start);
        tracing::info!(
            "Sync complete: {} succeeded, {} failed ({:.1}s)",
            summary.success_count,
            summary.failure_count,
            elapsed.num_milliseconds() as f64 / 1000.0
        );

        Ok(summary)
    }

    async fn run_cycle(&self, source: &Source, feed_url: &str) -> Result<(u16, usize)> {
        let response = self.fetcher.fetch(feed_url).await?;
        let entries = self.normalizer.parse(&response.body)?;
        let upserts = Self::accepted_items(source, entries);
        let processed = self.upsert_with_retry(&upserts)?;
        Ok((response.status, processed))
    }

    /// Classify entries and keep those the source accepts, in feed order.
    fn accepted_items(source: &Source, entries: Vec<Entry>) -> Vec<ItemUpsert> {
        let now = Utc::now();

        entries
            .into_iter()
            .filter_map(|entry| {
                let link = match entry.link {
                    Some(link) if !link.trim().is_empty() => link,
                    _ => {
                        tracing::debug!("[{}] Skipping entry without link", source.name);
                        return None;
                    }
                };

                let content_type = classify(&link);
                if should_skip(content_type, &source.preferences) {
                    tracing::debug!("[{}] Skipping {} {}", source.name, content_type, link);
                    return None;
                }

                Some(ItemUpsert {
                    source_id: source.id,
                    link,
                    title: entry.title,
                    description: entry.description,
                    pub_date: entry.published_at.unwrap_or(now),
                    thumbnail: entry.thumbnail_url,
                    content_type,
                })
            })
            .collect()
    }

    fn upsert_with_retry(&self, items: &[ItemUpsert]) -> Result<usize> {
        match self.store.upsert_items(items) {
            Err(TubeshelfError::Conflict(reason)) => {
                tracing::warn!("Upsert conflict ({}), retrying once", reason);
                self.store.upsert_items(items)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use chrono::DateTime;

    use super::*;
    use crate::domain::{
        Category, CategoryUpdate, ContentPreferences, ContentType, Item, ItemStatus, ListedItem,
        NewCategory, NewSource, SourceType, SourceUpdate, StatusUpdate,
    };
    use crate::fetcher::FetchResponse;
    use crate::store::{ItemListQuery, SourceSummary, SqliteStore, UpsertOutcome};

    enum Reply {
        Body(String),
        Status(u16),
    }

    struct StaticFetcher {
        replies: HashMap<String, Reply>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(replies: Vec<(&str, Reply)>) -> Self {
            Self {
                replies: replies
                    .into_iter()
                    .map(|(url, reply)| (url.to_string(), reply))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.get(url) {
                Some(Reply::Body(body)) => Ok(FetchResponse {
                    status: 200,
                    body: body.as_bytes().to_vec(),
                }),
                Some(Reply::Status(code)) => Err(TubeshelfError::Fetch {
                    status: Some(*code),
                    message: format!("HTTP Error {}", code),
                }),
                None => Err(TubeshelfError::Fetch {
                    status: None,
                    message: "connection refused".into(),
                }),
            }
        }
    }

    fn feed(links: &[&str]) -> String {
        let entries: String = links
            .iter()
            .enumerate()
            .map(|(n, link)| {
                format!(
                    r#"<entry>
    <id>yt:video:{n}</id>
    <title>Entry {n}</title>
    <link rel="alternate" href="https://www.youtube.com{link}"/>
    <published>2024-02-0{day}T00:00:00+00:00</published>
  </entry>"#,
                    n = n,
                    link = link,
                    day = n + 1
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Channel</title>
  {}
</feed>"#,
            entries
        )
    }

    fn setup(preferences: ContentPreferences, rss_url: &str) -> (Arc<SqliteStore>, Source) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let category_id = store
            .add_category(&NewCategory {
                name: "Tech".into(),
                parent_id: None,
                profile_id: 1,
            })
            .unwrap();
        let id = store
            .add_source(&NewSource {
                name: "Channel".into(),
                url: "https://www.youtube.com/@channel".into(),
                rss_url: rss_url.into(),
                source_type: SourceType::Youtube,
                preferences,
                category_id,
            })
            .unwrap();
        let source = store.get_source(id).unwrap().unwrap();
        (store, source)
    }

    const FEED_URL: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=UC1";

    #[tokio::test]
    async fn test_sync_skips_unwanted_types() {
        let prefs = ContentPreferences {
            want_videos: true,
            want_shorts: false,
            want_lives: true,
        };
        let (store, source) = setup(prefs, FEED_URL);
        let fetcher = Arc::new(StaticFetcher::new(vec![(
            FEED_URL,
            Reply::Body(feed(&["/watch?v=1", "/shorts/2", "/live/3"])),
        )]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        let report = orchestrator.sync_source(&source).await.unwrap();
        assert_eq!(report.items_processed, 2);

        let items = store.get_items_by_source(source.id).unwrap();
        let mut types: Vec<ContentType> = items.iter().map(|i| i.content_type).collect();
        types.sort_by_key(|t| t.as_str());
        assert_eq!(types, vec![ContentType::Live, ContentType::Video]);
        assert!(items
            .iter()
            .all(|i| i.id == crate::domain::Item::generate_id(source.id, &i.link)));
    }

    #[tokio::test]
    async fn test_sync_twice_is_idempotent() {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        let fetcher = Arc::new(StaticFetcher::new(vec![(
            FEED_URL,
            Reply::Body(feed(&["/watch?v=1", "/watch?v=2"])),
        )]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        orchestrator.sync_source(&source).await.unwrap();
        let second = orchestrator.sync_source(&source).await.unwrap();

        assert_eq!(second.items_processed, 2);
        assert_eq!(store.get_items_by_source(source.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_updates_health_and_propagates() {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        let fetcher = Arc::new(StaticFetcher::new(vec![(FEED_URL, Reply::Status(503))]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        let err = orchestrator.sync_source(&source).await.unwrap_err();
        assert_eq!(err.http_status(), 503);

        let after = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(after.fail_count, 1);
        assert_eq!(after.last_http_status, Some(503));
        assert!(after.error_message.is_some());
        assert!(after.last_fetch.is_some());
        assert!(after.active);
        assert!(store.get_items_by_source(source.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_leaves_inactive_source_inactive() {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        store.set_source_active(source.id, false).unwrap();
        let source = store.get_source(source.id).unwrap().unwrap();
        let fetcher = Arc::new(StaticFetcher::new(vec![]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        assert!(orchestrator.sync_source(&source).await.is_err());

        let after = store.get_source(source.id).unwrap().unwrap();
        assert!(!after.active);
        assert_eq!(after.last_http_status, Some(500));
    }

    #[tokio::test]
    async fn test_parse_failure_is_recorded() {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        let fetcher = Arc::new(StaticFetcher::new(vec![(
            FEED_URL,
            Reply::Body("<html>oops".into()),
        )]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        let err = orchestrator.sync_source(&source).await.unwrap_err();
        assert!(matches!(err, TubeshelfError::FeedParse(_)));

        let after = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(after.fail_count, 1);
        assert_eq!(after.last_http_status, Some(500));
    }

    #[tokio::test]
    async fn test_success_resets_health_and_reactivates() {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        store
            .record_sync_failure(source.id, 503, "HTTP Error 503", Utc::now())
            .unwrap();
        store.set_source_active(source.id, false).unwrap();

        let fetcher = Arc::new(StaticFetcher::new(vec![(
            FEED_URL,
            Reply::Body(feed(&["/watch?v=1"])),
        )]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);
        orchestrator.sync_source_by_id(source.id).await.unwrap();

        let after = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(after.fail_count, 0);
        assert_eq!(after.last_http_status, Some(200));
        assert!(after.error_message.is_none());
        assert!(after.active);
    }

    #[tokio::test]
    async fn test_source_without_feed_url_is_noop() {
        let (store, source) = setup(ContentPreferences::all(), "");
        let fetcher = Arc::new(StaticFetcher::new(vec![]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher.clone());

        let report = orchestrator.sync_source(&source).await.unwrap();
        assert_eq!(report.items_processed, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(store.get_source(source.id).unwrap().unwrap().last_fetch.is_none());
    }

    #[tokio::test]
    async fn test_sync_all_isolates_failures() {
        let (store, good) = setup(ContentPreferences::all(), FEED_URL);
        let bad_id = store
            .add_source(&NewSource {
                name: "Broken".into(),
                url: "https://www.youtube.com/@broken".into(),
                rss_url: "https://www.youtube.com/feeds/videos.xml?channel_id=BROKEN".into(),
                source_type: SourceType::Youtube,
                preferences: ContentPreferences::all(),
                category_id: good.category_id,
            })
            .unwrap();
        let bad = store.get_source(bad_id).unwrap().unwrap();

        let fetcher = Arc::new(StaticFetcher::new(vec![(
            FEED_URL,
            Reply::Body(feed(&["/watch?v=1", "/watch?v=2"])),
        )]));
        let orchestrator = SyncOrchestrator::with_workers(store.clone(), fetcher, 1);

        let summary = orchestrator.sync_all(vec![good.clone(), bad]).await;
        assert_eq!(
            summary,
            SyncSummary {
                success_count: 1,
                failure_count: 1
            }
        );
        assert_eq!(store.get_items_by_source(good.id).unwrap().len(), 2);
        assert_eq!(store.get_source(bad_id).unwrap().unwrap().fail_count, 1);
    }

    #[tokio::test]
    async fn test_sync_catalog_skips_inactive_sources() {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        store.set_source_active(source.id, false).unwrap();
        let fetcher = Arc::new(StaticFetcher::new(vec![]));
        let orchestrator = SyncOrchestrator::new(store, fetcher.clone());

        let summary = orchestrator.sync_catalog().await.unwrap();
        assert_eq!(summary, SyncSummary::default());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_syncs_of_one_source_keep_health_consistent() {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        let fetcher = Arc::new(StaticFetcher::new(vec![(FEED_URL, Reply::Status(502))]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        let summary = orchestrator
            .sync_all(vec![source.clone(), source.clone(), source.clone()])
            .await;
        assert_eq!(summary.failure_count, 3);
        assert_eq!(store.get_source(source.id).unwrap().unwrap().fail_count, 3);
    }

    /// Fails the first `conflicts` item upserts, then delegates.
    struct ConflictingStore {
        inner: SqliteStore,
        conflicts: AtomicUsize,
        upserts: AtomicUsize,
    }

    impl ConflictingStore {
        fn new(inner: SqliteStore, conflicts: usize) -> Self {
            Self {
                inner,
                conflicts: AtomicUsize::new(conflicts),
                upserts: AtomicUsize::new(0),
            }
        }
    }

    impl Store for ConflictingStore {
        fn add_category(&self, category: &NewCategory) -> Result<i64> {
            self.inner.add_category(category)
        }
        fn get_category(&self, id: i64) -> Result<Option<Category>> {
            self.inner.get_category(id)
        }
        fn find_category_by_name(&self, profile_id: i64, name: &str) -> Result<Option<Category>> {
            self.inner.find_category_by_name(profile_id, name)
        }
        fn get_categories(&self, profile_id: i64, include_inactive: bool) -> Result<Vec<Category>> {
            self.inner.get_categories(profile_id, include_inactive)
        }
        fn update_category(&self, id: i64, update: &CategoryUpdate) -> Result<()> {
            self.inner.update_category(id, update)
        }
        fn set_category_active(&self, id: i64, active: bool) -> Result<()> {
            self.inner.set_category_active(id, active)
        }
        fn add_source(&self, source: &NewSource) -> Result<i64> {
            self.inner.add_source(source)
        }
        fn upsert_source(&self, source: &NewSource) -> Result<UpsertOutcome> {
            self.inner.upsert_source(source)
        }
        fn get_source(&self, id: i64) -> Result<Option<Source>> {
            self.inner.get_source(id)
        }
        fn get_all_sources(&self) -> Result<Vec<SourceSummary>> {
            self.inner.get_all_sources()
        }
        fn get_syncable_sources(&self) -> Result<Vec<Source>> {
            self.inner.get_syncable_sources()
        }
        fn update_source(&self, id: i64, update: &SourceUpdate) -> Result<()> {
            self.inner.update_source(id, update)
        }
        fn set_source_active(&self, id: i64, active: bool) -> Result<()> {
            self.inner.set_source_active(id, active)
        }
        fn record_sync_success(&self, id: i64, http_status: u16, at: DateTime<Utc>) -> Result<()> {
            self.inner.record_sync_success(id, http_status, at)
        }
        fn record_sync_failure(
            &self,
            id: i64,
            http_status: u16,
            message: &str,
            at: DateTime<Utc>,
        ) -> Result<()> {
            self.inner.record_sync_failure(id, http_status, message, at)
        }
        fn upsert_items(&self, items: &[ItemUpsert]) -> Result<usize> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(TubeshelfError::Conflict("items.source_id, items.link".into()));
            }
            self.inner.upsert_items(items)
        }
        fn get_item(&self, id: &str) -> Result<Option<Item>> {
            self.inner.get_item(id)
        }
        fn get_items_by_source(&self, source_id: i64) -> Result<Vec<Item>> {
            self.inner.get_items_by_source(source_id)
        }
        fn set_item_duration(&self, id: &str, seconds: u32) -> Result<()> {
            self.inner.set_item_duration(id, seconds)
        }
        fn list_items(&self, query: &ItemListQuery) -> Result<Vec<ListedItem>> {
            self.inner.list_items(query)
        }
        fn get_item_status(&self, profile_id: i64, item_id: &str) -> Result<Option<ItemStatus>> {
            self.inner.get_item_status(profile_id, item_id)
        }
        fn upsert_item_status(
            &self,
            profile_id: i64,
            item_id: &str,
            update: &StatusUpdate,
        ) -> Result<ItemStatus> {
            self.inner.upsert_item_status(profile_id, item_id, update)
        }
    }

    fn conflicting_setup(conflicts: usize) -> (Arc<ConflictingStore>, Source) {
        let (store, source) = setup(ContentPreferences::all(), FEED_URL);
        let inner = Arc::try_unwrap(store).ok().unwrap();
        (Arc::new(ConflictingStore::new(inner, conflicts)), source)
    }

    #[tokio::test]
    async fn test_single_upsert_conflict_is_retried() {
        let (store, source) = conflicting_setup(1);
        let fetcher = Arc::new(StaticFetcher::new(vec![(
            FEED_URL,
            Reply::Body(feed(&["/watch?v=1", "/watch?v=2"])),
        )]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        let report = orchestrator.sync_source(&source).await.unwrap();
        assert_eq!(report.items_processed, 2);
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);

        let after = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(after.fail_count, 0);
        assert_eq!(store.get_items_by_source(source.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_upsert_conflict_is_recorded() {
        let (store, source) = conflicting_setup(2);
        let fetcher = Arc::new(StaticFetcher::new(vec![(
            FEED_URL,
            Reply::Body(feed(&["/watch?v=1"])),
        )]));
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);

        let err = orchestrator.sync_source(&source).await.unwrap_err();
        assert!(matches!(err, TubeshelfError::Conflict(_)));
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);

        let after = store.get_source(source.id).unwrap().unwrap();
        assert_eq!(after.fail_count, 1);
        assert_eq!(after.last_http_status, Some(500));
        assert!(after.error_message.unwrap().contains("conflict"));
        assert!(store.get_items_by_source(source.id).unwrap().is_empty());
    }

    #[test]
    fn test_entries_without_link_are_dropped() {
        let (_, source) = setup(ContentPreferences::all(), FEED_URL);
        let entries = vec![
            Entry {
                title: Some("no link".into()),
                link: None,
                published_at: None,
                thumbnail_url: None,
                description: String::new(),
            },
            Entry {
                title: None,
                link: Some("https://www.youtube.com/watch?v=7".into()),
                published_at: None,
                thumbnail_url: None,
                description: String::new(),
            },
        ];

        let items = SyncOrchestrator::<SqliteStore>::accepted_items(&source, entries);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://www.youtube.com/watch?v=7");
    }
}
