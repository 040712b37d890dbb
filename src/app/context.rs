use std::path::PathBuf;
use std::sync::Arc;

use crate::app::error::{Result, TubeshelfError};
use crate::catalog::Catalog;
use crate::category::CategoryService;
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::Fetcher;
use crate::query::ItemQueryService;
use crate::scheduler::SchedulerConfig;
use crate::store::sqlite::SqliteStore;
use crate::sync::SyncOrchestrator;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub catalog: Catalog<SqliteStore>,
    pub categories: CategoryService<SqliteStore>,
    pub items: ItemQueryService<SqliteStore>,
    pub sync: SyncOrchestrator<SqliteStore>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let db_path = match config.database.path.clone() {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::with_config(&config.http)?);
        Ok(Self::with_parts(config, store, fetcher))
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::with_config(&config.http)?);
        Ok(Self::with_parts(config, store, fetcher))
    }

    /// Wire the services over an existing store and fetcher.
    pub fn with_parts(
        config: Config,
        store: Arc<SqliteStore>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
    ) -> Self {
        let sync = SyncOrchestrator::with_workers(store.clone(), fetcher.clone(), config.sync.workers);

        Self {
            catalog: Catalog::new(store.clone(), fetcher.clone()),
            categories: CategoryService::new(store.clone()),
            items: ItemQueryService::new(store.clone()),
            sync,
            store,
            fetcher,
            config,
        }
    }

    pub fn scheduler_config(&self) -> Result<SchedulerConfig> {
        let interval_secs = self
            .config
            .sync
            .interval_secs()
            .map_err(|e| TubeshelfError::Config(e.to_string()))?;

        Ok(SchedulerConfig {
            interval_secs,
            update_on_start: self.config.sync.update_on_start,
        })
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| TubeshelfError::Config("Could not find data directory".into()))?;
        let app_dir = data_dir.join("tubeshelf");
        std::fs::create_dir_all(&app_dir)?;
        Ok(app_dir.join("tubeshelf.db"))
    }
}
