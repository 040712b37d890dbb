//! # Tubeshelf
//!
//! Channel subscriptions organised in per-profile category trees, kept in
//! sync from the channels' Atom feeds and browsed through a filtered,
//! cursor-paginated item listing.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler / manual trigger → SyncOrchestrator → Fetcher → Normalizer → Classifier → Store
//! ItemQueryService ← CategoryService (family expansion) + Store
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Create a category and subscribe a channel
//! tubeshelf categories add Music
//! tubeshelf source add https://www.youtube.com/@channel --name Channel --category 1
//!
//! # Sync every active source
//! tubeshelf sync
//!
//! # Newest unread shorts in the Music tree
//! tubeshelf items --category 1 --type SHORT --unread
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store,
/// the fetcher and every service built on them.
pub mod app;

/// Source catalog: subscribe, import, edit and soft-remove sources.
pub mod catalog;

/// Category forest, family closure and category maintenance.
pub mod category;

/// Content type classification of feed entries by link shape.
pub mod classifier;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/tubeshelf/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Source`](domain::Source): a subscribed channel and its sync health
/// - [`Item`](domain::Item): a feed entry with a deterministic SHA256 id
/// - [`Category`](domain::Category): a node of a profile's category tree
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): async trait for fetching channel pages and feeds
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
pub mod fetcher;

/// Atom feed parsing into flat entries.
pub mod normalizer;

/// Filtered, cursor-paginated item listing.
pub mod query;

/// Channel url to feed url resolution.
pub mod resolver;

/// Periodic whole-catalog sync with on-demand triggers.
pub mod scheduler;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Per-source sync cycles and concurrent bulk sync.
pub mod sync;
