pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tubeshelf")]
#[command(about = "Channel feed subscriptions, sync and browsing", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/tubeshelf/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of parallel workers for syncing sources
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Profile whose categories and item state are used
    #[arg(short, long, default_value_t = 1, global = true)]
    pub profile: i64,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the feed url a channel url resolves to
    Resolve {
        /// Channel page or feed url
        url: String,
    },
    /// Manage subscribed sources
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },
    /// Sync every active source, or a single one
    Sync {
        /// Only sync this source
        #[arg(short, long)]
        source: Option<i64>,
    },
    /// List items, newest first
    Items(ItemsArgs),
    /// Manage categories
    Categories {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Update the viewing state of an item
    Status {
        item_id: String,

        #[arg(long)]
        read: Option<bool>,

        /// Playback position in seconds
        #[arg(long)]
        progress: Option<u32>,

        #[arg(long)]
        favorite: Option<bool>,
    },
    /// Run the periodic sync until interrupted
    Daemon {
        /// Override the configured interval (e.g., "1h", "30m", "1d")
        #[arg(short, long)]
        interval: Option<String>,

        /// Run a full sync right away
        #[arg(long)]
        now: bool,
    },
}

#[derive(Subcommand)]
pub enum SourceAction {
    /// Subscribe a channel
    Add {
        /// Channel page or feed url
        url: String,

        #[arg(short, long)]
        name: String,

        /// Owning category id
        #[arg(short, long)]
        category: i64,
    },
    /// Import sources from a JSON file of {name, url, categoryName, type?}
    Import { path: PathBuf },
    /// List sources with their health
    List,
    /// Edit a source's name, category or content preferences
    Edit {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        category: Option<i64>,

        #[arg(long)]
        videos: Option<bool>,

        #[arg(long)]
        shorts: Option<bool>,

        #[arg(long)]
        lives: Option<bool>,
    },
    /// Deactivate a source; its items are kept
    Remove { id: i64 },
}

#[derive(Args)]
pub struct ItemsArgs {
    #[arg(long)]
    pub category: Option<i64>,

    #[arg(long)]
    pub source: Option<i64>,

    /// VIDEO, SHORT or LIVE
    #[arg(long = "type")]
    pub content_type: Option<String>,

    /// Case-insensitive title search
    #[arg(short, long)]
    pub search: Option<String>,

    /// Let --search also match source names
    #[arg(long)]
    pub search_sources: bool,

    #[arg(long)]
    pub unread: bool,

    /// Id of the last item of the previous page
    #[arg(long)]
    pub cursor: Option<String>,

    #[arg(short, long, default_value_t = 0)]
    pub limit: usize,
}

#[derive(Subcommand)]
pub enum CategoryAction {
    /// Print the category tree
    Tree {
        #[arg(short, long, default_value_t = crate::category::DEFAULT_TREE_DEPTH)]
        depth: usize,
    },
    /// Create a category
    Add {
        name: String,

        #[arg(long)]
        parent: Option<i64>,
    },
    /// Rename or move a category
    Edit {
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, conflicts_with = "root")]
        parent: Option<i64>,

        /// Move to the top level
        #[arg(long)]
        root: bool,
    },
    /// Deactivate a category
    Remove { id: i64 },
}
