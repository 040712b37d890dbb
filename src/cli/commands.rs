use std::path::Path;

use serde::Serialize;

use crate::app::{AppContext, Result, TubeshelfError};
use crate::catalog::{ImportEntry, ImportOutcome, NewSourceRequest};
use crate::category::CategoryTree;
use crate::domain::{CategoryUpdate, ContentType, SourceType, SourceUpdate, StatusUpdate};
use crate::query::ItemFilter;
use crate::resolver::SourceResolver;
use crate::scheduler::{format_interval, parse_interval, Scheduler};

use super::{CategoryAction, ItemsArgs, SourceAction};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| TubeshelfError::Other(format!("Failed to encode output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

pub async fn resolve(ctx: &AppContext, url: &str) -> Result<()> {
    let resolver = SourceResolver::new(ctx.fetcher.clone());
    println!("{}", resolver.resolve(url).await?);
    Ok(())
}

pub async fn source(ctx: &AppContext, profile_id: i64, action: SourceAction) -> Result<()> {
    match action {
        SourceAction::Add {
            url,
            name,
            category,
        } => {
            let source = ctx
                .catalog
                .add_source(NewSourceRequest {
                    name,
                    url,
                    category_id: category,
                    source_type: SourceType::Youtube,
                    preferences: None,
                })
                .await?;
            println!("Added source {}: {}", source.id, source.name);
            if let Some(rss_url) = source.feed_url() {
                println!("  {}", rss_url);
            }
        }
        SourceAction::Import { path } => import_sources(ctx, profile_id, &path).await?,
        SourceAction::List => list_sources(ctx)?,
        SourceAction::Edit {
            id,
            name,
            category,
            videos,
            shorts,
            lives,
        } => {
            let source = ctx.catalog.update_source(
                id,
                &SourceUpdate {
                    name,
                    category_id: category,
                    want_videos: videos,
                    want_shorts: shorts,
                    want_lives: lives,
                },
            )?;
            print_json(&source)?;
        }
        SourceAction::Remove { id } => {
            ctx.catalog.remove_source(id)?;
            println!("Removed source {}", id);
        }
    }
    Ok(())
}

async fn import_sources(ctx: &AppContext, profile_id: i64, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    let entries: Vec<ImportEntry> = serde_json::from_str(&content)
        .map_err(|e| TubeshelfError::Other(format!("Invalid import file: {}", e)))?;

    if entries.is_empty() {
        println!("No sources found in import file");
        return Ok(());
    }

    println!("Importing {} sources...", entries.len());
    let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    let outcomes = ctx.catalog.import_sources(profile_id, entries).await;

    let mut created = 0;
    let mut updated = 0;
    let mut errors = 0;

    for (name, outcome) in names.iter().zip(&outcomes) {
        match outcome {
            ImportOutcome::Created(_) => {
                println!("  + {}", name);
                created += 1;
            }
            ImportOutcome::Updated(_) => {
                println!("  = {}", name);
                updated += 1;
            }
            ImportOutcome::Failed(reason) => {
                eprintln!("  ! {} - {}", name, reason);
                errors += 1;
            }
        }
    }

    println!(
        "\nImport complete: {} created, {} updated, {} errors",
        created, updated, errors
    );
    Ok(())
}

fn list_sources(ctx: &AppContext) -> Result<()> {
    let sources = ctx.catalog.list_sources()?;

    if sources.is_empty() {
        println!("No sources");
        return Ok(());
    }

    for summary in sources {
        let source = &summary.source;
        let marker = if source.active { " " } else { "x" };
        let health = match (&source.error_message, source.last_http_status) {
            (Some(message), Some(status)) => {
                format!("failing x{} ({}: {})", source.fail_count, status, message)
            }
            (_, Some(status)) => format!("ok ({})", status),
            _ => "never synced".to_string(),
        };
        println!(
            "{} [{}] {} ({} items, {})\n    {}",
            marker,
            source.id,
            source.name,
            summary.item_count,
            health,
            source.feed_url().unwrap_or(&source.url)
        );
    }

    Ok(())
}

pub async fn sync(ctx: &AppContext, source_id: Option<i64>) -> Result<()> {
    match source_id {
        Some(id) => {
            let report = ctx.sync.sync_source_by_id(id).await?;
            println!("Synced source {}: {} items processed", id, report.items_processed);
        }
        None => {
            let summary = ctx.sync.sync_catalog().await?;
            println!(
                "Sync complete: {} succeeded, {} failed",
                summary.success_count, summary.failure_count
            );
        }
    }
    Ok(())
}

pub fn list_items(ctx: &AppContext, profile_id: i64, args: ItemsArgs) -> Result<()> {
    let content_type = args
        .content_type
        .as_deref()
        .map(str::parse::<ContentType>)
        .transpose()?;

    let filter = ItemFilter {
        profile_id,
        source_id: args.source,
        category_id: args.category,
        content_type,
        search: args.search,
        search_source_names: args.search_sources,
        unread_only: args.unread,
    };

    let page = ctx.items.list(&filter, args.cursor.as_deref(), args.limit)?;
    print_json(&page)
}

pub fn categories(ctx: &AppContext, profile_id: i64, action: CategoryAction) -> Result<()> {
    match action {
        CategoryAction::Tree { depth } => {
            let trees = ctx.categories.tree_with_depth(profile_id, depth)?;
            if trees.is_empty() {
                println!("No categories");
            }
            for tree in &trees {
                print_tree(tree, 0);
            }
        }
        CategoryAction::Add { name, parent } => {
            let category = ctx.categories.create_category(profile_id, &name, parent)?;
            println!("Added category {}: {}", category.id, category.name);
        }
        CategoryAction::Edit {
            id,
            name,
            parent,
            root,
        } => {
            let parent_id = if root { Some(None) } else { parent.map(Some) };
            let category =
                ctx.categories
                    .update_category(profile_id, id, &CategoryUpdate { name, parent_id })?;
            print_json(&category)?;
        }
        CategoryAction::Remove { id } => {
            ctx.categories.remove_category(profile_id, id)?;
            println!("Removed category {}", id);
        }
    }
    Ok(())
}

fn print_tree(tree: &CategoryTree, level: usize) {
    println!(
        "{}[{}] {}",
        "  ".repeat(level),
        tree.category.id,
        tree.category.name
    );
    for child in &tree.children {
        print_tree(child, level + 1);
    }
}

pub fn set_status(
    ctx: &AppContext,
    profile_id: i64,
    item_id: &str,
    update: StatusUpdate,
) -> Result<()> {
    let status = ctx.catalog.set_item_status(profile_id, item_id, &update)?;
    print_json(&status)
}

pub async fn daemon(ctx: &AppContext, interval: Option<String>, now: bool) -> Result<()> {
    let mut config = ctx.scheduler_config()?;
    if let Some(raw) = interval {
        config.interval_secs = parse_interval(&raw).map_err(TubeshelfError::Config)?;
    }
    if now {
        config.update_on_start = true;
    }

    println!(
        "Tubeshelf daemon started (sync interval: {}, PID: {})",
        format_interval(config.interval_secs),
        std::process::id()
    );

    let handle = Scheduler::start(ctx.sync.clone(), config)?;
    handle.run_until_ctrl_c().await?;

    println!("Daemon stopped");
    Ok(())
}
