use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tubeshelf::app::AppContext;
use tubeshelf::cli::{commands, Cli, Commands};
use tubeshelf::config::Config;
use tubeshelf::domain::StatusUpdate;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(workers) = cli.workers {
        config.sync.workers = workers.max(1);
    }

    let ctx = AppContext::new(config)?;
    let profile = cli.profile;

    match cli.command {
        Commands::Resolve { url } => {
            commands::resolve(&ctx, &url).await?;
        }
        Commands::Source { action } => {
            commands::source(&ctx, profile, action).await?;
        }
        Commands::Sync { source } => {
            commands::sync(&ctx, source).await?;
        }
        Commands::Items(args) => {
            commands::list_items(&ctx, profile, args)?;
        }
        Commands::Categories { action } => {
            commands::categories(&ctx, profile, action)?;
        }
        Commands::Status {
            item_id,
            read,
            progress,
            favorite,
        } => {
            let update = StatusUpdate {
                is_read: read,
                play_progress: progress,
                is_favorite: favorite,
            };
            commands::set_status(&ctx, profile, &item_id, update)?;
        }
        Commands::Daemon { interval, now } => {
            commands::daemon(&ctx, interval, now).await?;
        }
    }

    Ok(())
}
