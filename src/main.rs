use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;

use tidemark::app::{App, AppEvent};
use tidemark::config::Config;
use tidemark::content::ParseEvent;
use tidemark::storage::{Database, DatabaseError};
use tidemark::sync::{resolve_last_sync, run_sync, RemoteClient};
use tidemark::ui;

/// Get the config directory path (~/.config/tidemark/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("tidemark");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "tidemark", about = "Terminal RSS reader with remote read-state sync")]
struct Args {
    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Run one sync cycle and exit (no TUI)
    #[arg(long)]
    sync: bool,

    /// Print the resolved last-sync time and its source, then exit
    #[arg(long)]
    last_sync: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // User-only access: the directory holds the API token and read history
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = config_dir.join("config.toml");
    let db_path = config_dir.join("tidemark.db");
    let sync_log_path = config_dir.join("sync-log.jsonl");

    let config = Config::load(&config_path).context("Failed to load configuration")?;

    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of tidemark appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    // Headless modes
    if args.last_sync {
        let resolved = resolve_last_sync(&db, &sync_log_path).await;
        match resolved.time {
            Some(time) => println!("{} (source: {})", time.to_rfc3339(), resolved.source.as_str()),
            None => println!("never (source: {})", resolved.source.as_str()),
        }
        return Ok(());
    }

    if args.sync {
        if config.api_url.is_empty() {
            anyhow::bail!("Sync not configured: set api_url in {}", config_path.display());
        }
        let client = RemoteClient::new(
            reqwest::Client::new(),
            &config.api_url,
            config.resolved_api_token(),
        )
        .context("Invalid api_url")?;
        let outcome = run_sync(&db, &client, &sync_log_path).await?;
        println!(
            "Synced: {} items applied, {} actions pushed (previous watermark: {})",
            outcome.items_applied,
            outcome.pushed,
            outcome.watermark_source.as_str()
        );
        return Ok(());
    }

    // Channels for background task results
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (parse_tx, parse_rx) = mpsc::unbounded_channel::<ParseEvent>();

    let mut app = App::new(db.clone(), config, sync_log_path.clone(), parse_tx)
        .context("Failed to create application")?;

    // Load initial data before the first draw
    app.reload_feeds().await.context("Failed to load feeds")?;
    app.reload_articles()
        .await
        .context("Failed to load articles")?;

    let resolved = resolve_last_sync(&db, &sync_log_path).await;
    app.last_sync_label = resolved.time.map(|t| t.format("%H:%M").to_string());

    ui::run(&mut app, event_tx, event_rx, parse_rx).await?;

    println!("Goodbye!");
    Ok(())
}
