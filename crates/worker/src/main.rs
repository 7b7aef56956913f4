use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reel_core::{load_channels, Settings};
use reel_worker::{
    seed_channels, shutdown_signal, Clock, Scheduler, SyncEngine, SyncMode, SystemClock,
    YouTubeClient,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reel-worker")]
#[command(about = "Reel channel sync worker", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sync on the configured interval until interrupted.
    Run,
    /// Run a single pass, or sync a single channel, and exit.
    Once {
        #[arg(long)]
        channel: Option<String>,
        /// Ignore stored videos and walk the full upload history.
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    let db = reel_db::connect(&settings.database_url).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let configured = load_channels(&settings.channels_file)?;
    seed_channels(&db, &configured, clock.now()).await?;

    let source = Arc::new(YouTubeClient::new(
        settings.youtube_api_key.clone(),
        settings.youtube_base_url.clone(),
    )?);
    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        source,
        clock.clone(),
        settings.sync.clone(),
    ));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    let scheduler = Scheduler::new(engine.clone(), db, clock, shutdown.clone());

    match args.command {
        Command::Run => {
            info!(env = %settings.reel_env, "worker starting");
            scheduler.run().await;
        }
        Command::Once { channel: Some(id), full } => {
            let mode = if full { SyncMode::Backfill } else { SyncMode::Auto };
            let report = engine.sync_channel(&id, mode, &shutdown).await?;
            info!(channel_id = %report.channel_id, added = report.added, "sync finished");
        }
        Command::Once { channel: None, full } => {
            let mode = if full { SyncMode::Backfill } else { SyncMode::Auto };
            let report = scheduler.run_pass(mode).await?;
            info!(
                synced = report.synced,
                failed = report.failed,
                new_videos = report.new_videos,
                "pass finished"
            );
        }
    }

    Ok(())
}
