mod config;
mod view;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    HttpFetchGateway, ListMode, ListSnapshot, ListSyncController, LiveStatusMonitor,
    LookupOutcome, RankLookup, SyncStatus,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::config::{load_settings, Settings};

/// Terminal view of the live leaderboard.
#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the leaderboard service.
    #[arg(long)]
    api_url: Option<String>,
    /// Search usernames instead of showing the global board.
    #[arg(long)]
    query: Option<String>,
    /// Number of pages to load before printing.
    #[arg(long, default_value_t = 1)]
    pages: usize,
    #[arg(long)]
    page_size: Option<usize>,
    /// Keep polling page 1 until Ctrl-C.
    #[arg(long)]
    watch: bool,
    /// Look up one user's rank and exit.
    #[arg(long)]
    lookup: Option<String>,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(url) = &self.api_url {
            settings.api_url = url.clone();
        }
        if let Some(page_size) = self.page_size {
            settings.set_page_size(page_size);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    args.apply(&mut settings);
    let base_url = Url::parse(&settings.api_url)
        .with_context(|| format!("invalid api url '{}'", settings.api_url))?;
    let gateway = Arc::new(
        HttpFetchGateway::new(base_url, settings.request_timeout())
            .context("failed to build http client")?,
    );
    info!(api_url = %settings.api_url, "viewer starting");

    if let Some(username) = &args.lookup {
        return run_lookup(RankLookup::new(gateway), username).await;
    }

    let mode = if args.query.is_some() {
        ListMode::Search
    } else {
        ListMode::Leaderboard
    };
    let controller = ListSyncController::new(gateway.clone(), settings.sync_options(mode));
    let mut snapshots = controller.subscribe();

    let issued = match &args.query {
        Some(query) => controller.set_query(query).await,
        None => controller.start().await,
    };
    let mut snapshot = if issued {
        settled(&mut snapshots).await?
    } else {
        controller.snapshot().await
    };

    for _ in 1..args.pages {
        if !snapshot.has_more || !controller.load_more().await {
            break;
        }
        snapshot = settled(&mut snapshots).await?;
    }
    println!("{}", view::render_snapshot(&snapshot, None));

    if args.watch {
        let monitor = LiveStatusMonitor::new(
            gateway,
            Arc::new(client_core::TokioPollScheduler),
            settings.live_status_interval(),
        );
        watch(&controller, &monitor, snapshots).await?;
    }
    controller.dispose().await;
    Ok(())
}

async fn run_lookup(lookup: RankLookup, username: &str) -> Result<()> {
    match lookup.lookup(username).await {
        Ok(LookupOutcome::Found(entries)) => {
            for entry in &entries {
                println!("{}", view::render_entry(entry));
            }
            Ok(())
        }
        Ok(LookupOutcome::Superseded) => Ok(()),
        Err(err) => bail!("rank lookup for '{username}' failed: {err}"),
    }
}

/// Waits until the controller has nothing user-visible in flight.
async fn settled(snapshots: &mut broadcast::Receiver<ListSnapshot>) -> Result<ListSnapshot> {
    loop {
        match snapshots.recv().await {
            Ok(snapshot)
                if !matches!(
                    snapshot.status,
                    SyncStatus::Loading | SyncStatus::Refreshing | SyncStatus::LoadingMore
                ) =>
            {
                return Ok(snapshot)
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "snapshot stream lagged"),
            Err(RecvError::Closed) => bail!("controller stopped publishing"),
        }
    }
}

async fn watch(
    controller: &Arc<ListSyncController>,
    monitor: &Arc<LiveStatusMonitor>,
    mut snapshots: broadcast::Receiver<ListSnapshot>,
) -> Result<()> {
    let mut live_updates = monitor.subscribe();
    let mut live = monitor.check().await;
    controller.focus_gained().await;
    monitor.focus_gained().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = snapshots.recv() => match received {
                Ok(snapshot) if snapshot.status != SyncStatus::Polling => {
                    println!("{}", view::render_snapshot(&snapshot, live));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "snapshot stream lagged"),
                Err(RecvError::Closed) => break,
            },
            received = live_updates.recv() => {
                if let Ok(running) = received {
                    live = Some(running);
                    println!("{}", view::render_status(&controller.snapshot().await, live));
                }
            }
        }
    }

    monitor.focus_lost().await;
    controller.focus_lost().await;
    info!("watch stopped");
    Ok(())
}
