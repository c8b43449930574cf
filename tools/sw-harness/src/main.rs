//! Command-line harness for the AI Tools Hub service worker.
//!
//! Runs the worker's lifecycle and event handlers against a live origin and
//! keeps the cache in a JSON file between runs, so an online install can be
//! followed by an offline fetch.
//!
//! ## Usage
//!
//! ```bash
//! # Pre-cache the app shell and activate
//! sw-harness --origin http://localhost:8080/ install
//!
//! # Replay a navigation with the network gone
//! sw-harness --origin http://localhost:8080/ fetch /dashboard --navigate --offline
//!
//! # Show what a push would display, then click its "view" action
//! sw-harness push --payload '{"title":"New tools","body":"3 added"}' --click view
//!
//! # Click on its own: notifications do not outlive a run, so this only
//! # exercises the window-opening path
//! sw-harness click --action view
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use toolshub_common::{init_logging, LogConfig, LogFormat};
use toolshub_net::{Fetcher, LoaderConfig, OfflineFetcher, Request, ResourceLoader};
use toolshub_sw::persist::{load_snapshot, save_snapshot};
use toolshub_sw::{
    CacheStore, FetchEvent, FetchOutcome, MemoryCacheStorage, NotificationCenter,
    NotificationClickEvent, PushEvent, ServiceWorkerConfig, ServiceWorkerHost,
};
use tracing::debug;
use url::Url;

/// Where the worker script is served, relative to the origin.
const SCRIPT_PATH: &str = "/sw.js";

#[derive(Parser)]
#[command(name = "sw-harness")]
#[command(about = "Drive the AI Tools Hub service worker from the command line")]
struct Cli {
    /// Origin the worker serves (overrides the config file)
    #[arg(long, global = true)]
    origin: Option<Url>,

    /// Worker configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache contents kept between runs
    #[arg(long, global = true, default_value = "sw-cache.json")]
    cache_file: PathBuf,

    /// Log output: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the current version and activate it
    Install,

    /// Send one request through the worker
    Fetch {
        /// Path or absolute URL
        path: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
        /// Fail every network request
        #[arg(long)]
        offline: bool,
    },

    /// Deliver a push message
    Push {
        /// JSON payload; omit for a push without data
        #[arg(long)]
        payload: Option<String>,
        /// Then click the shown notification with this action ("" for the body)
        #[arg(long)]
        click: Option<String>,
    },

    /// Click a notification. Nothing is shown in a fresh run, so only the
    /// window-opening path is exercised; use `push --click` for the full flow.
    Click {
        /// Action button id, e.g. "view" or "close"
        #[arg(long)]
        action: Option<String>,
        /// Notification tag (defaults to the configured one)
        #[arg(long)]
        tag: Option<String>,
    },

    /// List cache namespaces and their entry counts
    Namespaces,
}

impl Commands {
    fn needs_network(&self) -> bool {
        !matches!(self, Self::Fetch { offline: true, .. })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogConfig::default().with_format(cli.log_format));

    let fetcher: Arc<dyn Fetcher> = if cli.command.needs_network() {
        Arc::new(ResourceLoader::new(LoaderConfig::default())?)
    } else {
        Arc::new(OfflineFetcher)
    };

    run(cli, fetcher, &mut std::io::stdout()).await
}

fn load_config(path: Option<&Path>, origin: Option<Url>) -> Result<ServiceWorkerConfig> {
    let mut config = match path {
        Some(path) => ServiceWorkerConfig::from_json_file(path)?,
        None => ServiceWorkerConfig::default(),
    };
    if let Some(origin) = origin {
        config.origin = origin;
    }
    Ok(config)
}

async fn run(cli: Cli, fetcher: Arc<dyn Fetcher>, out: &mut impl Write) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.origin)?;
    let script_url = config.resolve(SCRIPT_PATH)?;
    let notification_tag = config.notifications.tag.clone();

    let snapshot = load_snapshot(&cli.cache_file)
        .with_context(|| format!("loading cache from {}", cli.cache_file.display()))?;
    let caches = Arc::new(MemoryCacheStorage::from_snapshot(snapshot));
    let notifications = Arc::new(NotificationCenter::new());

    let (host, _events) =
        ServiceWorkerHost::new(config, caches.clone(), fetcher, notifications.clone())?;

    let mut modified = false;
    match cli.command {
        Commands::Install => {
            let (install, activation) = host.start(script_url).await?;
            modified = true;

            writeln!(out, "Installed {}", install.cache_name)?;
            for url in install.required.iter().chain(&install.best_effort_cached) {
                writeln!(out, "  cached   {url}")?;
            }
            for (url, reason) in &install.best_effort_failed {
                writeln!(out, "  skipped  {url} ({reason})")?;
            }
            match activation {
                Some(activation) => {
                    for name in &activation.deleted {
                        writeln!(out, "Deleted stale cache {name}")?;
                    }
                }
                None => writeln!(out, "Waiting to activate")?,
            }
        }

        Commands::Fetch { path, navigate, .. } => {
            if !host.resume(script_url).await {
                bail!(
                    "no cached version in {}; run `sw-harness install` first",
                    cli.cache_file.display()
                );
            }

            let url = host.config().resolve(&path)?;
            let request = if navigate {
                Request::navigate(url)
            } else {
                let origin = host.config().origin.origin();
                Request::get(url).origin(origin)
            };

            let outcome = host.handle_fetch(&FetchEvent::new(request)).await;
            host.settle().await;
            modified = true;

            match outcome {
                FetchOutcome::PassThrough(reason) => writeln!(out, "pass-through ({reason:?})")?,
                FetchOutcome::Respond { response, source } => writeln!(
                    out,
                    "{} {} from {:?}, {} bytes",
                    response.status,
                    response.status_text,
                    source,
                    response.body.len()
                )?,
            }
        }

        Commands::Push { payload, click } => {
            let event = payload.map(PushEvent::with_data).unwrap_or_default();
            if !host.handle_push(&event).await? {
                writeln!(out, "Push without payload, nothing shown")?;
            }
            for notification in notifications.open_notifications().await {
                let shown = json!({
                    "title": notification.title,
                    "options": notification.options,
                });
                writeln!(out, "{}", serde_json::to_string_pretty(&shown)?)?;
            }

            if let Some(action) = click {
                let action = Some(action.as_str()).filter(|a| !a.is_empty());
                click_notification(&host, notification_tag, action, out).await?;
                let open = notifications.open_notifications().await.len();
                writeln!(out, "{open} notification(s) still shown")?;
            }
        }

        Commands::Click { action, tag } => {
            let tag = tag.unwrap_or(notification_tag);
            click_notification(&host, tag, action.as_deref(), out).await?;
        }

        Commands::Namespaces => {
            let current = &host.config().cache_name;
            for name in caches.list_namespaces().await {
                let marker = if &name == current { "*" } else { " " };
                let count = caches.keys(&name).await.len();
                writeln!(out, "{marker} {name} ({count} entries)")?;
            }
        }
    }

    if modified {
        save_snapshot(&cli.cache_file, &caches.snapshot().await)
            .with_context(|| format!("saving cache to {}", cli.cache_file.display()))?;
        debug!(path = %cli.cache_file.display(), "Cache saved");
    }
    Ok(())
}

async fn click_notification(
    host: &ServiceWorkerHost,
    tag: String,
    action: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let event = NotificationClickEvent::new(tag, action);
    match host.handle_notification_click(&event).await? {
        Some(client) => writeln!(out, "Focused window {} at {}", client.id, client.url)?,
        None => writeln!(out, "Dismissed")?,
    }
    Ok(())
}
