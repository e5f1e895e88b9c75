//! `crosspost`: schedule and deliver posts to Mastodon and Bluesky.
//!
//! Reads `crosspost.toml` (or the path given with `--config`), overlays
//! `CROSSPOST_*` environment variables, opens the SQLite store and runs one
//! operation.
//!
//! ```text
//! crosspost run
//! crosspost enqueue --item-id 42 --title "Hello" --link https://blog.example/42 --tag rust
//! crosspost check-health --host bluesky
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use crosspost_bot::load_settings;
use crosspost_core::{
  account::Host,
  dispatch, health,
  post::NewPost,
  reconcile, scheduling,
  settings::Settings,
  store::BotStore,
  sync,
};
use crosspost_platforms::Platforms;
use crosspost_store_sqlite::SqliteStore;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Cross-post feed items to Mastodon and Bluesky")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "crosspost.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run one dispatcher tick.
  PostScheduler,
  /// Purge finished posts and reschedule left-behind ones.
  CleanData,
  /// Send a private test post from every enabled account.
  CheckHealth {
    #[arg(long, value_enum)]
    host: Option<HostArg>,
  },
  /// Load accounts and feeds from the configured JSON files.
  SyncData,
  /// Push profile fields of every enabled account to its platform.
  UpdateAccounts,
  /// Check that the database is reachable.
  CheckDb,
  /// Container start-up: sync data, then check every account.
  Entrypoint,
  /// Record a feed item and schedule it for delivery.
  Enqueue {
    #[arg(long)]
    item_id:   String,
    #[arg(long)]
    title:     String,
    #[arg(long)]
    link:      Option<String>,
    #[arg(long = "tag")]
    tags:      Vec<String>,
    /// Publication time of the item (RFC 3339).
    #[arg(long)]
    published: Option<DateTime<Utc>>,
  },
  /// Tick until interrupted.
  Run,
}

#[derive(Clone, Copy, ValueEnum)]
enum HostArg {
  Mastodon,
  Bluesky,
}

impl From<HostArg> for Host {
  fn from(arg: HostArg) -> Self {
    match arg {
      HostArg::Mastodon => Host::Mastodon,
      HostArg::Bluesky => Host::Bluesky,
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let settings = load_settings(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  execute(cli.command, &settings, &store).await
}

async fn execute(command: Command, settings: &Settings, store: &SqliteStore) -> anyhow::Result<()> {
  let scheduler = &settings.scheduler;

  match command {
    Command::PostScheduler => {
      let summary = dispatch::post_scheduler(store, &platforms()?, scheduler).await?;
      info!(?summary, "tick finished");
    }

    Command::CleanData => {
      let summary = reconcile::clean_data(store, scheduler).await?;
      info!(?summary, "clean finished");
    }

    Command::CheckHealth { host } => {
      let report = health::check_health(store, &platforms()?, host.map(Host::from)).await?;
      info!(sent = report.sent, failed = report.failed, "health check finished");
    }

    Command::SyncData => {
      sync_data(settings, store, &platforms()?).await?;
    }

    Command::UpdateAccounts => {
      let acknowledged = sync::update_accounts(store, &platforms()?).await?;
      info!(acknowledged, "profiles pushed");
    }

    Command::CheckDb => {
      store.ping().await.context("database is not reachable")?;
      info!(path = ?settings.store_path, "database reachable");
    }

    Command::Entrypoint => {
      let publisher = platforms()?;
      sync_data(settings, store, &publisher).await?;
      let report = health::check_health(store, &publisher, None).await?;
      info!(sent = report.sent, failed = report.failed, "entrypoint finished");
    }

    Command::Enqueue { item_id, title, link, tags, published } => {
      let mut input = NewPost::new(item_id, title);
      input.link = link;
      input.tags = tags;
      input.published_at = published;
      let (post, schedule) = scheduling::record_post(store, scheduler, input).await?;
      match schedule {
        Some(schedule) => info!(post = %post.id, schedule = %schedule.id, "enqueued"),
        None => warn!(post = %post.id, item = %post.item_id, "not scheduled"),
      }
    }

    Command::Run => {
      let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
          warn!(%err, "cannot listen for ctrl-c");
          std::future::pending::<()>().await;
        }
      };
      crosspost_bot::run(store, &platforms()?, settings, shutdown).await?;
    }
  }

  Ok(())
}

fn platforms() -> anyhow::Result<Platforms> {
  Platforms::new().context("failed to build HTTP client")
}

async fn sync_data(settings: &Settings, store: &SqliteStore, publisher: &Platforms) -> anyhow::Result<()> {
  let files = sync::configured_files(&settings.sync);
  info!(?files, "syncing data");
  sync::sync_data(store, publisher, &settings.sync).await?;
  Ok(())
}
