//! Runtime glue for the `crosspost` binary.
//!
//! Settings loading and the long-running tick loop live here so they can be
//! exercised from integration tests; `main.rs` only parses arguments and
//! wires concrete backends in.

use std::{
  future::Future,
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use crosspost_core::{
  dispatch, platform::Publisher, reconcile, settings::Settings, store::BotStore,
};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Environment variables override the file: `CROSSPOST_STORE_PATH`,
/// `CROSSPOST_SCHEDULER__POST_LIMIT`, ...
pub const ENV_PREFIX: &str = "CROSSPOST";

// ─── Configuration ───────────────────────────────────────────────────────────

/// Load settings from `path` (optional) layered under the environment, then
/// expand `~` in every path and validate.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
  let raw = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read configuration")?;

  let mut settings: Settings = raw
    .try_deserialize()
    .context("failed to deserialise settings")?;

  settings.store_path = expand_tilde(&settings.store_path);
  for file in [&mut settings.sync.accounts_file, &mut settings.sync.feeds_file]
    .into_iter()
    .flatten()
  {
    *file = expand_tilde(file);
  }

  settings.validate().context("invalid settings")?;
  Ok(settings)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Tick loop ───────────────────────────────────────────────────────────────

/// Run the dispatcher every `tick_seconds` (and the reconciler every
/// `clean_every` ticks) until `shutdown` resolves. Returns the number of
/// ticks run.
///
/// Ticks never overlap: a slow tick delays the next one.
pub async fn run<S, P, F>(
  store: &S,
  publisher: &P,
  settings: &Settings,
  shutdown: F,
) -> anyhow::Result<u64>
where
  S: BotStore,
  P: Publisher,
  F: Future<Output = ()>,
{
  let scheduler = &settings.scheduler;
  let mut interval = tokio::time::interval(Duration::from_secs(scheduler.tick_seconds));
  interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
  tokio::pin!(shutdown);

  info!(
    tick_seconds = scheduler.tick_seconds,
    clean_every = ?scheduler.clean_every,
    "scheduler running"
  );

  let mut ticks = 0u64;
  loop {
    tokio::select! {
      _ = &mut shutdown => {
        info!(ticks, "shutting down");
        return Ok(ticks);
      }
      _ = interval.tick() => {}
    }

    ticks += 1;
    let summary = dispatch::post_scheduler(store, publisher, scheduler)
      .await
      .context("dispatcher tick failed")?;
    debug!(tick = ticks, ?summary, "tick done");

    if scheduler.clean_every.is_some_and(|every| ticks % every == 0) {
      let cleaned = reconcile::clean_data(store, scheduler)
        .await
        .context("reconciler pass failed")?;
      debug!(tick = ticks, ?cleaned, "reconciled");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use crosspost_core::settings::{PostOrder, Visibility};

  use super::*;

  fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
      .suffix(".toml")
      .tempfile()
      .unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/bot.db")), PathBuf::from(home).join("bot.db"));
    assert_eq!(expand_tilde(Path::new("/srv/bot.db")), PathBuf::from("/srv/bot.db"));
  }

  #[test]
  fn file_settings_load_with_defaults() {
    let file = write_config(
      r#"
store_path = "/srv/crosspost.db"

[scheduler]
post_limit = 4
organic_posts = true
post_order = "published"
default_visibility = "unlisted"
"#,
    );
    let settings = load_settings(file.path()).unwrap();
    assert_eq!(settings.store_path, PathBuf::from("/srv/crosspost.db"));
    assert_eq!(settings.scheduler.post_limit, 4);
    assert!(settings.scheduler.organic_posts);
    assert!(settings.scheduler.retry_post);
    assert_eq!(settings.scheduler.post_order, PostOrder::Published);
    assert_eq!(settings.scheduler.default_visibility, Visibility::Unlisted);
    assert!(settings.sync.accounts_file.is_none());
  }

  #[test]
  fn invalid_visibility_is_a_load_error() {
    let file = write_config(
      r#"
store_path = "bot.db"

[scheduler]
default_visibility = "everyone"
"#,
    );
    assert!(load_settings(file.path()).is_err());
  }

  #[test]
  fn zero_tick_is_rejected() {
    let file = write_config(
      r#"
store_path = "bot.db"

[scheduler]
tick_seconds = 0
"#,
    );
    assert!(load_settings(file.path()).is_err());
  }
}
