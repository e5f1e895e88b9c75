//! Typed runtime settings.
//!
//! Assembled once at startup (see the `crosspost` binary) and passed by
//! reference into each operation. Nothing here is read from the environment
//! directly.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Post visibility understood by Mastodon-compatible servers.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
  #[default]
  Public,
  Unlisted,
  Private,
  Direct,
}

impl Visibility {
  pub fn parse(raw: &str) -> Option<Self> {
    match raw.trim().to_ascii_lowercase().as_str() {
      "public" => Some(Self::Public),
      "unlisted" => Some(Self::Unlisted),
      "private" => Some(Self::Private),
      "direct" => Some(Self::Direct),
      _ => None,
    }
  }

  /// Normalise a requested visibility, falling back to `default` when it is
  /// absent or not recognised.
  pub fn normalize(raw: Option<&str>, default: Self) -> Self {
    raw.and_then(Self::parse).unwrap_or(default)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Public => "public",
      Self::Unlisted => "unlisted",
      Self::Private => "private",
      Self::Direct => "direct",
    }
  }
}

/// Ordering applied to due schedule records.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PostOrder {
  /// Ascending schedule id, i.e. scheduling order.
  #[default]
  Id,
  /// Ascending publication time of the post.
  Published,
}

/// Which post timestamp the expiry window is measured against.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PostDate {
  #[default]
  Created,
  Published,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
  /// Cap on newly drafted records per tick; `0` drafts every pending record.
  pub post_limit:         u32,
  /// Draft a random count in `[ceil(limit/3), limit]` instead of `limit`.
  pub organic_posts:      bool,
  /// Keep records that failed on some account for the next tick.
  pub retry_post:         bool,
  pub post_order:         PostOrder,
  pub default_visibility: Visibility,
  /// Posts older than this many days are never scheduled and get purged.
  pub post_expiry:        Option<u32>,
  pub post_date:          PostDate,
  /// Send platform updates (edit or quote) to accounts that already hold an
  /// identifier instead of skipping them.
  pub update_delivered:   bool,
  pub tick_seconds:       u64,
  /// Run the reconciler every this many ticks of the `run` loop.
  pub clean_every:        Option<u64>,
}

impl Default for SchedulerSettings {
  fn default() -> Self {
    Self {
      post_limit:         0,
      organic_posts:      false,
      retry_post:         true,
      post_order:         PostOrder::default(),
      default_visibility: Visibility::default(),
      post_expiry:        None,
      post_date:          PostDate::default(),
      update_delivered:   false,
      tick_seconds:       1,
      clean_every:        None,
    }
  }
}

impl SchedulerSettings {
  /// The per-tick draft cap, or `None` when unlimited.
  pub fn limit(&self) -> Option<usize> {
    (self.post_limit > 0).then_some(self.post_limit as usize)
  }

  /// Posts whose reference date is before the returned instant are expired.
  pub fn expiry_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    self
      .post_expiry
      .map(|days| now - Duration::days(i64::from(days)))
  }
}

// ─── Sync ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
  /// JSON file of the form `{"accounts": [...]}`.
  pub accounts_file: Option<PathBuf>,
  /// JSON file of the form `{"feeds": [...]}`.
  pub feeds_file:    Option<PathBuf>,
}

// ─── Root ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
  pub store_path: PathBuf,
  #[serde(default)]
  pub scheduler:  SchedulerSettings,
  #[serde(default)]
  pub sync:       SyncSettings,
}

impl Settings {
  /// Reject combinations that can only come from a misdeployment.
  pub fn validate(&self) -> Result<()> {
    if self.store_path.as_os_str().is_empty() {
      return Err(Error::Config("store_path must not be empty".into()));
    }
    let scheduler = &self.scheduler;
    if scheduler.post_expiry == Some(0) {
      return Err(Error::Config(
        "scheduler.post_expiry must be at least one day".into(),
      ));
    }
    if scheduler.tick_seconds == 0 {
      return Err(Error::Config("scheduler.tick_seconds must be positive".into()));
    }
    if scheduler.clean_every == Some(0) {
      return Err(Error::Config("scheduler.clean_every must be positive".into()));
    }
    Ok(())
  }
}
