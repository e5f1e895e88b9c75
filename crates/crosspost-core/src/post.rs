//! Subject posts: feed-derived content published once per account.
//!
//! A post carries its delivery state in [`PostIds`]. Entries are only ever
//! appended; a post moves from undelivered to partially delivered to fully
//! delivered without losing an identifier along the way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::PostDate;

// ─── Delivery identifiers ────────────────────────────────────────────────────

/// Platform identifiers recorded for a post.
///
/// Stored as JSON: a bare string for the single-account layout, an array of
/// `"<account-id>_<platform-id>"` composites once several accounts are fanned
/// out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PostIds {
  /// A single platform id written before accounts were tracked.
  Legacy(String),
  /// One composite entry per account that acknowledged the post.
  PerAccount(Vec<String>),
}

impl PostIds {
  /// Build the composite entry for `account_id`.
  pub fn composite(account_id: Uuid, platform_id: &str) -> String {
    format!("{account_id}_{platform_id}")
  }

  pub fn is_empty(&self) -> bool {
    match self {
      Self::Legacy(id) => id.is_empty(),
      Self::PerAccount(ids) => ids.is_empty(),
    }
  }

  /// All raw entries, legacy value included.
  pub fn entries(&self) -> Vec<&str> {
    match self {
      Self::Legacy(id) => vec![id.as_str()],
      Self::PerAccount(ids) => ids.iter().map(String::as_str).collect(),
    }
  }

  /// The platform id previously recorded for `account_id`, found by scanning
  /// for the `"<account-id>_"` prefix.
  pub fn for_account(&self, account_id: Uuid) -> Option<&str> {
    let prefix = format!("{account_id}_");
    self
      .entries()
      .into_iter()
      .find_map(|entry| entry.strip_prefix(prefix.as_str()))
  }

  /// Append a composite entry for `account_id` unless one already exists.
  ///
  /// A legacy value is kept as the first entry of the resulting list.
  /// Returns `true` when an entry was added.
  pub fn record(&mut self, account_id: Uuid, platform_id: &str) -> bool {
    if self.for_account(account_id).is_some() {
      return false;
    }
    let entry = Self::composite(account_id, platform_id);
    match self {
      Self::Legacy(legacy) => {
        let mut ids = Vec::with_capacity(2);
        if !legacy.is_empty() {
          ids.push(std::mem::take(legacy));
        }
        ids.push(entry);
        *self = Self::PerAccount(ids);
      }
      Self::PerAccount(ids) => ids.push(entry),
    }
    true
  }
}

// ─── Post ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
  pub id:           Uuid,
  /// Upstream identity of the item (e.g. the feed entry guid). Unique.
  pub item_id:      String,
  pub title:        String,
  pub link:         Option<String>,
  pub tags:         Vec<String>,
  pub post_ids:     Option<PostIds>,
  pub published_at: Option<DateTime<Utc>>,
  pub created_at:   DateTime<Utc>,
}

impl Post {
  /// Whether at least one platform acknowledged this post.
  pub fn is_delivered(&self) -> bool {
    self.post_ids.as_ref().is_some_and(|ids| !ids.is_empty())
  }

  /// The timestamp the expiry window is measured against.
  pub fn reference_date(&self, field: PostDate) -> DateTime<Utc> {
    match field {
      PostDate::Created => self.created_at,
      PostDate::Published => self.published_at.unwrap_or(self.created_at),
    }
  }
}

/// Input to [`crate::store::BotStore::add_post`].
#[derive(Debug, Clone)]
pub struct NewPost {
  pub item_id:      String,
  pub title:        String,
  pub link:         Option<String>,
  pub tags:         Vec<String>,
  pub published_at: Option<DateTime<Utc>>,
}

impl NewPost {
  pub fn new(item_id: impl Into<String>, title: impl Into<String>) -> Self {
    Self {
      item_id:      item_id.into(),
      title:        title.into(),
      link:         None,
      tags:         Vec::new(),
      published_at: None,
    }
  }
}
