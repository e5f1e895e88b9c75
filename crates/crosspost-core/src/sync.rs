//! Data sync: accounts and feeds from JSON files, and profile pushes.
//!
//! Accounts are keyed by `(api_base_url domain, uid)` and feeds by `uid`.
//! An entry is fetched or created, every supplied field that differs is
//! overwritten, and the row is saved only when something changed. Blank
//! strings count as "clear this field" for optional columns and as "not
//! supplied" for required ones.

use std::{
  fmt,
  path::{Path, PathBuf},
};

use serde::{Deserialize, de::DeserializeOwned};
use tracing::{error, info, warn};

use crate::{
  Error, Result,
  account::{Account, Host, NewAccount, ProfileField, domain_of},
  feed::{Feed, NewFeed},
  platform::Publisher,
  settings::SyncSettings,
  store::BotStore,
};

// ─── File shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AccountEntry {
  pub uid:             Option<String>,
  pub api_base_url:    Option<String>,
  pub host:            Option<String>,
  pub access_token:    Option<String>,
  pub is_enabled:      Option<bool>,
  pub is_bot:          Option<bool>,
  pub is_discoverable: Option<bool>,
  pub is_locked:       Option<bool>,
  pub display_name:    Option<String>,
  pub fields:          Option<Vec<ProfileField>>,
  pub note:            Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedEntry {
  pub uid:        Option<String>,
  pub endpoint:   Option<String>,
  pub is_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountsFile {
  accounts: Vec<AccountEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedsFile {
  feeds: Vec<FeedEntry>,
}

/// Counters for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  pub created: usize,
  pub updated: usize,
  pub skipped: usize,
}

impl SyncReport {
  fn absorb(&mut self, other: SyncReport) {
    self.created += other.created;
    self.updated += other.updated;
    self.skipped += other.skipped;
  }
}

/// Trimmed `value`, `None` for blank strings.
fn sanitise(value: &str) -> Option<String> {
  let trimmed = value.trim();
  (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Read and parse `path`. `Ok(None)` when the file does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
  let raw = match std::fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(err) => {
      return Err(Error::Sync { path: path.to_owned(), reason: err.to_string() });
    }
  };
  serde_json::from_str(&raw)
    .map(Some)
    .map_err(|err| Error::Sync { path: path.to_owned(), reason: err.to_string() })
}

// ─── Field application ───────────────────────────────────────────────────────

/// Overwrite `slot` with `value` when it differs, logging the change.
fn assign<T>(owner: &str, field: &'static str, slot: &mut T, value: T) -> bool
where
  T: PartialEq + fmt::Debug,
{
  if *slot == value {
    return false;
  }
  info!(%owner, field, from = ?slot, to = ?value, "updating");
  *slot = value;
  true
}

/// Apply every supplied field of `entry` to `account`.
pub fn apply_account(entry: &AccountEntry, account: &mut Account) -> bool {
  let owner = account.id.to_string();
  let mut changed = false;

  if let Some(host) = &entry.host {
    changed |= assign(&owner, "host", &mut account.host, Host::from_tag(host));
  }
  if let Some(token) = entry.access_token.as_deref().and_then(sanitise) {
    changed |= assign(&owner, "access_token", &mut account.access_token, token);
  }
  if let Some(v) = entry.is_enabled {
    changed |= assign(&owner, "is_enabled", &mut account.is_enabled, v);
  }
  if let Some(v) = entry.is_bot {
    changed |= assign(&owner, "is_bot", &mut account.is_bot, v);
  }
  if let Some(v) = entry.is_discoverable {
    changed |= assign(&owner, "is_discoverable", &mut account.is_discoverable, v);
  }
  if let Some(v) = entry.is_locked {
    changed |= assign(&owner, "is_locked", &mut account.is_locked, v);
  }
  if let Some(name) = &entry.display_name {
    changed |= assign(&owner, "display_name", &mut account.display_name, sanitise(name));
  }
  if let Some(fields) = &entry.fields {
    changed |= assign(&owner, "fields", &mut account.fields, fields.clone());
  }
  if let Some(note) = &entry.note {
    changed |= assign(&owner, "note", &mut account.note, sanitise(note));
  }
  changed
}

/// Apply every supplied field of `entry` to `feed`.
pub fn apply_feed(entry: &FeedEntry, feed: &mut Feed) -> bool {
  let owner = feed.id.to_string();
  let mut changed = false;
  if let Some(endpoint) = entry.endpoint.as_deref().and_then(sanitise) {
    changed |= assign(&owner, "endpoint", &mut feed.endpoint, endpoint);
  }
  if let Some(v) = entry.is_enabled {
    changed |= assign(&owner, "is_enabled", &mut feed.is_enabled, v);
  }
  changed
}

// ─── Accounts ────────────────────────────────────────────────────────────────

/// Sync accounts from `path`. Created or changed enabled accounts are pushed
/// to their platform.
pub async fn sync_accounts<S, P>(
  store: &S,
  publisher: &P,
  path: &Path,
) -> Result<SyncReport>
where
  S: BotStore,
  P: Publisher,
{
  let mut report = SyncReport::default();
  let Some(file) = read_json::<AccountsFile>(path)? else {
    warn!(path = %path.display(), "accounts file does not exist");
    return Ok(report);
  };

  for entry in file.accounts {
    let uid = entry.uid.as_deref().and_then(sanitise);
    let url = entry.api_base_url.as_deref().and_then(sanitise);
    let (Some(uid), Some(url)) = (uid, url) else {
      warn!(?entry.uid, ?entry.api_base_url, "account entry without identifier; skipping");
      report.skipped += 1;
      continue;
    };
    let Some(domain) = domain_of(&url) else {
      warn!(%url, "account entry with an unparseable endpoint; skipping");
      report.skipped += 1;
      continue;
    };

    let (mut account, created) =
      match store.find_account(&domain, &uid).await.map_err(Error::store)? {
        Some(account) => (account, false),
        None => {
          let Some(token) = entry.access_token.as_deref().and_then(sanitise) else {
            warn!(%uid, %domain, "new account without access token; skipping");
            report.skipped += 1;
            continue;
          };
          let account = match store.insert_account(NewAccount::new(&uid, url, token)).await {
            Ok(account) => account,
            Err(err) => {
              warn!(%uid, %domain, %err, "account entry rejected by the store; skipping");
              report.skipped += 1;
              continue;
            }
          };
          info!(account = %account.id, %domain, uid = %account.uid, "account created");
          (account, true)
        }
      };

    let changed = apply_account(&entry, &mut account);
    if changed {
      if let Err(err) = store.save_account(&account).await {
        warn!(account = %account.id, %domain, %err, "account update rejected by the store; skipping");
        report.skipped += 1;
        continue;
      }
      info!(account = %account.id, "account updated");
    }
    if created {
      report.created += 1;
    } else if changed {
      report.updated += 1;
    }
    if (created || changed) && account.is_enabled {
      push_profile(publisher, &account).await;
    }
  }

  Ok(report)
}

// ─── Feeds ───────────────────────────────────────────────────────────────────

pub async fn sync_feeds<S: BotStore>(store: &S, path: &Path) -> Result<SyncReport> {
  let mut report = SyncReport::default();
  let Some(file) = read_json::<FeedsFile>(path)? else {
    warn!(path = %path.display(), "feeds file does not exist");
    return Ok(report);
  };

  for entry in file.feeds {
    let Some(uid) = entry.uid.as_deref().and_then(sanitise) else {
      warn!("feed entry without uid; skipping");
      report.skipped += 1;
      continue;
    };

    let (mut feed, created) = match store.find_feed(&uid).await.map_err(Error::store)? {
      Some(feed) => (feed, false),
      None => {
        let input = NewFeed {
          endpoint: entry.endpoint.as_deref().and_then(sanitise).unwrap_or_default(),
          is_enabled: entry.is_enabled.unwrap_or(true),
          uid,
        };
        let feed = match store.insert_feed(input).await {
          Ok(feed) => feed,
          Err(err) => {
            warn!(%err, "feed entry rejected by the store; skipping");
            report.skipped += 1;
            continue;
          }
        };
        info!(feed = %feed.id, uid = %feed.uid, "feed created");
        (feed, true)
      }
    };

    if apply_feed(&entry, &mut feed) {
      if let Err(err) = store.save_feed(&feed).await {
        warn!(feed = %feed.id, %err, "feed update rejected by the store; skipping");
        report.skipped += 1;
        continue;
      }
      info!(feed = %feed.id, "feed updated");
      if !created {
        report.updated += 1;
      }
    }
    if created {
      report.created += 1;
    }
  }

  Ok(report)
}

/// Sync every configured file. A missing or malformed file is logged and
/// does not prevent the other from syncing. Entries the store rejects are
/// skipped; lookup failures abort.
pub async fn sync_data<S, P>(
  store: &S,
  publisher: &P,
  settings: &SyncSettings,
) -> Result<SyncReport>
where
  S: BotStore,
  P: Publisher,
{
  let mut report = SyncReport::default();

  match &settings.accounts_file {
    Some(path) => match sync_accounts(store, publisher, path).await {
      Ok(r) => report.absorb(r),
      Err(err @ Error::Sync { .. }) => warn!(%err, "account sync skipped"),
      Err(err) => return Err(err),
    },
    None => warn!("sync.accounts_file is not configured"),
  }

  match &settings.feeds_file {
    Some(path) => match sync_feeds(store, path).await {
      Ok(r) => report.absorb(r),
      Err(err @ Error::Sync { .. }) => warn!(%err, "feed sync skipped"),
      Err(err) => return Err(err),
    },
    None => warn!("sync.feeds_file is not configured"),
  }

  info!(created = report.created, updated = report.updated, skipped = report.skipped, "sync done");
  Ok(report)
}

// ─── Profile push ────────────────────────────────────────────────────────────

async fn push_profile<P: Publisher>(publisher: &P, account: &Account) -> bool {
  match publisher.update_account(account).await {
    Ok(true) => {
      info!(account = %account.id, host = %account.host, "profile pushed");
      true
    }
    Ok(false) => {
      warn!(account = %account.id, host = %account.host, "profile update not acknowledged");
      false
    }
    Err(err) => {
      warn!(account = %account.id, host = %account.host, %err, "profile update failed");
      false
    }
  }
}

/// Push the profile of every enabled account. Returns how many platforms
/// acknowledged the update.
pub async fn update_accounts<S, P>(store: &S, publisher: &P) -> Result<usize>
where
  S: BotStore,
  P: Publisher,
{
  let accounts = store.list_accounts(true).await.map_err(Error::store)?;
  let mut acknowledged = 0;
  for account in &accounts {
    if push_profile(publisher, account).await {
      acknowledged += 1;
    }
  }
  if acknowledged < accounts.len() {
    error!(acknowledged, total = accounts.len(), "some profiles were not updated");
  }
  Ok(acknowledged)
}

/// The files a [`SyncSettings`] points at, for logging.
pub fn configured_files(settings: &SyncSettings) -> Vec<PathBuf> {
  [&settings.accounts_file, &settings.feeds_file]
    .into_iter()
    .flatten()
    .cloned()
    .collect()
}
