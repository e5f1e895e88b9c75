//! Accounts: configured destination identities on a platform.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Host ────────────────────────────────────────────────────────────────────

/// The platform an account lives on.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Host {
  #[default]
  Mastodon,
  Bluesky,
}

impl Host {
  /// Hard character budget of a single post.
  pub fn char_limit(self) -> usize {
    match self {
      Self::Mastodon => 500,
      Self::Bluesky => 300,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Mastodon => "mastodon",
      Self::Bluesky => "bluesky",
    }
  }

  /// Parse a stored host tag. Anything that is not Bluesky is treated as a
  /// Mastodon-compatible server.
  pub fn from_tag(tag: &str) -> Self {
    if tag.trim().eq_ignore_ascii_case("bluesky") {
      Self::Bluesky
    } else {
      Self::Mastodon
    }
  }
}

impl fmt::Display for Host {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// A name/value pair shown on the account profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileField {
  pub name:  String,
  pub value: String,
}

// ─── Account ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
  pub id:              Uuid,
  pub uid:             String,
  pub host:            Host,
  /// Secret token (Mastodon) or app password (Bluesky). Unique.
  pub access_token:    String,
  pub api_base_url:    String,
  pub is_enabled:      bool,
  pub is_bot:          bool,
  pub is_discoverable: bool,
  pub is_locked:       bool,
  pub display_name:    Option<String>,
  pub fields:          Vec<ProfileField>,
  /// Bio or description.
  pub note:            Option<String>,
}

impl Account {
  /// The normalised API endpoint: only the network location is kept.
  pub fn domain(&self) -> Option<String> { domain_of(&self.api_base_url) }

  /// The per-account identity: `uid@domain` on Mastodon, the handle
  /// `uid.domain` on Bluesky.
  pub fn identity(&self) -> Option<String> {
    let domain = self.domain()?;
    if self.uid.is_empty() {
      return None;
    }
    Some(match self.host {
      Host::Mastodon => format!("{}@{}", self.uid, domain),
      Host::Bluesky => format!("{}.{}", self.uid, domain),
    })
  }
}

/// Input to [`crate::store::BotStore::insert_account`].
#[derive(Debug, Clone)]
pub struct NewAccount {
  pub uid:             String,
  pub host:            Host,
  pub access_token:    String,
  pub api_base_url:    String,
  pub is_enabled:      bool,
  pub is_bot:          bool,
  pub is_discoverable: bool,
  pub is_locked:       bool,
  pub display_name:    Option<String>,
  pub fields:          Vec<ProfileField>,
  pub note:            Option<String>,
}

impl NewAccount {
  /// An enabled, discoverable bot account with an empty profile.
  pub fn new(
    uid: impl Into<String>,
    api_base_url: impl Into<String>,
    access_token: impl Into<String>,
  ) -> Self {
    Self {
      uid:             uid.into(),
      host:            Host::default(),
      access_token:    access_token.into(),
      api_base_url:    api_base_url.into(),
      is_enabled:      true,
      is_bot:          true,
      is_discoverable: true,
      is_locked:       false,
      display_name:    None,
      fields:          Vec::new(),
      note:            None,
    }
  }

  pub fn into_account(self, id: Uuid) -> Account {
    Account {
      id,
      uid: self.uid,
      host: self.host,
      access_token: self.access_token,
      api_base_url: self.api_base_url,
      is_enabled: self.is_enabled,
      is_bot: self.is_bot,
      is_discoverable: self.is_discoverable,
      is_locked: self.is_locked,
      display_name: self.display_name,
      fields: self.fields,
      note: self.note,
    }
  }
}

/// Network location (host and optional port) of `url`, or `None` when it
/// does not parse as an absolute URL.
pub fn domain_of(url: &str) -> Option<String> {
  let parsed = url::Url::parse(url.trim()).ok()?;
  let host = parsed.host_str()?;
  Some(match parsed.port() {
    Some(port) => format!("{host}:{port}"),
    None => host.to_owned(),
  })
}
