//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so that they sort
//! lexically. Tags, profile fields and delivery identifiers are stored as
//! compact JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use crosspost_core::{
  account::{Account, Host, ProfileField},
  feed::Feed,
  post::{Post, PostIds},
  schedule::Schedule,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn encode_post_ids(ids: &PostIds) -> Result<String> {
  Ok(serde_json::to_string(ids)?)
}

pub fn encode_fields(fields: &[ProfileField]) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const POST_COLUMNS: &str = "p.post_id, p.item_id, p.title, p.link, p.tags, \
                                p.post_ids, p.published_at, p.created_at";

pub const SCHEDULE_COLUMNS: &str = "s.schedule_id, s.name, s.post_id, s.receiver, \
                                    s.visibility, s.scheduled_at";

pub const ACCOUNT_COLUMNS: &str = "account_id, uid, host, access_token, api_base_url, \
                                   is_enabled, is_bot, is_discoverable, is_locked, \
                                   display_name, fields, note";

pub const FEED_COLUMNS: &str = "feed_id, uid, endpoint, is_enabled";

/// Number of columns in [`SCHEDULE_COLUMNS`].
pub const SCHEDULE_WIDTH: usize = 6;

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `posts` row.
pub struct RawPost {
  pub post_id:      String,
  pub item_id:      String,
  pub title:        String,
  pub link:         Option<String>,
  pub tags:         String,
  pub post_ids:     Option<String>,
  pub published_at: Option<String>,
  pub created_at:   String,
}

impl RawPost {
  /// Read [`POST_COLUMNS`] starting at column `at`.
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      post_id:      row.get(at)?,
      item_id:      row.get(at + 1)?,
      title:        row.get(at + 2)?,
      link:         row.get(at + 3)?,
      tags:         row.get(at + 4)?,
      post_ids:     row.get(at + 5)?,
      published_at: row.get(at + 6)?,
      created_at:   row.get(at + 7)?,
    })
  }

  pub fn into_post(self) -> Result<Post> {
    let post_ids = self
      .post_ids
      .as_deref()
      .map(serde_json::from_str::<PostIds>)
      .transpose()?;

    Ok(Post {
      id: decode_uuid(&self.post_id)?,
      item_id: self.item_id,
      title: self.title,
      link: self.link,
      tags: serde_json::from_str(&self.tags)?,
      post_ids,
      published_at: self.published_at.as_deref().map(decode_dt).transpose()?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `schedules` row.
pub struct RawSchedule {
  pub schedule_id:  String,
  pub name:         String,
  pub post_id:      String,
  pub receiver:     Option<String>,
  pub visibility:   Option<String>,
  pub scheduled_at: String,
}

impl RawSchedule {
  /// Read [`SCHEDULE_COLUMNS`] starting at column `at`.
  pub fn from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      schedule_id:  row.get(at)?,
      name:         row.get(at + 1)?,
      post_id:      row.get(at + 2)?,
      receiver:     row.get(at + 3)?,
      visibility:   row.get(at + 4)?,
      scheduled_at: row.get(at + 5)?,
    })
  }

  pub fn into_schedule(self) -> Result<Schedule> {
    Ok(Schedule {
      id:           decode_uuid(&self.schedule_id)?,
      name:         self.name,
      post_id:      decode_uuid(&self.post_id)?,
      receiver:     self.receiver,
      visibility:   self.visibility,
      scheduled_at: decode_dt(&self.scheduled_at)?,
    })
  }
}

/// Raw values read from an `accounts` row.
pub struct RawAccount {
  pub account_id:      String,
  pub uid:             String,
  pub host:            String,
  pub access_token:    String,
  pub api_base_url:    String,
  pub is_enabled:      bool,
  pub is_bot:          bool,
  pub is_discoverable: bool,
  pub is_locked:       bool,
  pub display_name:    Option<String>,
  pub fields:          String,
  pub note:            Option<String>,
}

impl RawAccount {
  /// Read [`ACCOUNT_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id:      row.get(0)?,
      uid:             row.get(1)?,
      host:            row.get(2)?,
      access_token:    row.get(3)?,
      api_base_url:    row.get(4)?,
      is_enabled:      row.get(5)?,
      is_bot:          row.get(6)?,
      is_discoverable: row.get(7)?,
      is_locked:       row.get(8)?,
      display_name:    row.get(9)?,
      fields:          row.get(10)?,
      note:            row.get(11)?,
    })
  }

  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      id:              decode_uuid(&self.account_id)?,
      uid:             self.uid,
      host:            Host::from_tag(&self.host),
      access_token:    self.access_token,
      api_base_url:    self.api_base_url,
      is_enabled:      self.is_enabled,
      is_bot:          self.is_bot,
      is_discoverable: self.is_discoverable,
      is_locked:       self.is_locked,
      display_name:    self.display_name,
      fields:          serde_json::from_str(&self.fields)?,
      note:            self.note,
    })
  }
}

/// Raw values read from a `feeds` row.
pub struct RawFeed {
  pub feed_id:    String,
  pub uid:        String,
  pub endpoint:   String,
  pub is_enabled: bool,
}

impl RawFeed {
  /// Read [`FEED_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      feed_id:    row.get(0)?,
      uid:        row.get(1)?,
      endpoint:   row.get(2)?,
      is_enabled: row.get(3)?,
    })
  }

  pub fn into_feed(self) -> Result<Feed> {
    Ok(Feed {
      id:         decode_uuid(&self.feed_id)?,
      uid:        self.uid,
      endpoint:   self.endpoint,
      is_enabled: self.is_enabled,
    })
  }
}
