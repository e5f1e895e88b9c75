//! [`SqliteStore`]: the SQLite implementation of [`BotStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use crosspost_core::{
  account::{Account, NewAccount, domain_of},
  feed::{Feed, NewFeed},
  post::{NewPost, Post, PostIds},
  schedule::{DueSchedule, NewSchedule, Schedule},
  settings::PostOrder,
  store::BotStore,
};

use crate::{
  Error, Result,
  encode::{
    ACCOUNT_COLUMNS, FEED_COLUMNS, POST_COLUMNS, RawAccount, RawFeed, RawPost,
    RawSchedule, SCHEDULE_COLUMNS, SCHEDULE_WIDTH, encode_dt, encode_fields,
    encode_post_ids, encode_tags, encode_uuid,
  },
  schema::SCHEMA,
};

/// Predicate matching posts that carry no delivery identifier.
const UNDELIVERED: &str =
  "(p.post_ids IS NULL OR p.post_ids = '[]' OR p.post_ids = '\"\"')";
const DELIVERED: &str =
  "NOT (p.post_ids IS NULL OR p.post_ids = '[]' OR p.post_ids = '\"\"')";

fn order_clause(order: PostOrder) -> &'static str {
  match order {
    PostOrder::Id => "ORDER BY s.schedule_id",
    PostOrder::Published => {
      "ORDER BY p.published_at IS NULL, p.published_at, s.schedule_id"
    }
  }
}

/// Normalised endpoint used for the (domain, uid) uniqueness check.
fn api_domain(api_base_url: &str) -> String {
  domain_of(api_base_url).unwrap_or_else(|| api_base_url.trim().to_owned())
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A bot store backed by a single SQLite file.
///
/// Clones share the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Schedules joined with their post, filtered by `predicate`.
  async fn due_schedules(
    &self,
    predicate: &'static str,
    order: PostOrder,
    limit: Option<usize>,
  ) -> Result<Vec<DueSchedule>> {
    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.map_or(-1, |l| l as i64);
    let sql = format!(
      "SELECT {SCHEDULE_COLUMNS}, {POST_COLUMNS}
       FROM schedules s
       JOIN posts p ON p.post_id = s.post_id
       WHERE {predicate}
       {}
       LIMIT ?1",
      order_clause(order),
    );

    let raws: Vec<(RawSchedule, RawPost)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![limit], |row| {
            Ok((
              RawSchedule::from_row(row, 0)?,
              RawPost::from_row(row, SCHEDULE_WIDTH)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|(s, p)| {
        Ok(DueSchedule { schedule: s.into_schedule()?, post: p.into_post()? })
      })
      .collect()
  }

  async fn posts_where(&self, predicate: &'static str) -> Result<Vec<Post>> {
    let sql = format!(
      "SELECT {POST_COLUMNS} FROM posts p WHERE {predicate} ORDER BY p.post_id"
    );
    let raws: Vec<RawPost> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| RawPost::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawPost::into_post).collect()
  }

  /// Write `account`, inserting or replacing it, after checking that no
  /// other account shares its (domain, uid).
  async fn write_account(&self, account: &Account, insert: bool) -> Result<()> {
    let id_str = encode_uuid(account.id);
    let uid = account.uid.clone();
    let domain = api_domain(&account.api_base_url);
    let host = account.host.as_str().to_owned();
    let token = account.access_token.clone();
    let url = account.api_base_url.clone();
    let flags = (
      account.is_enabled,
      account.is_bot,
      account.is_discoverable,
      account.is_locked,
    );
    let display_name = account.display_name.clone();
    let fields = encode_fields(&account.fields)?;
    let note = account.note.clone();

    let (check_uid, check_domain) = (uid.clone(), domain.clone());
    let written: Option<usize> = self
      .conn
      .call(move |conn| {
        let taken = conn
          .query_row(
            "SELECT 1 FROM accounts
             WHERE api_domain = ?1 AND uid = ?2 AND account_id != ?3",
            rusqlite::params![check_domain, check_uid, id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(None);
        }

        let sql = if insert {
          "INSERT INTO accounts (
             account_id, uid, api_domain, host, access_token, api_base_url,
             is_enabled, is_bot, is_discoverable, is_locked,
             display_name, fields, note
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        } else {
          "UPDATE accounts SET
             uid = ?2, api_domain = ?3, host = ?4, access_token = ?5,
             api_base_url = ?6, is_enabled = ?7, is_bot = ?8,
             is_discoverable = ?9, is_locked = ?10,
             display_name = ?11, fields = ?12, note = ?13
           WHERE account_id = ?1"
        };
        let n = conn.execute(
          sql,
          rusqlite::params![
            id_str,
            uid,
            domain,
            host,
            token,
            url,
            flags.0,
            flags.1,
            flags.2,
            flags.3,
            display_name,
            fields,
            note,
          ],
        )?;
        Ok(Some(n))
      })
      .await?;

    match written {
      None => Err(Error::Core(crosspost_core::Error::DuplicateAccount {
        uid:    account.uid.clone(),
        domain: api_domain(&account.api_base_url),
      })),
      Some(0) => Err(Error::NotFound { kind: "account", id: account.id }),
      Some(_) => Ok(()),
    }
  }
}

// ─── BotStore impl ───────────────────────────────────────────────────────────

impl BotStore for SqliteStore {
  type Error = Error;

  async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Posts ─────────────────────────────────────────────────────────────────

  async fn add_post(&self, input: NewPost) -> Result<Post> {
    let post = Post {
      id:           Uuid::now_v7(),
      item_id:      input.item_id,
      title:        input.title,
      link:         input.link,
      tags:         input.tags,
      post_ids:     None,
      published_at: input.published_at,
      created_at:   Utc::now(),
    };

    let id_str        = encode_uuid(post.id);
    let item_id       = post.item_id.clone();
    let title         = post.title.clone();
    let link          = post.link.clone();
    let tags_str      = encode_tags(&post.tags)?;
    let published_str = post.published_at.map(encode_dt);
    let created_str   = encode_dt(post.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO posts (
             post_id, item_id, title, link, tags, post_ids, published_at, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)",
          rusqlite::params![
            id_str,
            item_id,
            title,
            link,
            tags_str,
            published_str,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(post)
  }

  async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawPost> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.post_id = ?1"),
              rusqlite::params![id_str],
              |row| RawPost::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawPost::into_post).transpose()
  }

  async fn find_post_by_item(&self, item_id: &str) -> Result<Option<Post>> {
    let item_id = item_id.to_owned();
    let raw: Option<RawPost> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.item_id = ?1"),
              rusqlite::params![item_id],
              |row| RawPost::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawPost::into_post).transpose()
  }

  async fn list_posts(&self) -> Result<Vec<Post>> { self.posts_where("1 = 1").await }

  async fn set_post_ids(&self, id: Uuid, post_ids: &PostIds) -> Result<()> {
    let id_str = encode_uuid(id);
    let ids_str = encode_post_ids(post_ids)?;

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE posts SET post_ids = ?2 WHERE post_id = ?1",
          rusqlite::params![id_str, ids_str],
        )?)
      })
      .await?;

    if n == 0 {
      return Err(Error::NotFound { kind: "post", id });
    }
    Ok(())
  }

  async fn unscheduled_posts(&self) -> Result<Vec<Post>> {
    self
      .posts_where(
        "NOT EXISTS (SELECT 1 FROM schedules s WHERE s.post_id = p.post_id)",
      )
      .await
  }

  async fn delete_posts(&self, ids: &[Uuid]) -> Result<usize> {
    let id_strs: Vec<String> = ids.iter().copied().map(encode_uuid).collect();
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
          let mut stmt = tx.prepare("DELETE FROM posts WHERE post_id = ?1")?;
          for id in &id_strs {
            removed += stmt.execute(rusqlite::params![id])?;
          }
        }
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    debug!(requested = ids.len(), removed, "deleted posts");
    Ok(removed)
  }

  // ── Schedules ─────────────────────────────────────────────────────────────

  async fn create_schedule(&self, input: NewSchedule) -> Result<Option<Schedule>> {
    let schedule = Schedule {
      id:           Uuid::now_v7(),
      name:         input.name().to_owned(),
      post_id:      input.post_id,
      receiver:     input.receiver,
      visibility:   input.visibility,
      scheduled_at: Utc::now(),
    };

    let id_str      = encode_uuid(schedule.id);
    let name        = schedule.name.clone();
    let post_id_str = encode_uuid(schedule.post_id);
    let receiver    = schedule.receiver.clone();
    let visibility  = schedule.visibility.clone();
    let at_str      = encode_dt(schedule.scheduled_at);

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO schedules (
             schedule_id, name, post_id, receiver, visibility, scheduled_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (post_id) DO NOTHING",
          rusqlite::params![id_str, name, post_id_str, receiver, visibility, at_str],
        )?)
      })
      .await?;

    Ok((inserted > 0).then_some(schedule))
  }

  async fn schedule_for_post(&self, post_id: Uuid) -> Result<Option<Schedule>> {
    let post_id_str = encode_uuid(post_id);
    let raw: Option<RawSchedule> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules s WHERE s.post_id = ?1"),
              rusqlite::params![post_id_str],
              |row| RawSchedule::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSchedule::into_schedule).transpose()
  }

  async fn pending_schedules(
    &self,
    order: PostOrder,
    limit: Option<usize>,
  ) -> Result<Vec<DueSchedule>> {
    self.due_schedules(UNDELIVERED, order, limit).await
  }

  async fn updating_schedules(&self, order: PostOrder) -> Result<Vec<DueSchedule>> {
    self.due_schedules(DELIVERED, order, None).await
  }

  async fn delete_schedule(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM schedules WHERE schedule_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn find_account(&self, domain: &str, uid: &str) -> Result<Option<Account>> {
    let domain = domain.trim().to_owned();
    let uid = uid.to_owned();
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts
                 WHERE api_domain = ?1 AND uid = ?2"
              ),
              rusqlite::params![domain, uid],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }

  async fn insert_account(&self, input: NewAccount) -> Result<Account> {
    let account = input.into_account(Uuid::now_v7());
    self.write_account(&account, true).await?;
    Ok(account)
  }

  async fn save_account(&self, account: &Account) -> Result<()> {
    self.write_account(account, false).await
  }

  async fn list_accounts(&self, enabled_only: bool) -> Result<Vec<Account>> {
    let sql = format!(
      "SELECT {ACCOUNT_COLUMNS} FROM accounts
       WHERE (?1 = 0 OR is_enabled = 1)
       ORDER BY account_id"
    );
    let raws: Vec<RawAccount> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![enabled_only], RawAccount::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawAccount::into_account).collect()
  }

  // ── Feeds ─────────────────────────────────────────────────────────────────

  async fn find_feed(&self, uid: &str) -> Result<Option<Feed>> {
    let uid = uid.to_owned();
    let raw: Option<RawFeed> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE uid = ?1"),
              rusqlite::params![uid],
              RawFeed::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawFeed::into_feed).transpose()
  }

  async fn insert_feed(&self, input: NewFeed) -> Result<Feed> {
    let feed = Feed {
      id:         Uuid::now_v7(),
      uid:        input.uid,
      endpoint:   input.endpoint,
      is_enabled: input.is_enabled,
    };

    let id_str   = encode_uuid(feed.id);
    let uid      = feed.uid.clone();
    let endpoint = feed.endpoint.clone();
    let enabled  = feed.is_enabled;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO feeds (feed_id, uid, endpoint, is_enabled)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, uid, endpoint, enabled],
        )?;
        Ok(())
      })
      .await?;

    Ok(feed)
  }

  async fn save_feed(&self, feed: &Feed) -> Result<()> {
    let id_str   = encode_uuid(feed.id);
    let uid      = feed.uid.clone();
    let endpoint = feed.endpoint.clone();
    let enabled  = feed.is_enabled;

    let n = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE feeds SET uid = ?2, endpoint = ?3, is_enabled = ?4
           WHERE feed_id = ?1",
          rusqlite::params![id_str, uid, endpoint, enabled],
        )?)
      })
      .await?;

    if n == 0 {
      return Err(Error::NotFound { kind: "feed", id: feed.id });
    }
    Ok(())
  }

  async fn list_feeds(&self, enabled_only: bool) -> Result<Vec<Feed>> {
    let sql = format!(
      "SELECT {FEED_COLUMNS} FROM feeds
       WHERE (?1 = 0 OR is_enabled = 1)
       ORDER BY feed_id"
    );
    let raws: Vec<RawFeed> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![enabled_only], RawFeed::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawFeed::into_feed).collect()
  }
}
