//! The `BotStore` trait.
//!
//! Implemented by storage backends (e.g. `crosspost-store-sqlite`). The
//! dispatcher, reconciler and sync operate over this abstraction only.

use std::future::Future;

use uuid::Uuid;

use crate::{
  account::{Account, NewAccount},
  feed::{Feed, NewFeed},
  post::{NewPost, Post, PostIds},
  schedule::{DueSchedule, NewSchedule, Schedule},
  settings::PostOrder,
};

/// Abstraction over the relational rows the bot works on.
///
/// Every mutation touches a single row; there are no transactions spanning
/// several records.
pub trait BotStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether `limit` on [`BotStore::pending_schedules`] is honoured. When it
  /// is not, the whole pending set is processed and throttling is skipped.
  fn supports_offset_limit(&self) -> bool { true }

  /// Round-trip to the backend; used by `check-db`.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Posts ─────────────────────────────────────────────────────────────

  /// Persist a new post. `created_at` is set by the store.
  fn add_post(
    &self,
    input: NewPost,
  ) -> impl Future<Output = Result<Post, Self::Error>> + Send + '_;

  fn get_post(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;

  fn find_post_by_item<'a>(
    &'a self,
    item_id: &'a str,
  ) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + 'a;

  fn list_posts(
    &self,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + '_;

  /// Overwrite only the delivery identifiers of a post.
  fn set_post_ids<'a>(
    &'a self,
    id: Uuid,
    post_ids: &'a PostIds,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Posts that no schedule record references.
  fn unscheduled_posts(
    &self,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + '_;

  /// Delete posts (cascading to their schedules). Returns the number removed.
  fn delete_posts<'a>(
    &'a self,
    ids: &'a [Uuid],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  // ── Schedules ─────────────────────────────────────────────────────────

  /// Create a schedule record. Returns `None` without writing when a record
  /// already references the post.
  fn create_schedule(
    &self,
    input: NewSchedule,
  ) -> impl Future<Output = Result<Option<Schedule>, Self::Error>> + Send + '_;

  fn schedule_for_post(
    &self,
    post_id: Uuid,
  ) -> impl Future<Output = Result<Option<Schedule>, Self::Error>> + Send + '_;

  /// Records whose post has no delivery identifier yet, at most `limit`.
  fn pending_schedules(
    &self,
    order: PostOrder,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<DueSchedule>, Self::Error>> + Send + '_;

  /// Records whose post already carries at least one identifier.
  fn updating_schedules(
    &self,
    order: PostOrder,
  ) -> impl Future<Output = Result<Vec<DueSchedule>, Self::Error>> + Send + '_;

  fn delete_schedule(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Accounts ──────────────────────────────────────────────────────────

  /// Look up an account by normalised endpoint domain and uid.
  fn find_account<'a>(
    &'a self,
    domain: &'a str,
    uid: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  /// Insert an account after checking (domain, uid) uniqueness.
  fn insert_account(
    &self,
    input: NewAccount,
  ) -> impl Future<Output = Result<Account, Self::Error>> + Send + '_;

  /// Rewrite every column of an existing account, re-checking uniqueness.
  fn save_account<'a>(
    &'a self,
    account: &'a Account,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn list_accounts(
    &self,
    enabled_only: bool,
  ) -> impl Future<Output = Result<Vec<Account>, Self::Error>> + Send + '_;

  // ── Feeds ─────────────────────────────────────────────────────────────

  fn find_feed<'a>(
    &'a self,
    uid: &'a str,
  ) -> impl Future<Output = Result<Option<Feed>, Self::Error>> + Send + 'a;

  fn insert_feed(
    &self,
    input: NewFeed,
  ) -> impl Future<Output = Result<Feed, Self::Error>> + Send + '_;

  fn save_feed<'a>(
    &'a self,
    feed: &'a Feed,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn list_feeds(
    &self,
    enabled_only: bool,
  ) -> impl Future<Output = Result<Vec<Feed>, Self::Error>> + Send + '_;
}
