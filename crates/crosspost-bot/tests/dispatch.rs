//! Dispatcher ticks against the SQLite store and a scripted publisher.

mod common;

use std::{
  io,
  sync::{Arc, Mutex},
};

use chrono::{Duration, Utc};
use common::{FakePublisher, bluesky, mastodon, store};
use crosspost_core::{
  account::{Account, Host, NewAccount},
  dispatch::{TickSummary, post_scheduler},
  feed::{Feed, NewFeed},
  post::{NewPost, Post, PostIds},
  reconcile::clean_data,
  schedule::{DueSchedule, NewSchedule, Schedule},
  scheduling::{record_post, schedule_post},
  settings::{PostDate, PostOrder, SchedulerSettings, Visibility},
  store::BotStore,
};
use crosspost_store_sqlite::{Error, SqliteStore};
use uuid::Uuid;

fn new_post(item: &str) -> NewPost {
  let mut post = NewPost::new(item, format!("Post {item}"));
  post.link = Some(format!("https://blog.example/{item}"));
  post.tags = vec!["rust".into()];
  post
}

#[tokio::test]
async fn failed_account_is_retried_alone() {
  let s = store().await;
  let alpha = mastodon(&s, "alpha").await;
  let beta = bluesky(&s, "beta").await;
  let publisher = FakePublisher::default();
  publisher.fail("beta");
  let settings = SchedulerSettings::default();

  let (post, schedule) = record_post(&s, &settings, new_post("1")).await.unwrap();
  assert!(schedule.is_some());

  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!(summary, TickSummary {
    drafted:   1,
    updating:  0,
    sent:      1,
    failed:    1,
    completed: 0,
    retained:  1,
  });
  let ids = s.get_post(post.id).await.unwrap().unwrap().post_ids.unwrap();
  assert_eq!(ids.for_account(alpha.id), Some("alpha-0"));
  assert_eq!(ids.for_account(beta.id), None);

  // Partially delivered: picked up as an update, alpha is not sent again.
  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!((summary.drafted, summary.updating), (0, 1));
  assert_eq!((summary.sent, summary.failed, summary.retained), (0, 1, 1));

  publisher.recover("beta");
  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!((summary.sent, summary.completed), (1, 1));
  assert!(s.schedule_for_post(post.id).await.unwrap().is_none());

  let ids = s.get_post(post.id).await.unwrap().unwrap().post_ids.unwrap();
  assert_eq!(ids.entries().len(), 2);
  assert_eq!(ids.for_account(beta.id), Some("beta-1"));
  assert_eq!(publisher.sent_by("alpha").len(), 1);
  assert_eq!(publisher.sent_by("beta").len(), 1);
}

#[tokio::test]
async fn without_retries_a_partial_delivery_is_discarded() {
  let s = store().await;
  mastodon(&s, "alpha").await;
  bluesky(&s, "beta").await;
  let publisher = FakePublisher::default();
  publisher.fail("beta");
  let settings = SchedulerSettings { retry_post: false, ..Default::default() };

  let (post, _) = record_post(&s, &settings, new_post("1")).await.unwrap();
  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!((summary.failed, summary.completed, summary.retained), (1, 1, 0));
  assert!(s.schedule_for_post(post.id).await.unwrap().is_none());

  // Delivered to alpha, so the reconciler purges it instead of rescheduling.
  let cleaned = clean_data(&s, &settings).await.unwrap();
  assert_eq!(cleaned.deleted, 1);
  assert!(s.get_post(post.id).await.unwrap().is_none());
}

#[tokio::test]
async fn post_limit_caps_new_records_per_tick() {
  let s = store().await;
  mastodon(&s, "alpha").await;
  let publisher = FakePublisher::default();
  let settings = SchedulerSettings { post_limit: 2, ..Default::default() };

  for item in ["1", "2", "3", "4", "5"] {
    record_post(&s, &settings, new_post(item)).await.unwrap();
  }

  let mut drafted = Vec::new();
  for _ in 0..4 {
    drafted.push(post_scheduler(&s, &publisher, &settings).await.unwrap().drafted);
  }
  assert_eq!(drafted, vec![2, 2, 1, 0]);

  let order: Vec<String> = publisher.sent().into_iter().map(|c| c.content).collect();
  assert!(order[0].starts_with("Post 1"));
  assert!(order[4].starts_with("Post 5"));
}

#[tokio::test]
async fn organic_ticks_draft_between_a_third_and_the_limit() {
  let s = store().await;
  mastodon(&s, "alpha").await;
  let publisher = FakePublisher::default();
  let settings = SchedulerSettings {
    post_limit: 3,
    organic_posts: true,
    ..Default::default()
  };

  for n in 0..30 {
    record_post(&s, &settings, new_post(&n.to_string())).await.unwrap();
  }
  for _ in 0..5 {
    let drafted = post_scheduler(&s, &publisher, &settings).await.unwrap().drafted;
    assert!((1..=3).contains(&drafted), "drafted {drafted}");
  }
}

/// A backend that ignores `limit` on pending schedules.
struct Unsliced(SqliteStore);

impl BotStore for Unsliced {
  type Error = Error;

  fn supports_offset_limit(&self) -> bool { false }

  async fn ping(&self) -> Result<(), Error> { self.0.ping().await }

  async fn add_post(&self, input: NewPost) -> Result<Post, Error> { self.0.add_post(input).await }

  async fn get_post(&self, id: Uuid) -> Result<Option<Post>, Error> { self.0.get_post(id).await }

  async fn find_post_by_item(&self, item_id: &str) -> Result<Option<Post>, Error> {
    self.0.find_post_by_item(item_id).await
  }

  async fn list_posts(&self) -> Result<Vec<Post>, Error> { self.0.list_posts().await }

  async fn set_post_ids(&self, id: Uuid, post_ids: &PostIds) -> Result<(), Error> {
    self.0.set_post_ids(id, post_ids).await
  }

  async fn unscheduled_posts(&self) -> Result<Vec<Post>, Error> { self.0.unscheduled_posts().await }

  async fn delete_posts(&self, ids: &[Uuid]) -> Result<usize, Error> { self.0.delete_posts(ids).await }

  async fn create_schedule(&self, input: NewSchedule) -> Result<Option<Schedule>, Error> {
    self.0.create_schedule(input).await
  }

  async fn schedule_for_post(&self, post_id: Uuid) -> Result<Option<Schedule>, Error> {
    self.0.schedule_for_post(post_id).await
  }

  async fn pending_schedules(
    &self,
    order: PostOrder,
    _limit: Option<usize>,
  ) -> Result<Vec<DueSchedule>, Error> {
    self.0.pending_schedules(order, None).await
  }

  async fn updating_schedules(&self, order: PostOrder) -> Result<Vec<DueSchedule>, Error> {
    self.0.updating_schedules(order).await
  }

  async fn delete_schedule(&self, id: Uuid) -> Result<(), Error> { self.0.delete_schedule(id).await }

  async fn find_account(&self, domain: &str, uid: &str) -> Result<Option<Account>, Error> {
    self.0.find_account(domain, uid).await
  }

  async fn insert_account(&self, input: NewAccount) -> Result<Account, Error> {
    self.0.insert_account(input).await
  }

  async fn save_account(&self, account: &Account) -> Result<(), Error> {
    self.0.save_account(account).await
  }

  async fn list_accounts(&self, enabled_only: bool) -> Result<Vec<Account>, Error> {
    self.0.list_accounts(enabled_only).await
  }

  async fn find_feed(&self, uid: &str) -> Result<Option<Feed>, Error> { self.0.find_feed(uid).await }

  async fn insert_feed(&self, input: NewFeed) -> Result<Feed, Error> { self.0.insert_feed(input).await }

  async fn save_feed(&self, feed: &Feed) -> Result<(), Error> { self.0.save_feed(feed).await }

  async fn list_feeds(&self, enabled_only: bool) -> Result<Vec<Feed>, Error> {
    self.0.list_feeds(enabled_only).await
  }
}

#[tokio::test]
async fn store_without_slicing_drafts_every_pending_record() {
  let s = Unsliced(store().await);
  mastodon(&s.0, "alpha").await;
  let publisher = FakePublisher::default();
  let settings = SchedulerSettings {
    post_limit: 2,
    organic_posts: true,
    ..Default::default()
  };

  for item in ["1", "2", "3", "4", "5"] {
    record_post(&s, &settings, new_post(item)).await.unwrap();
  }

  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!((summary.drafted, summary.sent, summary.completed), (5, 5, 5));
  assert!(s.pending_schedules(PostOrder::default(), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn content_is_rendered_per_host_and_addressed() {
  let s = store().await;
  mastodon(&s, "alpha").await;
  mastodon(&s, "gamma").await;
  bluesky(&s, "beta").await;
  let publisher = FakePublisher::default();
  let settings = SchedulerSettings::default();

  let mut input = new_post("1");
  input.title = "a".repeat(400);
  let post = s.add_post(input).await.unwrap();
  schedule_post(&s, post.id, Some("alice@example.social".into()), None)
    .await
    .unwrap()
    .unwrap();

  post_scheduler(&s, &publisher, &settings).await.unwrap();
  let sent = publisher.sent();
  assert_eq!(sent.len(), 3);
  for call in &sent {
    assert!(call.content.starts_with("@alice@example.social "), "{}", call.content);
    assert_eq!(call.visibility, Visibility::Direct);
  }

  let toots: Vec<_> = sent.iter().filter(|c| c.host == Host::Mastodon).collect();
  assert_eq!(toots[0].content, toots[1].content);
  assert!(toots[0].content.contains(" #rust\n\nhttps://blog.example/1"));

  // 400 characters plus the tag and link does not fit in 300.
  let sky = sent.iter().find(|c| c.host == Host::Bluesky).unwrap();
  assert!(!sky.content.contains("#rust"));
  assert!(sky.content.ends_with("\n\nhttps://blog.example/1"));
  assert!(sky.content.len() < toots[0].content.len());
  // The receiver prefix counts against the 300 budget.
  assert!(sky.content.chars().count() <= Host::Bluesky.char_limit(), "{}", sky.content);
}

#[tokio::test]
async fn update_delivered_edits_instead_of_skipping() {
  let s = store().await;
  let alpha = mastodon(&s, "alpha").await;
  let publisher = FakePublisher::default();
  let plain = SchedulerSettings::default();

  let (post, _) = record_post(&s, &plain, new_post("1")).await.unwrap();
  post_scheduler(&s, &publisher, &plain).await.unwrap();
  assert!(s.schedule_for_post(post.id).await.unwrap().is_none());

  // Schedule it again: without the flag a delivered account is skipped.
  schedule_post(&s, post.id, None, None).await.unwrap();
  let summary = post_scheduler(&s, &publisher, &plain).await.unwrap();
  assert_eq!((summary.updating, summary.sent, summary.completed), (1, 0, 1));

  schedule_post(&s, post.id, None, Some("unlisted".into())).await.unwrap();
  let settings = SchedulerSettings { update_delivered: true, ..Default::default() };
  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!((summary.sent, summary.completed), (1, 1));

  let sent = publisher.sent();
  assert_eq!(sent.len(), 2);
  assert_eq!(sent[1].prior_id.as_deref(), Some("alpha-0"));
  assert_eq!(sent[1].visibility, Visibility::Unlisted);

  let ids = s.get_post(post.id).await.unwrap().unwrap().post_ids.unwrap();
  assert_eq!(ids.entries().len(), 1);
  assert_eq!(ids.for_account(alpha.id), Some("alpha-0"));
}

#[tokio::test]
async fn account_without_session_keeps_the_record() {
  let s = store().await;
  mastodon(&s, "alpha").await;
  bluesky(&s, "beta").await;
  let publisher = FakePublisher::default();
  publisher.without_session("beta");
  let settings = SchedulerSettings::default();

  record_post(&s, &settings, new_post("1")).await.unwrap();
  record_post(&s, &settings, new_post("2")).await.unwrap();

  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!((summary.sent, summary.failed, summary.retained), (2, 2, 2));
  // One login attempt per account per tick.
  assert_eq!(publisher.logins(), 2);
}

/// Log lines written while the guard returned by [`capture_logs`] is alive.
#[derive(Clone, Default)]
struct Logs(Arc<Mutex<Vec<u8>>>);

impl Logs {
  fn count(&self, message: &str) -> usize {
    String::from_utf8_lossy(&self.0.lock().unwrap()).matches(message).count()
  }
}

impl io::Write for Logs {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().unwrap().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

fn capture_logs() -> (Logs, tracing::subscriber::DefaultGuard) {
  let logs = Logs::default();
  let writer = logs.clone();
  let subscriber = tracing_subscriber::fmt()
    .with_ansi(false)
    .with_max_level(tracing::Level::DEBUG)
    .with_writer(move || writer.clone())
    .finish();
  (logs, tracing::subscriber::set_default(subscriber))
}

#[tokio::test]
async fn rejected_login_is_reported_once() {
  let s = store().await;
  mastodon(&s, "alpha").await;
  bluesky(&s, "beta").await;
  let publisher = FakePublisher::default();
  publisher.reject_login("beta");
  let settings = SchedulerSettings::default();

  record_post(&s, &settings, new_post("1")).await.unwrap();
  record_post(&s, &settings, new_post("2")).await.unwrap();

  let (logs, _guard) = capture_logs();
  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!((summary.sent, summary.failed, summary.retained), (2, 2, 2));
  assert_eq!(publisher.logins(), 2);

  assert_eq!(logs.count("login failed"), 1);
  assert_eq!(logs.count("no session for account"), 0);
}

#[tokio::test]
async fn no_accounts_leaves_schedules_alone() {
  let s = store().await;
  let publisher = FakePublisher::default();
  let settings = SchedulerSettings::default();

  let (post, _) = record_post(&s, &settings, new_post("1")).await.unwrap();
  let summary = post_scheduler(&s, &publisher, &settings).await.unwrap();
  assert_eq!(summary, TickSummary::default());
  assert!(s.schedule_for_post(post.id).await.unwrap().is_some());
}

#[tokio::test]
async fn expired_items_are_recorded_but_not_scheduled() {
  let s = store().await;
  let settings = SchedulerSettings {
    post_expiry: Some(1),
    post_date: PostDate::Published,
    ..Default::default()
  };

  let mut old = new_post("old");
  old.published_at = Some(Utc::now() - Duration::days(3));
  let (post, schedule) = record_post(&s, &settings, old).await.unwrap();
  assert!(schedule.is_none());
  assert!(s.get_post(post.id).await.unwrap().is_some());

  // Recording the same item again is a no-op.
  let (again, schedule) = record_post(&s, &settings, new_post("old")).await.unwrap();
  assert_eq!(again.id, post.id);
  assert!(schedule.is_none());
}
