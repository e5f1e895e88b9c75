//! Scheduling: every eligible post gets exactly one schedule record.
//!
//! Called explicitly from the post creation path rather than from a
//! save hook. None of these functions mutate the post itself.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Error, Result,
  post::{NewPost, Post},
  schedule::{NewSchedule, Schedule},
  settings::SchedulerSettings,
  store::BotStore,
};

/// Whether `post` fell out of the expiry window at `now`.
pub fn is_expired(
  post: &Post,
  settings: &SchedulerSettings,
  now: DateTime<Utc>,
) -> bool {
  settings
    .expiry_cutoff(now)
    .is_some_and(|cutoff| post.reference_date(settings.post_date) < cutoff)
}

/// Create a `"Public"` schedule record for `post` unless one already exists
/// or the post has expired. Returns the record when one was created.
pub async fn ensure_scheduled<S: BotStore>(
  store: &S,
  settings: &SchedulerSettings,
  post: &Post,
) -> Result<Option<Schedule>> {
  if store
    .schedule_for_post(post.id)
    .await
    .map_err(Error::store)?
    .is_some()
  {
    debug!(post = %post.id, "already scheduled");
    return Ok(None);
  }
  if is_expired(post, settings, Utc::now()) {
    debug!(post = %post.id, "expired; not scheduling");
    return Ok(None);
  }

  let created = store
    .create_schedule(NewSchedule::public(post.id))
    .await
    .map_err(Error::store)?;
  if let Some(schedule) = &created {
    info!(post = %post.id, schedule = %schedule.id, "scheduled");
  }
  Ok(created)
}

/// Schedule an explicit delivery of `post_id`, optionally addressed to a
/// receiver. The record is named `"Mention"` when a receiver is given.
pub async fn schedule_post<S: BotStore>(
  store: &S,
  post_id: Uuid,
  receiver: Option<String>,
  visibility: Option<String>,
) -> Result<Option<Schedule>> {
  let input = NewSchedule { post_id, receiver, visibility };
  let name = input.name();
  let created = store.create_schedule(input).await.map_err(Error::store)?;
  match &created {
    Some(s) => info!(post = %post_id, schedule = %s.id, name, "scheduled"),
    None => debug!(post = %post_id, "already scheduled"),
  }
  Ok(created)
}

/// The creation path of a post: store it and schedule it. An item that is
/// already stored is returned as is; scheduling only reacts to creation.
pub async fn record_post<S: BotStore>(
  store: &S,
  settings: &SchedulerSettings,
  input: NewPost,
) -> Result<(Post, Option<Schedule>)> {
  if let Some(existing) = store
    .find_post_by_item(&input.item_id)
    .await
    .map_err(Error::store)?
  {
    debug!(post = %existing.id, item = %existing.item_id, "item already recorded");
    return Ok((existing, None));
  }
  let post = store.add_post(input).await.map_err(Error::store)?;
  let schedule = ensure_scheduled(store, settings, &post).await?;
  Ok((post, schedule))
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::settings::PostDate;

  fn post(created_days_ago: i64, published_days_ago: Option<i64>) -> Post {
    let now = Utc::now();
    Post {
      id:           Uuid::now_v7(),
      item_id:      "item".into(),
      title:        "title".into(),
      link:         None,
      tags:         vec![],
      post_ids:     None,
      published_at: published_days_ago.map(|d| now - Duration::days(d)),
      created_at:   now - Duration::days(created_days_ago),
    }
  }

  #[test]
  fn nothing_expires_without_a_window() {
    let settings = SchedulerSettings::default();
    assert!(!is_expired(&post(400, None), &settings, Utc::now()));
  }

  #[test]
  fn expiry_uses_configured_date_field() {
    let mut settings = SchedulerSettings { post_expiry: Some(7), ..Default::default() };
    let p = post(1, Some(30));
    assert!(!is_expired(&p, &settings, Utc::now()));

    settings.post_date = PostDate::Published;
    assert!(is_expired(&p, &settings, Utc::now()));

    // Without a published time the creation time is used.
    assert!(!is_expired(&post(1, None), &settings, Utc::now()));
  }
}
