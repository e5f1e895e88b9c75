//! The reconciler: repair drift between posts and schedule records.
//!
//! Only posts without a schedule record are considered. Delivered (or
//! expired) ones are purged; the rest were left behind by an interrupted
//! tick and are rescheduled, or purged when retries are disabled.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  post::Post,
  schedule::NewSchedule,
  settings::{PostDate, SchedulerSettings},
  store::BotStore,
};

/// Unscheduled posts split by what the reconciler does with them.
#[derive(Debug, Default)]
pub struct Partition {
  pub deletion: Vec<Post>,
  pub schedule: Vec<Post>,
}

/// Split unscheduled posts into deletion and schedule candidates.
///
/// A post is a deletion candidate when it is delivered or older than
/// `cutoff`; every other post is a schedule candidate.
pub fn partition(
  unscheduled: Vec<Post>,
  cutoff: Option<DateTime<Utc>>,
  post_date: PostDate,
) -> Partition {
  let expired = |post: &Post| cutoff.is_some_and(|c| post.reference_date(post_date) < c);
  let (deletion, schedule): (Vec<Post>, Vec<Post>) = unscheduled
    .into_iter()
    .partition(|post| post.is_delivered() || expired(post));
  Partition { deletion, schedule }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSummary {
  pub deleted:     usize,
  pub rescheduled: usize,
  /// Left-behind posts deleted because retries are disabled.
  pub discarded:   usize,
}

/// Run one reconciler pass.
#[tracing::instrument(skip_all)]
pub async fn clean_data<S: BotStore>(
  store: &S,
  settings: &SchedulerSettings,
) -> Result<CleanSummary> {
  let unscheduled = store.unscheduled_posts().await.map_err(Error::store)?;
  let Partition { deletion, schedule } =
    partition(unscheduled, settings.expiry_cutoff(Utc::now()), settings.post_date);

  let mut summary = CleanSummary::default();

  if !deletion.is_empty() {
    let ids: Vec<Uuid> = deletion.iter().map(|p| p.id).collect();
    summary.deleted = store.delete_posts(&ids).await.map_err(Error::store)?;
    info!(count = summary.deleted, ?ids, "deleted finished posts");
  }

  if schedule.is_empty() {
    return Ok(summary);
  }

  if settings.retry_post {
    for post in &schedule {
      let created = store
        .create_schedule(NewSchedule::public(post.id))
        .await
        .map_err(Error::store)?;
      if created.is_some() {
        summary.rescheduled += 1;
        warn!(post = %post.id, item = %post.item_id, "left behind; rescheduled");
      }
    }
  } else {
    let ids: Vec<Uuid> = schedule.iter().map(|p| p.id).collect();
    summary.discarded = store.delete_posts(&ids).await.map_err(Error::store)?;
    info!(count = summary.discarded, ?ids, "deleted undelivered posts; retries disabled");
  }

  Ok(summary)
}
