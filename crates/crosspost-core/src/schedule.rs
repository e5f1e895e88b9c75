//! Schedule records: "this post is due for (re-)delivery".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::post::Post;

/// Job name of a broadcast record.
pub const PUBLIC_JOB: &str = "Public";
/// Job name of a record addressed to a single receiver.
pub const MENTION_JOB: &str = "Mention";

/// A pending-delivery marker referencing exactly one post.
///
/// Deleting the post cascades to its schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
  pub id:           Uuid,
  pub name:         String,
  pub post_id:      Uuid,
  /// Mention target, prepended to the content as `@receiver`.
  pub receiver:     Option<String>,
  /// Raw visibility as requested; normalised at send time.
  pub visibility:   Option<String>,
  pub scheduled_at: DateTime<Utc>,
}

/// Input to [`crate::store::BotStore::create_schedule`].
#[derive(Debug, Clone)]
pub struct NewSchedule {
  pub post_id:    Uuid,
  pub receiver:   Option<String>,
  pub visibility: Option<String>,
}

impl NewSchedule {
  /// A broadcast record with no receiver and the default visibility.
  pub fn public(post_id: Uuid) -> Self {
    Self { post_id, receiver: None, visibility: None }
  }

  pub fn name(&self) -> &'static str {
    if self.receiver.as_deref().is_some_and(|r| !r.trim().is_empty()) {
      MENTION_JOB
    } else {
      PUBLIC_JOB
    }
  }
}

/// A schedule record joined with the post it delivers.
#[derive(Debug, Clone)]
pub struct DueSchedule {
  pub schedule: Schedule,
  pub post:     Post,
}
