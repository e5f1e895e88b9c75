//! Feeds: upstream sources of posts. Only synced here, never fetched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
  pub id:         Uuid,
  pub uid:        String,
  pub endpoint:   String,
  pub is_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct NewFeed {
  pub uid:        String,
  pub endpoint:   String,
  pub is_enabled: bool,
}
