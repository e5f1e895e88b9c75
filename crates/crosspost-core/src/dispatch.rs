//! The dispatcher: one tick of delivery.
//!
//! A tick drafts pending records (throttled), picks up every record that is
//! already partially delivered, renders each post once per platform and
//! fans it out to every enabled account in turn. A record is removed once
//! every account holds an identifier for its post, or when retries are
//! disabled.

use std::collections::HashMap;

use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  account::{Account, Host},
  content,
  platform::{Outgoing, Publisher},
  post::PostIds,
  schedule::DueSchedule,
  settings::{SchedulerSettings, Visibility},
  store::BotStore,
};

/// Counters for one dispatcher pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
  /// Pending records drafted this tick.
  pub drafted:   usize,
  /// Partially delivered records picked up again.
  pub updating:  usize,
  /// Successful sends.
  pub sent:      usize,
  /// Failed sends, including accounts that could not log in.
  pub failed:    usize,
  /// Schedule records removed.
  pub completed: usize,
  /// Schedule records kept for the next tick.
  pub retained:  usize,
}

/// How many pending records to draft under `limit`.
///
/// Organic mode draws uniformly from `[ceil(limit / 3), limit]`.
pub fn draft_count<R: Rng + ?Sized>(
  limit: usize,
  organic: bool,
  rng: &mut R,
) -> usize {
  if !organic || limit == 0 {
    return limit;
  }
  rng.gen_range(limit.div_ceil(3)..=limit)
}

/// Visibility of a send. A receiver without an explicit visibility makes
/// the post direct; anything else is normalised against `default`.
pub fn resolve_visibility(
  receiver: Option<&str>,
  requested: Option<&str>,
  default: Visibility,
) -> Visibility {
  let addressed = receiver.is_some_and(|r| !r.trim().is_empty());
  match requested.filter(|v| !v.trim().is_empty()) {
    None if addressed => Visibility::Direct,
    requested => Visibility::normalize(requested, default),
  }
}

/// Run one dispatcher pass.
///
/// Store failures abort the tick. Platform failures are logged and only
/// mark the affected record as not yet delivered.
#[tracing::instrument(skip_all)]
pub async fn post_scheduler<S, P>(
  store: &S,
  publisher: &P,
  settings: &SchedulerSettings,
) -> Result<TickSummary>
where
  S: BotStore,
  P: Publisher,
{
  let limit = match settings.limit() {
    Some(limit) if store.supports_offset_limit() => Some(draft_count(
      limit,
      settings.organic_posts,
      &mut rand::thread_rng(),
    )),
    Some(_) => {
      debug!("store cannot slice; drafting every pending record");
      None
    }
    None => None,
  };

  let accounts = store.list_accounts(true).await.map_err(Error::store)?;
  if accounts.is_empty() {
    warn!("no enabled accounts; nothing delivered");
    return Ok(TickSummary::default());
  }

  let pending = store
    .pending_schedules(settings.post_order, limit)
    .await
    .map_err(Error::store)?;
  let updating = store
    .updating_schedules(settings.post_order)
    .await
    .map_err(Error::store)?;

  let mut summary = TickSummary {
    drafted: pending.len(),
    updating: updating.len(),
    ..Default::default()
  };
  debug!(drafted = summary.drafted, updating = summary.updating, ?limit, "tick");

  let mut sessions = SessionCache::new();
  for due in pending.into_iter().chain(updating) {
    let schedule_id = due.schedule.id;
    let complete =
      deliver(store, publisher, settings, &accounts, &mut sessions, due, &mut summary)
        .await?;

    if complete || !settings.retry_post {
      store.delete_schedule(schedule_id).await.map_err(Error::store)?;
      summary.completed += 1;
      if complete {
        info!(schedule = %schedule_id, "delivered everywhere; schedule removed");
      } else {
        warn!(schedule = %schedule_id, "delivery incomplete; retries disabled, discarding");
      }
    } else {
      summary.retained += 1;
      info!(schedule = %schedule_id, "delivery incomplete; kept for retry");
    }
  }

  Ok(summary)
}

// ─── Per-record fan-out ──────────────────────────────────────────────────────

/// Logged-in sessions for the current tick, keyed by account id. A failed
/// login is cached as `None` so it is attempted once per tick.
struct SessionCache<T>(HashMap<Uuid, Option<T>>);

impl<T> SessionCache<T> {
  fn new() -> Self { Self(HashMap::new()) }

  async fn get<'a, P>(&'a mut self, publisher: &P, account: &Account) -> Option<&'a T>
  where
    P: Publisher<Session = T>,
  {
    if !self.0.contains_key(&account.id) {
      let session = match publisher.instantiate(account).await {
        Ok(Some(session)) => Some(session),
        Ok(None) => {
          warn!(account = %account.id, host = %account.host, "no session for account");
          None
        }
        Err(err) => {
          error!(account = %account.id, host = %account.host, %err, "login failed");
          None
        }
      };
      self.0.insert(account.id, session);
    }
    self.0.get(&account.id).and_then(Option::as_ref)
  }
}

/// Fan one record out to every account. Returns whether every account now
/// holds an identifier for the post.
async fn deliver<S, P>(
  store: &S,
  publisher: &P,
  settings: &SchedulerSettings,
  accounts: &[Account],
  sessions: &mut SessionCache<P::Session>,
  due: DueSchedule,
  summary: &mut TickSummary,
) -> Result<bool>
where
  S: BotStore,
  P: Publisher,
{
  let DueSchedule { schedule, mut post } = due;
  let receiver = schedule.receiver.as_deref();
  let visibility = resolve_visibility(
    receiver,
    schedule.visibility.as_deref(),
    settings.default_visibility,
  );

  let mut rendered: HashMap<Host, String> = HashMap::new();
  let mut delete = true;

  for account in accounts {
    let prior = post
      .post_ids
      .as_ref()
      .and_then(|ids| ids.for_account(account.id))
      .map(str::to_owned);
    if prior.is_some() && !settings.update_delivered {
      debug!(post = %post.id, account = %account.id, "already delivered");
      continue;
    }

    let Some(session) = sessions.get(publisher, account).await else {
      summary.failed += 1;
      delete = false;
      continue;
    };

    let content = rendered
      .entry(account.host)
      .or_insert_with(|| content::render_addressed(account.host, &post, receiver));
    let outgoing = Outgoing {
      content: content.as_str(),
      prior_id: prior.as_deref(),
      visibility,
    };

    match publisher.send_post(session, outgoing).await {
      Ok(Some(platform_id)) if !platform_id.is_empty() => {
        summary.sent += 1;
        if prior.is_none() {
          let ids = post
            .post_ids
            .get_or_insert_with(|| PostIds::PerAccount(Vec::new()));
          if ids.record(account.id, &platform_id) {
            store.set_post_ids(post.id, ids).await.map_err(Error::store)?;
          }
        }
        info!(
          post = %post.id,
          account = %account.id,
          identity = account.identity().as_deref().unwrap_or("?"),
          platform_id = %platform_id,
          updated = prior.is_some(),
          "sent"
        );
      }
      Ok(_) => {
        summary.failed += 1;
        delete = false;
        warn!(post = %post.id, account = %account.id, "platform returned no identifier");
      }
      Err(err) => {
        summary.failed += 1;
        delete = false;
        error!(post = %post.id, account = %account.id, %err, "send failed");
      }
    }
  }

  Ok(delete)
}

#[cfg(test)]
mod tests {
  use rand::{SeedableRng, rngs::StdRng};

  use super::*;

  #[test]
  fn plain_limit_is_exact() {
    let mut rng = StdRng::seed_from_u64(7);
    assert_eq!(draft_count(5, false, &mut rng), 5);
    assert_eq!(draft_count(0, true, &mut rng), 0);
  }

  #[test]
  fn organic_draws_stay_in_bounds() {
    for limit in 1..=12usize {
      let mut rng = StdRng::seed_from_u64(limit as u64);
      let min = limit.div_ceil(3);
      let mut seen = std::collections::HashSet::new();
      for _ in 0..500 {
        let n = draft_count(limit, true, &mut rng);
        assert!((min..=limit).contains(&n), "limit {limit}: drew {n}");
        seen.insert(n);
      }
      assert_eq!(seen.len(), limit - min + 1, "limit {limit}: not uniform over range");
    }
  }

  #[test]
  fn receiver_defaults_to_direct() {
    let d = Visibility::Public;
    assert_eq!(resolve_visibility(Some("bob"), None, d), Visibility::Direct);
    assert_eq!(resolve_visibility(Some("bob"), Some(""), d), Visibility::Direct);
    assert_eq!(
      resolve_visibility(Some("bob"), Some("unlisted"), d),
      Visibility::Unlisted
    );
    assert_eq!(resolve_visibility(None, Some("bogus"), d), d);
    assert_eq!(resolve_visibility(Some(" "), None, d), d);
  }
}
