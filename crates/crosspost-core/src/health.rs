//! Health check: a harmless test post from every enabled account.

use tracing::{error, info, warn};

use crate::{
  Error, Result,
  account::{Account, Host},
  platform::{Outgoing, Publisher},
  settings::Visibility,
  store::BotStore,
};

/// Visibility of test posts.
pub const TEST_VISIBILITY: Visibility = Visibility::Private;

/// The test message sent from `account`.
pub fn test_message(account: &Account) -> String {
  match account.host {
    Host::Mastodon => format!(
      "This is an automated, {} post from @{} to test the health of the bot.",
      TEST_VISIBILITY.as_str(),
      account.uid,
    ),
    Host::Bluesky => format!(
      "This is an automated post from @{} to test the health of the bot.",
      account.identity().unwrap_or_else(|| account.uid.clone()),
    ),
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
  pub sent:   usize,
  pub failed: usize,
}

/// Send a test post from every enabled account, optionally only those on
/// `host`. A failing account is logged and does not stop the others.
pub async fn check_health<S, P>(
  store: &S,
  publisher: &P,
  host: Option<Host>,
) -> Result<HealthReport>
where
  S: BotStore,
  P: Publisher,
{
  let accounts: Vec<Account> = store
    .list_accounts(true)
    .await
    .map_err(Error::store)?
    .into_iter()
    .filter(|a| host.is_none_or(|h| a.host == h))
    .collect();

  let mut report = HealthReport::default();
  if accounts.is_empty() {
    info!(?host, "no active accounts to check");
    return Ok(report);
  }

  for account in &accounts {
    let identity = account.identity().unwrap_or_default();
    let session = match publisher.instantiate(account).await {
      Ok(Some(session)) => session,
      Ok(None) => {
        warn!(%identity, "incomplete credentials; skipping");
        report.failed += 1;
        continue;
      }
      Err(err) => {
        error!(%identity, %err, "login failed");
        report.failed += 1;
        continue;
      }
    };

    let content = test_message(account);
    let outgoing = Outgoing {
      content:    &content,
      prior_id:   None,
      visibility: TEST_VISIBILITY,
    };
    match publisher.send_post(&session, outgoing).await {
      Ok(_) => {
        report.sent += 1;
        info!(%identity, "test post sent");
      }
      Err(err) => {
        report.failed += 1;
        error!(%identity, %err, "test post failed");
      }
    }
  }

  Ok(report)
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;
  use crate::account::NewAccount;

  #[test]
  fn messages_name_the_account() {
    let mut new = NewAccount::new("mango", "https://bsky.social", "pw");
    new.host = Host::Bluesky;
    let sky = new.into_account(Uuid::now_v7());
    assert_eq!(
      test_message(&sky),
      "This is an automated post from @mango.bsky.social to test the health of the bot."
    );

    let toot = NewAccount::new("mango", "https://botsin.space", "t")
      .into_account(Uuid::now_v7());
    assert_eq!(
      test_message(&toot),
      "This is an automated, private post from @mango to test the health of the bot."
    );
  }
}
