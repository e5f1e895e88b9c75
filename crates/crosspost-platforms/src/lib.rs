//! Platform adapters for the cross-posting bot.
//!
//! [`Platforms`] implements [`crosspost_core::platform::Publisher`] by
//! routing each account to its host: [`mastodon`] for Mastodon-compatible
//! servers, [`bluesky`] for AT Protocol PDSes.

#![allow(async_fn_in_trait)]

pub mod bluesky;
pub mod error;
mod http;
pub mod mastodon;

use crosspost_core::{
  account::{Account, Host},
  platform::{Outgoing, Publisher},
};
pub use error::{Error, Result};
use reqwest::Client;
use tracing::{debug, warn};

use crate::{
  bluesky::{BlueskyClient, StrongRef},
  mastodon::MastodonClient,
};

/// A logged-in client for one account.
#[derive(Debug, Clone)]
pub enum Session {
  Mastodon(MastodonClient),
  Bluesky {
    client:  BlueskyClient,
    session: bluesky::Session,
  },
}

/// Entry point for every supported platform. Holds one shared HTTP client.
#[derive(Debug, Clone)]
pub struct Platforms {
  http: Client,
}

impl Platforms {
  pub fn new() -> Result<Self> { Ok(Self { http: http::client()? }) }

  async fn bluesky_login(&self, account: &Account) -> Result<Option<Session>> {
    let Some(handle) = account.identity() else {
      warn!(uid = %account.uid, "bluesky account has no usable handle");
      return Ok(None);
    };
    let password = account.access_token.trim();
    if password.is_empty() {
      warn!(%handle, "bluesky account has no app password");
      return Ok(None);
    }
    let client = BlueskyClient::new(self.http.clone(), account.api_base_url.trim());
    let session = client.login(&handle, password).await?;
    Ok(Some(Session::Bluesky { client, session }))
  }
}

impl Publisher for Platforms {
  type Session = Session;
  type Error = Error;

  async fn instantiate(&self, account: &Account) -> Result<Option<Session>> {
    match account.host {
      Host::Mastodon => {
        let client = MastodonClient::for_account(&self.http, account);
        if client.is_none() {
          warn!(uid = %account.uid, "mastodon account lacks a token or API URL");
        }
        Ok(client.map(Session::Mastodon))
      }
      Host::Bluesky => self.bluesky_login(account).await,
    }
  }

  async fn send_post(&self, session: &Session, post: Outgoing<'_>) -> Result<Option<String>> {
    match session {
      Session::Mastodon(client) => match post.prior_id {
        Some(id) => client.edit_status(id, post.content).await,
        None => client.post_status(post.content, post.visibility).await,
      },
      Session::Bluesky { client, session } => {
        // Visibility has no meaning on Bluesky.
        let quote = post.prior_id.map(StrongRef::parse).transpose()?;
        let created = client.create_post(session, post.content, quote).await?;
        Ok(Some(created.to_id()))
      }
    }
  }

  async fn update_account(&self, account: &Account) -> Result<bool> {
    match self.instantiate(account).await? {
      Some(Session::Mastodon(client)) => {
        client.update_credentials(account).await?;
        Ok(true)
      }
      Some(Session::Bluesky { client, session }) => {
        client
          .update_profile(&session, account.display_name.as_deref(), account.note.as_deref())
          .await?;
        Ok(true)
      }
      None => {
        debug!(uid = %account.uid, "profile not pushed; no session");
        Ok(false)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crosspost_core::{account::NewAccount, settings::Visibility};
  use serde_json::json;
  use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
  };

  use super::*;

  fn bluesky_account(server: &MockServer) -> Account {
    let mut new = NewAccount::new("bot", server.uri(), "app-pw");
    new.host = Host::Bluesky;
    new.into_account(uuid::Uuid::now_v7())
  }

  #[tokio::test]
  async fn bluesky_login_uses_handle_from_uid_and_domain() {
    let server = MockServer::start().await;
    let account = bluesky_account(&server);
    let handle = account.identity().unwrap();

    Mock::given(method("POST"))
      .and(path("/xrpc/com.atproto.server.createSession"))
      .and(body_partial_json(json!({ "identifier": handle, "password": "app-pw" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "did": "did:plc:bot",
        "handle": handle,
        "accessJwt": "jwt",
        "refreshJwt": "refresh"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let platforms = Platforms::new().unwrap();
    let session = platforms.instantiate(&account).await.unwrap();
    assert!(matches!(session, Some(Session::Bluesky { ref session, .. }) if session.did == "did:plc:bot"));
  }

  #[tokio::test]
  async fn bluesky_rejects_non_bluesky_prior_id() {
    let server = MockServer::start().await;
    let platforms = Platforms::new().unwrap();
    let session = Session::Bluesky {
      client:  BlueskyClient::new(Client::new(), server.uri()),
      session: bluesky::Session {
        did:        "did:plc:bot".into(),
        handle:     "bot".into(),
        access_jwt: "jwt".into(),
      },
    };

    let err = platforms
      .send_post(&session, Outgoing {
        content:    "x",
        prior_id:   Some("1098"),
        visibility: Visibility::Public,
      })
      .await
      .unwrap_err();
    assert!(matches!(err, Error::InvalidPostId(_)));
  }

  #[tokio::test]
  async fn mastodon_without_token_has_no_session() {
    let account = NewAccount::new("bot", "https://botsin.space", "")
      .into_account(uuid::Uuid::now_v7());
    let platforms = Platforms::new().unwrap();
    assert!(platforms.instantiate(&account).await.unwrap().is_none());
    assert!(!platforms.update_account(&account).await.unwrap());
  }
}
