//! Mastodon-compatible servers over the REST API.
//!
//! The bearer token is the account's access token; there is no login round
//! trip. Updates of an existing post are real status edits.

use crosspost_core::{
  account::{Account, ProfileField},
  settings::Visibility,
};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::{Error, Result, http};

/// A client bound to one account on one server.
#[derive(Debug, Clone)]
pub struct MastodonClient {
  http:     Client,
  base_url: String,
  token:    String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
  id: Option<String>,
}

/// The subset of the credential account we read back.
#[derive(Debug, Deserialize)]
pub struct CredentialAccount {
  pub username: Option<String>,
  pub url:      Option<String>,
}

#[derive(Debug, Serialize)]
struct NewStatus<'a> {
  status:     &'a str,
  visibility: &'static str,
}

#[derive(Debug, Serialize)]
struct EditStatus<'a> {
  status: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateCredentials<'a> {
  bot:               bool,
  discoverable:      bool,
  locked:            bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  display_name:      Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  note:              Option<&'a str>,
  fields_attributes: &'a [ProfileField],
}

#[derive(Debug, Deserialize)]
struct ApiError {
  error: String,
}

impl MastodonClient {
  pub fn new(
    http: Client,
    base_url: impl Into<String>,
    token: impl Into<String>,
  ) -> Self {
    Self { http, base_url: base_url.into(), token: token.into() }
  }

  /// `None` when the account lacks a token or an endpoint.
  pub fn for_account(http: &Client, account: &Account) -> Option<Self> {
    let token = account.access_token.trim();
    let url = account.api_base_url.trim();
    if token.is_empty() || url.is_empty() {
      return None;
    }
    Some(Self::new(http.clone(), url, token))
  }

  /// Publish a new status. Returns its id.
  pub async fn post_status(
    &self,
    status: &str,
    visibility: Visibility,
  ) -> Result<Option<String>> {
    let body = NewStatus { status, visibility: visibility.as_str() };
    let response = self
      .http
      .post(http::join(&self.base_url, "/api/v1/statuses"))
      .bearer_auth(&self.token)
      .json(&body)
      .send()
      .await?;
    let status: StatusResponse = handle_response(response).await?;
    debug!(id = ?status.id, visibility = visibility.as_str(), "status posted");
    Ok(status.id.filter(|id| !id.is_empty()))
  }

  /// Replace the text of status `id`.
  pub async fn edit_status(&self, id: &str, status: &str) -> Result<Option<String>> {
    let response = self
      .http
      .put(http::join(&self.base_url, &format!("/api/v1/statuses/{id}")))
      .bearer_auth(&self.token)
      .json(&EditStatus { status })
      .send()
      .await?;
    let status: StatusResponse = handle_response(response).await?;
    debug!(id = ?status.id, "status edited");
    Ok(status.id.filter(|id| !id.is_empty()))
  }

  /// Push profile fields and flags of `account`.
  pub async fn update_credentials(&self, account: &Account) -> Result<CredentialAccount> {
    let body = UpdateCredentials {
      bot:               account.is_bot,
      discoverable:      account.is_discoverable,
      locked:            account.is_locked,
      display_name:      account.display_name.as_deref(),
      note:              account.note.as_deref(),
      fields_attributes: &account.fields,
    };
    let response = self
      .http
      .patch(http::join(&self.base_url, "/api/v1/accounts/update_credentials"))
      .bearer_auth(&self.token)
      .json(&body)
      .send()
      .await?;
    let updated: CredentialAccount = handle_response(response).await?;
    info!(username = ?updated.username, url = ?updated.url, "mastodon profile updated");
    Ok(updated)
  }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
  if let Some(err) = http::rate_limited(&response) {
    return Err(err);
  }
  let status = response.status();
  if !status.is_success() {
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&text)
      .map(|e| e.error)
      .unwrap_or(text);
    if status == reqwest::StatusCode::UNAUTHORIZED {
      return Err(Error::Auth(message));
    }
    return Err(Error::Api { status: status.as_u16(), message });
  }
  Ok(response.json().await?)
}
