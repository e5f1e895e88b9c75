//! Bluesky over XRPC.
//!
//! Posts cannot be edited, so updating a delivered post creates a new post
//! quoting the original. A post is identified by `"<uri>,<cid>"`.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, info};

use crate::{Error, Result, http};

const POST_COLLECTION: &str = "app.bsky.feed.post";
const PROFILE_COLLECTION: &str = "app.bsky.actor.profile";

// ─── Wire types ──────────────────────────────────────────────────────────────

/// An authenticated session from `com.atproto.server.createSession`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub did:        String,
  pub handle:     String,
  pub access_jwt: String,
}

/// A `com.atproto.repo.strongRef`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
  pub uri: String,
  pub cid: String,
}

impl StrongRef {
  /// Parse a stored `"<uri>,<cid>"` identifier.
  pub fn parse(id: &str) -> Result<Self> {
    match id.rsplit_once(',') {
      Some((uri, cid)) if uri.starts_with("at://") && !cid.trim().is_empty() => {
        Ok(Self { uri: uri.to_owned(), cid: cid.trim().to_owned() })
      }
      _ => Err(Error::InvalidPostId(id.to_owned())),
    }
  }

  /// The stored identifier form, `"<uri>,<cid>"`.
  pub fn to_id(&self) -> String { format!("{},{}", self.uri, self.cid) }
}

#[derive(Debug, Serialize)]
struct ByteSlice {
  #[serde(rename = "byteStart")]
  byte_start: usize,
  #[serde(rename = "byteEnd")]
  byte_end:   usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "$type")]
enum Feature {
  #[serde(rename = "app.bsky.richtext.facet#link")]
  Link { uri: String },
  #[serde(rename = "app.bsky.richtext.facet#tag")]
  Tag { tag: String },
  #[serde(rename = "app.bsky.richtext.facet#mention")]
  Mention { did: String },
}

#[derive(Debug, Serialize)]
struct Facet {
  index:    ByteSlice,
  features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "$type")]
enum Embed {
  #[serde(rename = "app.bsky.embed.record")]
  Record { record: StrongRef },
}

#[derive(Debug, Serialize)]
#[serde(tag = "$type", rename = "app.bsky.feed.post")]
struct PostRecord<'a> {
  text:       &'a str,
  #[serde(rename = "createdAt")]
  created_at: String,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  facets:     Vec<Facet>,
  #[serde(skip_serializing_if = "Option::is_none")]
  embed:      Option<Embed>,
}

#[derive(Debug, Serialize)]
struct CreateRecord<'a, R> {
  repo:       &'a str,
  collection: &'a str,
  record:     R,
}

#[derive(Debug, Serialize)]
struct PutRecord<'a> {
  repo:       &'a str,
  collection: &'a str,
  rkey:       &'a str,
  record:     &'a Value,
  #[serde(rename = "swapRecord", skip_serializing_if = "Option::is_none")]
  swap_record: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GetRecordResponse {
  cid:   Option<String>,
  value: Value,
}

#[derive(Debug, Deserialize)]
struct ProfileView {
  did: String,
}

#[derive(Debug, Deserialize)]
struct XrpcError {
  error:   String,
  #[serde(default)]
  message: String,
}

// ─── Rich text ───────────────────────────────────────────────────────────────

/// A token found in post text, located by byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
  Link { range: Range<usize>, uri: String },
  Tag { range: Range<usize>, tag: String },
  Mention { range: Range<usize>, handle: String },
}

impl Span {
  fn range(&self) -> &Range<usize> {
    match self {
      Self::Link { range, .. } | Self::Tag { range, .. } | Self::Mention { range, .. } => range,
    }
  }
}

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"(?:^|[^\w])(https?://(?:www\.)?[-a-zA-Z0-9@:%._+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_+.~#?&/=]*[-a-zA-Z0-9@%_+~#/=])?)",
  )
  .expect("valid url regex")
});

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"(?:^|[^\w])(@((?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?))",
  )
  .expect("valid mention regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?:^|\s)(#([a-zA-Z0-9_]*[a-zA-Z_][a-zA-Z0-9_]*))").expect("valid tag regex")
});

/// Find links, hashtags and mentions in `text`. Tags and mentions inside a
/// link are ignored. Spans are sorted by start offset.
pub fn detect_spans(text: &str) -> Vec<Span> {
  let mut spans: Vec<Span> = URL_RE
    .captures_iter(text)
    .filter_map(|c| c.get(1))
    .map(|m| Span::Link { range: m.range(), uri: m.as_str().to_owned() })
    .collect();

  let overlaps_link = |range: &Range<usize>, spans: &[Span]| {
    spans
      .iter()
      .any(|s| range.start < s.range().end && s.range().start < range.end)
  };

  let mut others = Vec::new();
  for c in TAG_RE.captures_iter(text) {
    if let (Some(all), Some(tag)) = (c.get(1), c.get(2)) {
      others.push(Span::Tag { range: all.range(), tag: tag.as_str().to_owned() });
    }
  }
  for c in MENTION_RE.captures_iter(text) {
    if let (Some(all), Some(handle)) = (c.get(1), c.get(2)) {
      others.push(Span::Mention {
        range:  all.range(),
        handle: handle.as_str().to_owned(),
      });
    }
  }
  others.retain(|s| !overlaps_link(s.range(), &spans));
  spans.extend(others);
  spans.sort_by_key(|s| s.range().start);
  spans
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// A client for one PDS.
#[derive(Debug, Clone)]
pub struct BlueskyClient {
  http:    Client,
  pds_url: String,
}

impl BlueskyClient {
  pub fn new(http: Client, pds_url: impl Into<String>) -> Self {
    Self { http, pds_url: pds_url.into() }
  }

  fn xrpc(&self, nsid: &str) -> String { http::join(&self.pds_url, &format!("/xrpc/{nsid}")) }

  /// Authenticate with a handle and app password.
  pub async fn login(&self, identifier: &str, password: &str) -> Result<Session> {
    #[derive(Serialize)]
    struct LoginRequest<'a> {
      identifier: &'a str,
      password:   &'a str,
    }

    let response = self
      .http
      .post(self.xrpc("com.atproto.server.createSession"))
      .json(&LoginRequest { identifier, password })
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let text = response.text().await.unwrap_or_default();
      return Err(Error::Auth(format!("login failed ({status}): {text}")));
    }

    let session: Session = response.json().await?;
    debug!(did = %session.did, handle = %session.handle, "authenticated with PDS");
    Ok(session)
  }

  /// Resolve `handle` to a DID.
  pub async fn resolve_did(&self, session: &Session, handle: &str) -> Result<String> {
    let response = self
      .http
      .get(self.xrpc("app.bsky.actor.getProfile"))
      .bearer_auth(&session.access_jwt)
      .query(&[("actor", handle)])
      .send()
      .await?;
    let profile: ProfileView = handle_response(response).await?;
    Ok(profile.did)
  }

  /// Turn detected spans into facets, resolving mentions. A mention that
  /// does not resolve stays plain text.
  async fn facets(&self, session: &Session, text: &str) -> Vec<Facet> {
    let mut facets = Vec::new();
    for span in detect_spans(text) {
      let feature = match &span {
        Span::Link { uri, .. } => Feature::Link { uri: uri.clone() },
        Span::Tag { tag, .. } => Feature::Tag { tag: tag.clone() },
        Span::Mention { handle, .. } => match self.resolve_did(session, handle).await {
          Ok(did) => Feature::Mention { did },
          Err(err) => {
            debug!(%handle, %err, "mention not resolved; leaving as text");
            continue;
          }
        },
      };
      let range = span.range();
      facets.push(Facet {
        index:    ByteSlice { byte_start: range.start, byte_end: range.end },
        features: vec![feature],
      });
    }
    facets
  }

  /// Create a post, optionally quoting `quote`.
  pub async fn create_post(
    &self,
    session: &Session,
    text: &str,
    quote: Option<StrongRef>,
  ) -> Result<StrongRef> {
    let record = PostRecord {
      text,
      created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      facets: self.facets(session, text).await,
      embed: quote.map(|record| Embed::Record { record }),
    };
    let body = CreateRecord {
      repo: &session.did,
      collection: POST_COLLECTION,
      record,
    };

    let response = self
      .http
      .post(self.xrpc("com.atproto.repo.createRecord"))
      .bearer_auth(&session.access_jwt)
      .json(&body)
      .send()
      .await?;
    let created: StrongRef = handle_response(response).await?;
    debug!(uri = %created.uri, "post created");
    Ok(created)
  }

  /// Overwrite `displayName` and `description` of the profile record,
  /// keeping every other field.
  pub async fn update_profile(
    &self,
    session: &Session,
    display_name: Option<&str>,
    description: Option<&str>,
  ) -> Result<StrongRef> {
    let response = self
      .http
      .get(self.xrpc("com.atproto.repo.getRecord"))
      .bearer_auth(&session.access_jwt)
      .query(&[
        ("repo", session.did.as_str()),
        ("collection", PROFILE_COLLECTION),
        ("rkey", "self"),
      ])
      .send()
      .await?;

    let (mut record, swap) = match handle_response::<GetRecordResponse>(response).await {
      Ok(existing) => (existing.value, existing.cid),
      Err(Error::Xrpc { error, .. }) if error == "RecordNotFound" => {
        (serde_json::json!({ "$type": PROFILE_COLLECTION }), None)
      }
      Err(err) => return Err(err),
    };

    let Value::Object(fields) = &mut record else {
      return Err(Error::InvalidResponse("profile record is not an object".into()));
    };
    for (key, value) in [("displayName", display_name), ("description", description)] {
      match value {
        Some(v) => {
          fields.insert(key.to_owned(), Value::String(v.to_owned()));
        }
        None => {
          fields.remove(key);
        }
      }
    }

    let body = PutRecord {
      repo:        &session.did,
      collection:  PROFILE_COLLECTION,
      rkey:        "self",
      record:      &record,
      swap_record: swap.as_deref(),
    };
    let response = self
      .http
      .post(self.xrpc("com.atproto.repo.putRecord"))
      .bearer_auth(&session.access_jwt)
      .json(&body)
      .send()
      .await?;
    let written: StrongRef = handle_response(response).await?;
    info!(handle = %session.handle, "bluesky profile updated");
    Ok(written)
  }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
  if let Some(err) = http::rate_limited(&response) {
    return Err(err);
  }
  let status = response.status();
  if !status.is_success() {
    let text = response.text().await.unwrap_or_default();
    if let Ok(xrpc) = serde_json::from_str::<XrpcError>(&text) {
      return Err(Error::Xrpc { error: xrpc.error, message: xrpc.message });
    }
    return Err(Error::InvalidResponse(format!("request failed ({status}): {text}")));
  }
  Ok(response.json().await?)
}
