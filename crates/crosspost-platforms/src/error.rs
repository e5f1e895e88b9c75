//! Error type for `crosspost-platforms`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("authentication failed: {0}")]
  Auth(String),

  /// Non-success response from a Mastodon-compatible server.
  #[error("api error ({status}): {message}")]
  Api { status: u16, message: String },

  /// Error body returned by an XRPC endpoint.
  #[error("xrpc error {error}: {message}")]
  Xrpc { error: String, message: String },

  #[error("rate limited (retry after {retry_after_secs:?}s)")]
  RateLimited { retry_after_secs: Option<u64> },

  /// A stored identifier that cannot be used for an update.
  #[error("invalid post identifier: {0:?}")]
  InvalidPostId(String),

  #[error("invalid response: {0}")]
  InvalidResponse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
