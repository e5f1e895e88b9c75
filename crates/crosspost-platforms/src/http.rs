//! Shared HTTP plumbing.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::{Error, Result};

/// Build the HTTP client shared by every adapter.
pub fn client() -> Result<Client> {
  Ok(
    Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .timeout(Duration::from_secs(30))
      .user_agent(concat!("crosspost/", env!("CARGO_PKG_VERSION")))
      .build()?,
  )
}

/// `Some(Error::RateLimited)` for a 429 response.
pub fn rate_limited(response: &Response) -> Option<Error> {
  if response.status() != StatusCode::TOO_MANY_REQUESTS {
    return None;
  }
  let retry_after_secs = response
    .headers()
    .get("Retry-After")
    .and_then(|v| v.to_str().ok())
    .and_then(|s| s.parse().ok());
  Some(Error::RateLimited { retry_after_secs })
}

/// Join `base` and `path` with exactly one slash.
pub fn join(base: &str, path: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
